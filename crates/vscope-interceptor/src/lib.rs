//! vscope Interceptor - marker-based interceptor acceptance
//!
//! Decides whether an interceptor participates in a request by comparing
//! the marker types on the selected handler against a configured set.
//!
//! # Example
//!
//! ```rust
//! use vscope_interceptor::{
//!     markers, AcceptsValidator, AcceptsWithMarkers, ControllerInstance, ControllerMethod,
//!     WithMarkerAcceptor,
//! };
//!
//! struct Transactional;
//! struct Audited;
//!
//! let acceptor = WithMarkerAcceptor::with_config(AcceptsWithMarkers::new().with_marker::<Transactional>());
//! let method = ControllerMethod::new("save", markers![Transactional]);
//! let instance = ControllerInstance::new("OrdersController", markers![Audited]);
//!
//! assert!(acceptor.validate(&method, &instance));
//! ```

#![warn(unreachable_pub)]

pub mod acceptor;
pub mod marker;

pub use acceptor::{
    AcceptsValidator, AcceptsWithMarkers, ControllerInstance, ControllerMethod, WithMarkerAcceptor,
};
pub use marker::MarkerType;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
