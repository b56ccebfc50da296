//! vscope Validator - validation message aggregation
//!
//! [`ErrorList`] collects [`Message`]s and answers "which messages belong to
//! this field?" through a category index built on demand.

#![warn(unreachable_pub)]

pub mod error_list;
pub mod message;

pub use error_list::ErrorList;
pub use message::{Message, Severity};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
