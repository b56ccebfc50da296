//! vscope Context - scope lifecycle management
//!
//! Creates, activates, correlates and tears down the nested storage
//! contexts that back attribute lookup while a request is handled:
//! - **Application**: process-wide, always live
//! - **Session**: one user session, shared by that user's requests
//! - **Conversation**: several requests correlated by an identifier
//! - **Request**: exactly one request
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use vscope_context::{ApplicationScope, ContextConfig, ContextManager, RequestPlan};
//!
//! let mut manager = ContextManager::standard(ContextConfig::new(), Arc::new(ApplicationScope::new()));
//!
//! {
//!     let request = manager.enter(RequestPlan::new().with_conversation("42")).unwrap();
//!     request.conversation().unwrap().put("step", 1u32);
//!     assert!(request.lookup("step").is_some());
//! } // request, conversation and session scopes are stopped here
//!
//! assert!(manager.request().is_none());
//! ```

#![warn(unreachable_pub)]

pub mod application;
pub mod bag;
pub mod config;
pub mod controller;
pub mod conversation;
pub mod error;
pub mod guard;
pub mod manager;
pub mod session;
pub mod state_machine;
pub mod types;

// Re-exports
pub use application::{ApplicationContext, ApplicationScope, SharedStore};
pub use bag::{Attribute, BagLease, ScopeBag};
pub use config::ContextConfig;
pub use controller::{ScopeContext, ScopeController, ScopeStorage};
pub use conversation::{ConversationCorrelator, ConversationHandle, ConversationState};
pub use error::{ConfigError, ScopeError};
pub use guard::{RequestGuard, RequestPlan};
pub use manager::ContextManager;
pub use session::{SessionId, SessionRegistry};
pub use types::{ScopeKind, ScopeOperation, ScopeState};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for request pipelines
    pub use crate::{
        ApplicationScope, ContextConfig, ContextManager, ConversationHandle, RequestGuard,
        RequestPlan, ScopeBag, ScopeError, ScopeKind, SessionId, SessionRegistry,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
