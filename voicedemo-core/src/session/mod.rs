//! Call session orchestration
//!
//! [`CallSessionController`] is the synchronous state machine;
//! [`SessionRuntime`] drives it from tokio timers and the SDK event stream.

pub mod controller;
pub mod runtime;

pub use controller::{CallSessionController, SessionSettings, StartError};
pub use runtime::{Initializer, RuntimeSettings, SessionHandle, SessionRuntime};
