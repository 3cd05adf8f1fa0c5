//! Utility modules for cross-cutting concerns

pub mod context;
pub mod error;
pub mod process;

pub use context::{DoneReason, RequestContext};
pub use error::{AgentFailureKind, BridgeError, Result};
pub use process::{ProcessError, ProcessOutput, run_with_context};
