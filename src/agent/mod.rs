//! Agent CLI subprocess invocation
//!
//! - `AgentInvoker` is the seam the orchestrator depends on
//! - `CliAgentInvoker` shells out to the real agent executable
//! - `AgentError` reports what happened to a single run

pub mod error;
pub mod invoker;
pub mod response;

pub use error::AgentError;
pub use invoker::{AgentInvoker, CliAgentInvoker, DEFAULT_AGENT_PATH};
pub use response::{AgentAnswer, AgentPayload};
