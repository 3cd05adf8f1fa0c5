//! Request orchestration: session operations, error classification and retry

pub mod classify;
pub mod retry;
pub mod service;

pub use classify::{ErrorClass, classify, failure_kind};
pub use retry::RetryPolicy;
pub use service::{DEFAULT_REQUEST_TIMEOUT, Orchestrator};
