pub mod cleanup;
pub mod store;
pub mod types;

pub use cleanup::{CleanupResult, CleanupScheduler};
pub use store::SessionStore;
pub use types::{Message, Role, Session};
