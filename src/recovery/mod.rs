pub mod retry;
pub mod supervisor;

pub use retry::RetryPolicy;
pub use supervisor::{BrowserSupervisor, MemoryCheck, RecoveryConfig};
