pub mod error;
pub mod scheduled_executor;

pub use error::{CoreError, CoreResult};
pub use scheduled_executor::{ScheduledExecutor, ScheduledTask};
