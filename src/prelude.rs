pub use crate::config::{Config, ConfigBuilder};
pub use crate::engine::{CommandsQueue, EngineStats, Phase};
pub use crate::error::{Error, Result};
pub use crate::executor::{Chain, Command, ExecutionContext, PanicStrategy};
