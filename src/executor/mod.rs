//! Command execution infrastructure.
//!
//! Commands, chains, the per-thread execution context and the routine each
//! executor thread runs.

pub mod command;
pub mod context;
pub mod panic_handler;
pub(crate) mod routine;

pub use command::{Chain, Command, CommandFn};
pub use context::ExecutionContext;
pub use panic_handler::{PanicHandler, PanicInfo, PanicStrategy};
