//! Commands Queue - a fixed-size worker pool for blocking and CPU-bound work.
//!
//! Callers hand the queue *commands*: closures that receive the
//! [`ExecutionContext`] of the executor thread running them. Commands can be
//! fire-and-forget or waitable, can be composed into a [`Chain`], and are
//! cancelled cooperatively: a running command polls
//! [`ExecutionContext::is_cancelled`] and returns on its own.
//!
//! # Quick Start
//!
//! ```no_run
//! use commands_queue::prelude::*;
//!
//! let queue = CommandsQueue::new(4).unwrap();
//! queue.add_init(|ctx| println!("executor {} up", ctx.thread_index())).unwrap();
//! queue.start().unwrap();
//!
//! for tile in 0..16 {
//!     queue.add(move |ctx| {
//!         if ctx.is_cancelled() {
//!             return;
//!         }
//!         println!("rendering tile {} on {}", tile, ctx.thread_index());
//!     }).unwrap();
//! }
//!
//! queue.join();
//! queue.cancel();
//! ```
//!
//! # Lifecycle
//!
//! - **Startup**: every executor runs the init list before popping any work.
//! - **Running**: executors pop and perform main-queue commands one at a time.
//! - **Cancel**: contexts are flagged, queued work is discarded, each executor
//!   runs the cancel list and exits.
//! - **Shutdown**: the queue is drained, each executor runs the fin list and
//!   exits.

#![warn(missing_debug_implementations)]

pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod prelude;
pub mod queue;

pub use config::{Config, ConfigBuilder};
pub use engine::{CommandsQueue, EngineStats, Phase};
pub use error::{Error, Result};
pub use executor::{Chain, Command, ExecutionContext, PanicStrategy};
pub use queue::{Pop, WorkQueue};
