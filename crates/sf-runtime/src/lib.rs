//! sf-runtime: the connection resolver and runtime wiring engine of
//! signalflow.
//!
//! An application declares a graph of typed variables owned by its modules;
//! this crate resolves that graph into concrete synchronized transports and
//! fan-outs, runs one thread per module plus the internal fan-out threads,
//! and offers a testable mode that serialises execution for deterministic
//! tests.
//!
//! # Example
//!
//! ```no_run
//! use sf_runtime::{Application, UpdateMode};
//!
//! # fn main() -> sf_runtime::RuntimeResult<()> {
//! let mut app = Application::new("demo")?;
//! let producer = app.add_module(app.root(), "producer", "counts up")?;
//! let consumer = app.add_module(app.root(), "consumer", "logs values")?;
//!
//! let out = app.output::<i32>(producer, "count", "", "current count", 1)?;
//! let inp = app.input::<i32>(consumer, "count", "", "", UpdateMode::Push, 1)?;
//! app.connect(out.node(), inp.node())?;
//!
//! app.add_worker(producer, move || {
//!     for value in 0.. {
//!         out.write_value(value)?;
//!     }
//!     Ok(())
//! });
//! app.add_worker(consumer, move || loop {
//!     inp.read()?;
//! });
//!
//! app.run()?;
//! # Ok(())
//! # }
//! ```

pub mod application;
pub mod error;
pub mod handle;
pub mod testkit;
pub mod worker;
pub mod xmlgen;

mod fanout;
mod resolver;
mod threaded;
mod trigger;

// Re-exports for ergonomics
pub use application::Application;
pub use error::{RuntimeError, RuntimeResult};
pub use handle::{InputHandle, OutputHandle, PendingRead, RuntimeValue};
pub use testkit::{MemoryBackend, TestAdapter};
pub use worker::ModuleWorker;
pub use xmlgen::VariableListEntry;

pub use sf_core::{ValueType, VersionNumber};
pub use sf_graph::UpdateMode;
pub use sf_transport::SyncDirection;
