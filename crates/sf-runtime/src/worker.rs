//! The worker contract for application modules.

use crate::error::RuntimeResult;

/// User-supplied body of an application module.
///
/// `main_loop` runs on a dedicated thread once the application is up. It is
/// expected to loop over reads and writes of the module's handles; shutdown
/// interrupts the blocking reads, and the resulting
/// [`Interrupted`](sf_transport::TransportError::Interrupted) error should
/// simply be propagated to end the loop.
pub trait ModuleWorker: Send + 'static {
    /// Called on the main thread before any worker thread starts.
    fn prepare(&mut self) -> RuntimeResult<()> {
        Ok(())
    }

    fn main_loop(&mut self) -> RuntimeResult<()>;
}

/// Plain closures work as module bodies.
impl<F> ModuleWorker for F
where
    F: FnMut() -> RuntimeResult<()> + Send + 'static,
{
    fn main_loop(&mut self) -> RuntimeResult<()> {
        self()
    }
}
