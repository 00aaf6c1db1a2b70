//! The testable-mode gate: cooperative scheduling for deterministic tests.
//!
//! When testable mode is enabled, all thread progress is serialised through
//! a single gate (a binary semaphore). Every push-type transport boundary is
//! wrapped in a [`TestableAccessor`] which counts written-but-unread values
//! per variable and releases the gate around blocking reads. A test can then
//! step the application until every counter is zero, with stall detection if
//! no other thread can make progress.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};
use std::time::Duration;

use sf_core::{Buffer2D, UserValue, VariableId, VersionNumber};

use crate::element::{Interrupter, SyncAccessor};
use crate::error::{TransportError, TransportResult};

/// Peek into a transport queue without consuming, used by the stall listing
/// to distinguish "unread data in queue" from "data loss".
pub trait QueueProbe: Send + Sync {
    fn has_pending(&self) -> bool;
}

/// If the same thread re-acquires the gate this many times with no other
/// thread interposing, no other thread can make progress.
const STALL_REPEAT_LIMIT: u32 = 100;

/// Back-off before a repeating owner takes the gate again, giving the other
/// threads a chance to interpose.
const REPEAT_BACKOFF: Duration = Duration::from_millis(10);

struct VarEntry {
    name: String,
    pending: u64,
    poll_mode: bool,
    probe: Option<Arc<dyn QueueProbe>>,
}

struct GateState {
    holder: Option<ThreadId>,
    last_owner: Option<ThreadId>,
    repeat_count: u32,
    vars: HashMap<VariableId, VarEntry>,
    total_pending: u64,
    debug: bool,
}

/// The process-wide cooperative gate.
pub struct TestableGate {
    state: Mutex<GateState>,
    released: Condvar,
}

impl TestableGate {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GateState {
                holder: None,
                last_owner: None,
                repeat_count: 0,
                vars: HashMap::new(),
                total_pending: 0,
                debug: false,
            }),
            released: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Log every acquire/release via `tracing::debug!`.
    pub fn enable_debug(&self) {
        self.lock().debug = true;
    }

    /// Register a variable for counting. Poll-mode variables are never
    /// wrapped by a decorator; the flag only records them for diagnostics.
    pub fn register_variable(
        &self,
        id: VariableId,
        name: String,
        probe: Option<Arc<dyn QueueProbe>>,
        poll_mode: bool,
    ) {
        self.lock().vars.insert(
            id,
            VarEntry {
                name,
                pending: 0,
                poll_mode,
                probe,
            },
        );
    }

    /// Take the gate, blocking until it is free.
    ///
    /// Detects stalls: if the calling thread has re-acquired the gate
    /// [`STALL_REPEAT_LIMIT`] times in a row without any other thread
    /// interposing, the gate is kept and `TestsStalled` is returned with a
    /// listing of all variables that still hold unread data.
    pub fn acquire(&self, who: &str) -> TransportResult<()> {
        let me = thread::current().id();

        let repeating = {
            let state = self.lock();
            state.repeat_count > 0 && state.last_owner == Some(me)
        };
        if repeating {
            thread::sleep(REPEAT_BACKOFF);
        }

        let mut state = self.lock();
        while state.holder.is_some() {
            state = self
                .released
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state.holder = Some(me);

        if state.last_owner == Some(me) {
            state.repeat_count += 1;
            if state.repeat_count > STALL_REPEAT_LIMIT {
                let listing = Self::stall_listing(&state);
                state.repeat_count = 0;
                return Err(TransportError::TestsStalled { listing });
            }
        } else {
            state.repeat_count = 0;
            state.last_owner = Some(me);
            if state.debug {
                tracing::debug!(thread = ?me, who, "testable gate acquired");
            }
        }
        Ok(())
    }

    /// Release the gate. Tolerates a caller that does not hold it (this can
    /// happen during shutdown after a stall).
    pub fn release(&self, who: &str) {
        let me = thread::current().id();
        let mut state = self.lock();
        if state.holder == Some(me) {
            state.holder = None;
            if state.debug {
                tracing::debug!(thread = ?me, who, "testable gate released");
            }
            drop(state);
            self.released.notify_all();
        } else if state.debug {
            tracing::debug!(thread = ?me, who, "testable gate release without ownership");
        }
    }

    pub fn held_by_current_thread(&self) -> bool {
        self.lock().holder == Some(thread::current().id())
    }

    pub fn increment(&self, id: VariableId) {
        let mut state = self.lock();
        if let Some(entry) = state.vars.get_mut(&id) {
            entry.pending += 1;
            state.total_pending += 1;
        }
    }

    pub fn decrement(&self, id: VariableId) {
        let mut state = self.lock();
        if let Some(entry) = state.vars.get_mut(&id) {
            if entry.pending > 0 {
                entry.pending -= 1;
                state.total_pending -= 1;
            }
        }
    }

    /// Sum of all per-variable counters.
    pub fn total_pending(&self) -> u64 {
        self.lock().total_pending
    }

    pub fn pending_of(&self, id: VariableId) -> u64 {
        self.lock().vars.get(&id).map_or(0, |e| e.pending)
    }

    fn stall_listing(state: &GateState) -> String {
        let mut listing = String::from(
            "The following variables still contain unread values or had data loss \
             due to a queue overflow:\n",
        );
        let mut entries: Vec<&VarEntry> =
            state.vars.values().filter(|e| e.pending > 0).collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        for entry in entries {
            let status = match &entry.probe {
                Some(probe) if probe.has_pending() => "unread data in queue",
                _ => "data loss",
            };
            listing.push_str(&format!("  - {} ({})\n", entry.name, status));
        }
        listing
    }

    /// True if the variable is flagged poll-mode (not counted).
    pub fn is_poll_mode(&self, id: VariableId) -> bool {
        self.lock().vars.get(&id).map_or(false, |e| e.poll_mode)
    }
}

impl Default for TestableGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Decorator integrating an accessor with the testable gate.
///
/// Writes increment the per-variable counter; successful reads decrement
/// it. Blocking reads release the gate before waiting and re-acquire it on
/// wake, so that exactly one thread makes progress at any time.
pub struct TestableAccessor<T: UserValue> {
    inner: Box<dyn SyncAccessor<T>>,
    gate: Arc<TestableGate>,
    id: VariableId,
}

impl<T: UserValue> TestableAccessor<T> {
    pub fn new(inner: Box<dyn SyncAccessor<T>>, gate: Arc<TestableGate>) -> Self {
        let id = inner.variable_id();
        Self { inner, gate, id }
    }
}

impl<T: UserValue> SyncAccessor<T> for TestableAccessor<T> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn variable_id(&self) -> VariableId {
        self.inner.variable_id()
    }

    fn is_readable(&self) -> bool {
        self.inner.is_readable()
    }

    fn is_writeable(&self) -> bool {
        self.inner.is_writeable()
    }

    fn buffer(&self) -> &Buffer2D<T> {
        self.inner.buffer()
    }

    fn buffer_mut(&mut self) -> &mut Buffer2D<T> {
        self.inner.buffer_mut()
    }

    fn version(&self) -> VersionNumber {
        self.inner.version()
    }

    fn interrupter(&self) -> Option<Arc<dyn Interrupter>> {
        self.inner.interrupter()
    }

    fn queue_probe(&self) -> Option<Arc<dyn QueueProbe>> {
        self.inner.queue_probe()
    }

    fn pre_read(&mut self) {
        self.inner.pre_read();
    }

    fn do_read_transfer(&mut self) -> TransportResult<()> {
        self.gate.release("blocking read");
        let result = self.inner.do_read_transfer();
        self.gate.acquire("blocking read")?;
        result?;
        self.gate.decrement(self.id);
        Ok(())
    }

    fn do_read_transfer_non_blocking(&mut self) -> TransportResult<bool> {
        let got = self.inner.do_read_transfer_non_blocking()?;
        if got {
            self.gate.decrement(self.id);
        }
        Ok(got)
    }

    fn do_read_transfer_latest(&mut self) -> TransportResult<bool> {
        let mut got = false;
        while self.inner.do_read_transfer_non_blocking()? {
            self.gate.decrement(self.id);
            got = true;
        }
        Ok(got)
    }

    fn post_read(&mut self) {
        self.inner.post_read();
    }

    fn pre_write(&mut self) {
        self.inner.pre_write();
    }

    fn do_write_transfer(&mut self, version: VersionNumber) -> TransportResult<bool> {
        let lost = self.inner.do_write_transfer(version)?;
        self.gate.increment(self.id);
        Ok(lost)
    }

    fn post_write(&mut self) {
        self.inner.post_write();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pair::transport_pair;

    #[test]
    fn counters_follow_writes_and_reads() {
        let gate = Arc::new(TestableGate::new());
        let id = VariableId::new(1);
        let (tx, rx) = transport_pair::<i32>("t", 1, 1, 5, id);
        gate.register_variable(id, "t".into(), rx.queue_probe(), false);

        let mut tx = TestableAccessor::new(Box::new(tx), Arc::clone(&gate));
        let mut rx = TestableAccessor::new(Box::new(rx), Arc::clone(&gate));

        gate.acquire("test").unwrap();
        for v in [1, 2, 3] {
            tx.buffer_mut().set_value(v).unwrap();
            tx.write().unwrap();
        }
        assert_eq!(gate.total_pending(), 3);
        assert_eq!(gate.pending_of(id), 3);

        assert!(rx.read_non_blocking().unwrap());
        assert_eq!(gate.total_pending(), 2);
        assert!(rx.read_latest().unwrap());
        assert_eq!(gate.total_pending(), 0);
        gate.release("test");
    }

    #[test]
    fn poll_variables_are_flagged_not_counted() {
        let gate = TestableGate::new();
        let id = VariableId::new(2);
        gate.register_variable(id, "polled".into(), None, true);
        assert!(gate.is_poll_mode(id));
        assert!(!gate.is_poll_mode(VariableId::new(3)));
    }

    #[test]
    fn stall_is_detected_with_listing() {
        let gate = Arc::new(TestableGate::new());
        let id = VariableId::new(7);
        let (tx, rx) = transport_pair::<i32>("stuck", 1, 1, 5, id);
        gate.register_variable(id, "Internal:/App/stuck".into(), rx.queue_probe(), false);

        let mut tx = TestableAccessor::new(Box::new(tx), Arc::clone(&gate));
        gate.acquire("test").unwrap();
        tx.buffer_mut().set_value(1).unwrap();
        tx.write().unwrap();

        // Nobody ever reads; repeatedly cycling the gate must stall.
        let error = loop {
            gate.release("test");
            match gate.acquire("test") {
                Ok(()) => continue,
                Err(e) => break e,
            }
        };
        match error {
            TransportError::TestsStalled { listing } => {
                assert!(listing.contains("Internal:/App/stuck"));
                assert!(listing.contains("unread data in queue"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        gate.release("test");
    }

    #[test]
    fn data_loss_shows_in_listing() {
        let gate = Arc::new(TestableGate::new());
        let id = VariableId::new(9);
        let (tx, rx) = transport_pair::<i32>("lossy", 1, 1, 1, id);
        gate.register_variable(id, "lossy".into(), rx.queue_probe(), false);

        let mut tx = TestableAccessor::new(Box::new(tx), Arc::clone(&gate));
        let mut rx = TestableAccessor::new(Box::new(rx), Arc::clone(&gate));
        gate.acquire("test").unwrap();
        tx.buffer_mut().set_value(1).unwrap();
        assert!(!tx.write().unwrap());
        tx.buffer_mut().set_value(2).unwrap();
        assert!(tx.write().unwrap());
        assert_eq!(gate.total_pending(), 2);

        // Drain the single queued value; one counter tick can never clear.
        assert!(rx.read_non_blocking().unwrap());
        assert!(!rx.read_non_blocking().unwrap());
        assert_eq!(gate.total_pending(), 1);

        let error = loop {
            gate.release("test");
            match gate.acquire("test") {
                Ok(()) => continue,
                Err(e) => break e,
            }
        };
        match error {
            TransportError::TestsStalled { listing } => {
                assert!(listing.contains("lossy (data loss)"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        gate.release("test");
    }
}
