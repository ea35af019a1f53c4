//! Shutdown gate coordinating in-flight operations with close.
//!
//! Every public store operation enters through [`Gate::enter`], which
//! fails once the gate is closed and otherwise hands out an RAII
//! [`Permit`] counted against the close drain. [`Gate::close`] flips the
//! closed flag (idempotently) and waits for outstanding permits to drop,
//! up to a deadline.

use std::sync::{Condvar, Mutex};
use std::time::Duration;

use crate::error::StoreError;

pub(crate) struct Gate {
    state: Mutex<GateState>,
    drained: Condvar,
}

struct GateState {
    closed: bool,
    in_flight: usize,
}

/// Proof that an operation entered before close. Dropping it releases the
/// operation's slot in the drain count.
pub(crate) struct Permit<'a> {
    gate: &'a Gate,
}

impl Gate {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(GateState {
                closed: false,
                in_flight: 0,
            }),
            drained: Condvar::new(),
        }
    }

    /// Atomically check the closed flag and register an in-flight operation.
    pub(crate) fn enter(&self) -> Result<Permit<'_>, StoreError> {
        let mut state = self.state.lock().expect("gate lock poisoned");
        if state.closed {
            return Err(StoreError::Closed);
        }
        state.in_flight += 1;
        Ok(Permit { gate: self })
    }

    /// Close the gate and wait for in-flight operations to finish.
    ///
    /// Returns `true` if the gate drained fully, `false` if the deadline
    /// passed with operations still running. Safe to call repeatedly.
    pub(crate) fn close(&self, deadline: Duration) -> bool {
        let mut state = self.state.lock().expect("gate lock poisoned");
        state.closed = true;
        let (_state, timeout) = self
            .drained
            .wait_timeout_while(state, deadline, |s| s.in_flight > 0)
            .expect("gate lock poisoned");
        !timeout.timed_out()
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        let mut state = self.gate.state.lock().expect("gate lock poisoned");
        state.in_flight -= 1;
        if state.in_flight == 0 {
            self.gate.drained.notify_all();
        }
    }
}
