//! Execution mode: who may run callbacks in parallel, and the scoped
//! resource that forces serial execution around stateful callbacks.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Declares what a callback is allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackMode {
    /// Numeric kernel without shared mutable state. Rows may be processed
    /// on several threads.
    Pure,
    /// Callback with side effects or a shared interpreter behind it. Exactly
    /// one call is in flight at a time, in row-major order.
    #[default]
    Stateful,
}

#[derive(Debug)]
struct BudgetState {
    configured: usize,
    serial_holders: usize,
}

/// The ambient thread-count configuration.
///
/// `0` means "use every available core". While any [`SerialScope`] is held
/// the effective count is 1; dropping the last scope brings back the
/// configured value.
#[derive(Debug)]
pub struct ThreadBudget {
    state: Mutex<BudgetState>,
}

impl ThreadBudget {
    pub fn new(threads: usize) -> Self {
        Self {
            state: Mutex::new(BudgetState {
                configured: threads,
                serial_holders: 0,
            }),
        }
    }

    pub fn new_shared(threads: usize) -> Arc<Self> {
        Arc::new(Self::new(threads))
    }

    /// Thread count in effect right now.
    pub fn current(&self) -> usize {
        let state = self.state.lock();
        if state.serial_holders > 0 {
            1
        } else {
            state.configured
        }
    }

    /// Configured thread count, ignoring any active serial scope.
    pub fn configured(&self) -> usize {
        self.state.lock().configured
    }

    /// Change the configured count and return the previous one.
    pub fn set(&self, threads: usize) -> usize {
        let mut state = self.state.lock();
        std::mem::replace(&mut state.configured, threads)
    }

    /// Force single-threaded execution until the returned guard is dropped.
    pub fn serial_scope(&self) -> SerialScope<'_> {
        let mut state = self.state.lock();
        state.serial_holders += 1;
        log::trace!(
            "entering serial scope (configured threads: {}, holders: {})",
            state.configured,
            state.serial_holders
        );
        SerialScope { budget: self }
    }

    pub fn is_serial(&self) -> bool {
        self.state.lock().serial_holders > 0
    }
}

impl Default for ThreadBudget {
    fn default() -> Self {
        Self::new(0)
    }
}

/// Guard returned by [`ThreadBudget::serial_scope`].
///
/// Restoration happens in `Drop`, so it runs on early returns, `?`
/// propagation and unwinding alike.
#[must_use = "the serial mode ends when the scope is dropped"]
#[derive(Debug)]
pub struct SerialScope<'a> {
    budget: &'a ThreadBudget,
}

impl Drop for SerialScope<'_> {
    fn drop(&mut self) {
        let mut state = self.budget.state.lock();
        state.serial_holders = state.serial_holders.saturating_sub(1);
        log::trace!("leaving serial scope (holders: {})", state.serial_holders);
    }
}
