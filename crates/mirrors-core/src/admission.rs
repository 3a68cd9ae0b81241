use crate::cancel::CancelToken;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// Counting admission control: at most `limit` permits are out at once.
pub struct AdmissionGate {
    limit: usize,
    in_use: Mutex<usize>,
    freed: Condvar,
}

/// A slot in the gate, returned when dropped.
pub struct Permit<'a> {
    gate: &'a AdmissionGate,
}

impl AdmissionGate {
    /// A limit of zero is treated as one.
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            in_use: Mutex::new(0),
            freed: Condvar::new(),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn in_use(&self) -> usize {
        self.in_use.lock().map_or(0, |n| *n)
    }

    /// Wait for a free slot, re-checking `cancel` at least every `tick`.
    /// Returns `None` once cancelled; no permit is handed out after that.
    pub fn acquire(&self, cancel: &CancelToken, tick: Duration) -> Option<Permit<'_>> {
        let mut in_use = self.in_use.lock().ok()?;
        loop {
            if cancel.is_cancelled() {
                return None;
            }
            if *in_use < self.limit {
                *in_use += 1;
                return Some(Permit { gate: self });
            }
            in_use = self.freed.wait_timeout(in_use, tick).ok()?.0;
        }
    }

    fn release(&self) {
        if let Ok(mut in_use) = self.in_use.lock() {
            *in_use = in_use.saturating_sub(1);
        }
        self.freed.notify_one();
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        self.gate.release();
    }
}
