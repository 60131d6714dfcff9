use std::collections::HashMap;

use crate::invocation::ResponseFuture;

/// Tracks requests of one connection that still wait for a response.
///
/// Keyed by the frame correlation id. Once the connection fails the table
/// is closed: remaining slots are handed out for failing and new ones are
/// refused, so no request can slip in after the failure was broadcast.
pub(super) struct PendingCalls {
    // ---
    calls: HashMap<u64, Box<dyn ResponseFuture>>,
    closed: bool,
}

impl PendingCalls {
    // ---

    pub fn new() -> Self {
        // ---
        Self {
            calls: HashMap::new(),
            closed: false,
        }
    }

    /// Register a slot for `correlation`.
    ///
    /// Gives the slot back if the table is already closed.
    pub fn register(
        &mut self,
        correlation: u64,
        slot: Box<dyn ResponseFuture>,
    ) -> Result<(), Box<dyn ResponseFuture>> {
        // ---
        if self.closed {
            return Err(slot);
        }
        self.calls.insert(correlation, slot);
        Ok(())
    }

    /// Take the slot awaiting `correlation`, if any.
    pub fn take(&mut self, correlation: u64) -> Option<Box<dyn ResponseFuture>> {
        // ---
        self.calls.remove(&correlation)
    }

    /// Close the table and drain every outstanding slot.
    pub fn close(&mut self) -> Vec<Box<dyn ResponseFuture>> {
        // ---
        self.closed = true;
        self.calls.drain().map(|(_, slot)| slot).collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.calls.len()
    }
}
