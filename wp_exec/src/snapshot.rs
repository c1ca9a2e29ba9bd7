//! # Latest-value cells
//!
//! Values written asynchronously (poses, stop hints) are not queued: each write replaces the
//! previous value and readers only ever see the most recent complete value. The lock is held only
//! for the copy in or out, so writers and the cycle never block each other for longer than that.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::sync::{Mutex, MutexGuard, PoisonError};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A single-slot, latest-value-wins cell.
#[derive(Debug)]
pub struct LatestCell<T: Copy> {
    value: Mutex<Option<T>>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<T: Copy> LatestCell<T> {
    /// Create a new empty cell.
    pub fn new() -> Self {
        Self {
            value: Mutex::new(None),
        }
    }

    /// Replace the value in the cell.
    pub fn store(&self, value: T) {
        *self.lock() = Some(value);
    }

    /// Empty the cell.
    pub fn clear(&self) {
        *self.lock() = None;
    }

    /// Get a copy of the most recent value, or `None` if the cell has never been written (or was
    /// cleared).
    pub fn snapshot(&self) -> Option<T> {
        *self.lock()
    }

    fn lock(&self) -> MutexGuard<Option<T>> {
        // A panicking writer cannot leave a half-written `Copy` value behind, so the data is
        // still valid if the lock was poisoned.
        self.value.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Copy> Default for LatestCell<T> {
    fn default() -> Self {
        Self::new()
    }
}
