//! Memory accounting for feeder buffers

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::Instant;

use crate::error::{Error, Result};

/// Memory budget for controlling and tracking buffer growth
///
/// Shared between feeders through an `Arc`; every capacity growth of a
/// buffer store is charged here before the allocation happens.
#[derive(Debug)]
pub struct MemoryBudget {
    /// The total memory budget in bytes
    total_budget: usize,

    /// The current memory usage in bytes
    current_usage: AtomicUsize,

    /// Memory usage statistics
    stats: RwLock<MemoryStats>,
}

/// Memory usage statistics
#[derive(Debug, Clone)]
pub struct MemoryStats {
    /// Total bytes ever charged
    pub total_allocated: usize,

    /// Peak memory usage in bytes
    pub peak_usage: usize,

    /// Buffer usages (name, current bytes, capacity bytes)
    pub buffer_usages: Vec<(String, usize, usize)>,

    /// Last time the stats were updated
    pub last_updated: Instant,
}

impl MemoryBudget {
    /// Create a new memory budget with the given total budget
    pub fn new(total_budget: usize) -> Self {
        Self {
            total_budget,
            current_usage: AtomicUsize::new(0),
            stats: RwLock::new(MemoryStats {
                total_allocated: 0,
                peak_usage: 0,
                buffer_usages: Vec::new(),
                last_updated: Instant::now(),
            }),
        }
    }

    /// Try to charge `bytes`, returns false if that would exceed the budget
    pub fn try_allocate(&self, bytes: usize) -> bool {
        let mut current = self.current_usage.load(Ordering::SeqCst);

        loop {
            let Some(next) = current.checked_add(bytes).filter(|&n| n <= self.total_budget) else {
                return false;
            };

            match self.current_usage.compare_exchange(
                current,
                next,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => {
                    let mut stats = self.stats.write().unwrap_or_else(PoisonError::into_inner);
                    stats.total_allocated += bytes;
                    stats.peak_usage = stats.peak_usage.max(next);
                    stats.last_updated = Instant::now();
                    return true;
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Charge `bytes`, returning an error if it exceeds the budget
    pub fn allocate(&self, bytes: usize) -> Result<()> {
        if self.try_allocate(bytes) {
            Ok(())
        } else {
            Err(Error::MemoryBudgetExceeded {
                requested: bytes,
                available: self.available(),
            })
        }
    }

    /// Release previously charged memory
    pub fn release(&self, bytes: usize) {
        let prev = self.current_usage.fetch_sub(bytes, Ordering::SeqCst);
        debug_assert!(
            prev >= bytes,
            "Attempted to release more memory than allocated: prev={prev}, release={bytes}"
        );

        let mut stats = self.stats.write().unwrap_or_else(PoisonError::into_inner);
        stats.last_updated = Instant::now();
    }

    /// Record the current and capacity bytes of a named buffer
    pub fn register_buffer_usage(&self, name: &str, current: usize, capacity: usize) {
        let mut stats = self.stats.write().unwrap_or_else(PoisonError::into_inner);
        stats.buffer_usages.retain(|(n, _, _)| n != name);
        stats.buffer_usages.push((name.to_string(), current, capacity));
        stats.last_updated = Instant::now();
    }

    /// Total budget in bytes
    pub fn total(&self) -> usize {
        self.total_budget
    }

    /// Get current memory usage
    pub fn usage(&self) -> usize {
        self.current_usage.load(Ordering::SeqCst)
    }

    /// Bytes still available
    pub fn available(&self) -> usize {
        self.total_budget.saturating_sub(self.usage())
    }

    /// Per-buffer usage keyed by name
    pub fn buffer_usage(&self) -> HashMap<String, (usize, usize)> {
        self.stats()
            .buffer_usages
            .into_iter()
            .map(|(name, current, capacity)| (name, (current, capacity)))
            .collect()
    }

    /// Get memory statistics
    pub fn stats(&self) -> MemoryStats {
        self.stats
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
