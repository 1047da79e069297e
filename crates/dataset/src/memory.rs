use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

/// Accounts for memory materialized by scans.
///
/// Batches leave the pool's sight once they are yielded, so nothing is ever
/// returned to it: the counts are cumulative over the pool's lifetime.
pub trait MemoryPool: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Records `bytes` as handed out by this pool.
    fn allocate(&self, bytes: usize);

    /// Total bytes handed out since the pool was created. Never decreases.
    fn bytes_allocated(&self) -> usize;
}

/// A pool that only keeps a running total. Give each scan its own pool to
/// measure that scan alone.
#[derive(Debug)]
pub struct TrackingMemoryPool {
    name: String,
    allocated: AtomicUsize,
}

impl TrackingMemoryPool {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), allocated: AtomicUsize::new(0) }
    }
}

impl MemoryPool for TrackingMemoryPool {
    fn name(&self) -> &str {
        &self.name
    }

    fn allocate(&self, bytes: usize) {
        self.allocated.fetch_add(bytes, Ordering::Relaxed);
    }

    fn bytes_allocated(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }
}

/// The process-wide pool used when a scan does not bring its own.
pub fn default_memory_pool() -> Arc<dyn MemoryPool> {
    static POOL: OnceLock<Arc<dyn MemoryPool>> = OnceLock::new();
    POOL.get_or_init(|| Arc::new(TrackingMemoryPool::new("default"))).clone()
}
