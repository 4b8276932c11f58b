//! Scheduler-facing slice of `EngineConfig` (§6): thread count and pinning
//! policy. Kept separate from `sqlexec-engine::EngineConfig` so the
//! scheduler crate doesn't depend on the engine crate.

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Number of worker threads, one per configured CPU core.
    pub thread_count: usize,
    /// Pin each worker thread to a CPU core.
    pub core_affinity: bool,
    /// First core index to assign, when `core_affinity` is set.
    pub initial_core: usize,
    /// Spread worker threads uniformly across NUMA nodes. Implies
    /// `core_affinity`; this crate has no NUMA topology source of its own,
    /// so it degrades to plain sequential core assignment starting at
    /// `initial_core` (the engine layer is expected to pass an explicit
    /// `core_affinity` policy derived from real topology when it matters).
    pub assign_numa_nodes_uniformly: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            thread_count: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
            core_affinity: false,
            initial_core: 0,
            assign_numa_nodes_uniformly: false,
        }
    }
}
