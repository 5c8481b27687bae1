//! Session-scoped observability counters.
//!
//! No global state and no external sinks: one unit of work, one set of
//! counters, snapshot via `Session::metrics`.

///
/// SessionMetrics
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SessionMetrics {
    pub entities_tracked: u64,
    pub records_mapped: u64,
    pub records_persisted: u64,
    pub records_saved: u64,
    pub relations_processed: u64,
    pub tombstones_set: u64,
    pub flush_passes: u64,
}

impl SessionMetrics {
    pub(crate) const fn bump(counter: &mut u64) {
        *counter = counter.saturating_add(1);
    }
}
