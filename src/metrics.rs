//! Ambient observability counters (spec §7: "counter incremented for
//! observability" on checksum mismatch; SPEC_FULL.md §2 ambient stack).
//!
//! The teacher's own `utils::metrics::Metrics` is a mutex-guarded,
//! dashboard-facing time series; CSV export and the dashboard are
//! explicit non-goals here (spec §1), so this is narrowed to the single
//! thing the core itself needs: plain running counters the scheduler
//! updates in place, with no locking since the core is single-threaded
//! (spec §5). A host embedding this crate can sample `CoreMetrics` at any
//! cadence it likes; the crate does not export or serve them itself.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CoreMetrics {
    pub ticks: u64,
    pub fast_loop_runs: u64,
    pub medium_loop_runs: u64,
    pub slow_loop_runs: u64,
    pub alert_mode_entries: u64,
    pub input_timeouts: u64,
    pub transport_send_failures: u64,
    pub receiver_resync_events: u64,
    pub receiver_checksum_mismatches: u64,
    pub correlation_transitions: u64,
}

impl CoreMetrics {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_metrics_are_all_zero() {
        assert_eq!(CoreMetrics::new(), CoreMetrics::default());
    }
}
