//! Multi-rate cooperative scheduler (spec §4.1): fast/medium/slow loops
//! dispatched from a single owned virtual clock, an adaptive alert
//! profile, and external-input assembly that falls back to a
//! deterministic producer after an idle timeout.
//!
//! Grounded on the teacher's `Sensor::run()` periodic-release loop and
//! `Processor::run()` dispatch loop (`component_a/sensor.rs`,
//! `component_a/processor.rs`): both are "wake on a deadline, do the
//! work, re-arm the deadline" loops. This scheduler keeps that shape but
//! collapses the teacher's three OS threads plus crossbeam channels into
//! one owning struct driven by a single `tick()` call, per spec §9's
//! "process-wide mutable state -> owning aggregate" redesign flag and
//! spec §5's single-threaded cooperative model.

use log::info;

use crate::collaborators::{Clock, Logger, Outputs, Transport};
use crate::correlation::{CorrelationState, CorrelationStateKind};
use crate::error::CoreResult;
use crate::evaluator;
use crate::fallback::FallbackProducer;
use crate::metrics::CoreMetrics;
use crate::model::{DerivativeHistory, PackSnapshot, NUM_MODULES};
use crate::self_check::RelayArm;
use crate::thresholds::Thresholds;
use crate::wire::decode::ReceiverState;
use crate::wire::encode::{encode_module_frame, encode_pack_frame};

/// Scheduler tick granularity (spec §4.1): bounds worst-case dispatch
/// latency, does not affect semantics.
pub const SCHED_TICK_MS: u64 = 10;

/// Window of silence on the input transport after which the scheduler
/// reverts to the deterministic fallback producer (spec §5).
pub const EXTERNAL_INPUT_TIMEOUT_MS: u64 = 3_000;

/// One loop's period pair for a given profile (spec §4.1 table).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Profile {
    pub fast_ms: u64,
    pub medium_ms: u64,
    pub slow_ms: u64,
}

impl Profile {
    pub const NORMAL: Profile = Profile {
        fast_ms: 100,
        medium_ms: 500,
        slow_ms: 5_000,
    };
    pub const ALERT: Profile = Profile {
        fast_ms: 20,
        medium_ms: 100,
        slow_ms: 1_000,
    };
    /// External-active overrides only the slow loop per spec §4.1; fast
    /// and medium keep whatever profile was already active.
    pub const EXTERNAL_ACTIVE_SLOW_MS: u64 = 1_000;
}

/// Which data source the scheduler is currently driving the medium loop
/// from, for observability only (does not change correlation semantics).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    External,
    Fallback,
}

/// The scheduler's exclusively-owned aggregate (spec §3, §5): working
/// snapshot, thresholds, correlation state, receiver state and
/// derivative history all live here; every subordinate function takes a
/// reference into this struct for the one call that needs it.
pub struct Scheduler<T: Transport, C: Clock, O: Outputs, L: Logger> {
    pub transport: T,
    pub clock: C,
    pub outputs: O,
    pub logger: L,

    pub snapshot: PackSnapshot,
    pub thresholds: Thresholds,
    pub correlation: CorrelationState,
    pub receiver: ReceiverState,
    pub derivatives: DerivativeHistory,
    pub relay_arm: RelayArm,
    pub metrics: CoreMetrics,

    profile: Profile,
    data_source: DataSource,
    fallback: FallbackProducer,

    next_fast_ms: u64,
    next_medium_ms: u64,
    next_slow_ms: u64,
    last_rx_activity_ms: u64,

    pub last_anomaly: crate::model::AnomalyResult,
}

impl<T: Transport, C: Clock, O: Outputs, L: Logger> Scheduler<T, C, O, L> {
    /// Boots the scheduler: runs self-check, arms (or refuses to arm) the
    /// relay, and starts in the Normal profile at NORMAL/unlatched.
    pub fn new(transport: T, clock: C, outputs: O, mut logger: L) -> Self {
        let thresholds = Thresholds::default();
        let relay_arm = RelayArm::boot(&thresholds);
        if !relay_arm.is_armed() {
            logger.line("self-check failed: relay stays disconnected");
        }

        let now = clock.uptime_ms();
        let mut sched = Self {
            transport,
            clock,
            outputs,
            logger,
            snapshot: PackSnapshot::nominal(),
            thresholds,
            correlation: CorrelationState::new(Profile::NORMAL.medium_ms),
            receiver: ReceiverState::new(),
            derivatives: DerivativeHistory::new(),
            relay_arm,
            metrics: CoreMetrics::new(),
            profile: Profile::NORMAL,
            data_source: DataSource::Fallback,
            fallback: FallbackProducer::new(),
            next_fast_ms: now,
            next_medium_ms: now,
            next_slow_ms: now,
            last_rx_activity_ms: now,
            last_anomaly: crate::model::AnomalyResult::nominal(),
        };
        evaluator::recompute_derived(&mut sched.snapshot);
        sched
    }

    /// Explicit reset (spec §4.1 `reset()`): re-arms every loop deadline
    /// to now and restores the Normal profile. Does not touch the
    /// correlation latch; callers that also want a correlation reset
    /// should call `self.correlation.reset()` themselves.
    pub fn reset(&mut self) {
        let now = self.clock.uptime_ms();
        self.profile = Profile::NORMAL;
        self.next_fast_ms = now;
        self.next_medium_ms = now;
        self.next_slow_ms = now;
        self.correlation.sync_limits(Profile::NORMAL.medium_ms);
    }

    /// True when any safety-relevant signal is present (spec §4.1 alert
    /// condition).
    fn alert_condition(&self) -> bool {
        self.snapshot.short_circuit
            || self.last_anomaly.active_count > 0
            || self.correlation.current_state != CorrelationStateKind::Normal
    }

    /// Selects Normal/Alert/External-active and pulls deadlines inward
    /// when the new period is shorter (spec §4.1 `apply_sampling_rates`).
    fn apply_sampling_rates(&mut self) {
        let now = self.clock.uptime_ms();
        let target = if self.alert_condition() {
            Profile::ALERT
        } else {
            Profile::NORMAL
        };

        if target != self.profile {
            if target.fast_ms < self.profile.fast_ms {
                self.next_fast_ms = self.next_fast_ms.min(now + target.fast_ms);
            }
            if target.medium_ms < self.profile.medium_ms {
                self.next_medium_ms = self.next_medium_ms.min(now + target.medium_ms);
            }
            if target.slow_ms < self.profile.slow_ms {
                self.next_slow_ms = self.next_slow_ms.min(now + target.slow_ms);
            }
            if target == Profile::ALERT {
                self.metrics.alert_mode_entries += 1;
            }
            self.profile = target;
            self.correlation.sync_limits(self.profile.medium_ms);
        }

        if self.data_source == DataSource::External {
            let slow_target = now + Profile::EXTERNAL_ACTIVE_SLOW_MS;
            if Profile::EXTERNAL_ACTIVE_SLOW_MS < self.profile.slow_ms {
                self.next_slow_ms = self.next_slow_ms.min(slow_target);
            }
        }
    }

    /// Advances virtual time by one [`SCHED_TICK_MS`] and runs any loop
    /// whose deadline has arrived (spec §4.1 `tick()`).
    pub fn tick(&mut self) {
        self.metrics.ticks += 1;
        self.drain_input();

        let now = self.clock.uptime_ms();

        if now >= self.next_fast_ms {
            self.run_fast_loop();
            self.next_fast_ms = now + self.profile.fast_ms;
        }
        if now >= self.next_medium_ms {
            self.run_medium_loop();
            self.next_medium_ms = now + self.profile.medium_ms;
        }
        if now >= self.next_slow_ms {
            self.run_slow_loop();
            self.next_slow_ms = now + self.profile.slow_ms;
        }

        self.check_input_timeout(now);
    }

    /// Pulls whatever bytes the transport has ready into the receiver,
    /// and swaps in a completed external snapshot (spec §4.1, §4.5 step 6).
    fn drain_input(&mut self) {
        let mut saw_byte = false;
        while let Some(byte) = self.transport.recv_byte() {
            saw_byte = true;
            self.receiver.push_byte(byte);
        }
        if saw_byte {
            self.last_rx_activity_ms = self.clock.uptime_ms();
            self.data_source = DataSource::External;
        }
        self.metrics.receiver_resync_events = self.receiver.resync_events;
        self.metrics.receiver_checksum_mismatches = self.receiver.checksum_mismatches;

        if self.receiver.snapshot_complete() {
            if let Some(snap) = self.receiver.build_snapshot() {
                self.snapshot = snap;
                evaluator::recompute_derived(&mut self.snapshot);
            }
            self.receiver.reset_cycle();
        }
    }

    /// If no input byte has arrived within [`EXTERNAL_INPUT_TIMEOUT_MS`],
    /// reverts the data source to the fallback producer (spec §5). Logged
    /// exactly once on the transition.
    fn check_input_timeout(&mut self, now: u64) {
        if self.data_source == DataSource::External
            && now.saturating_sub(self.last_rx_activity_ms) >= EXTERNAL_INPUT_TIMEOUT_MS
        {
            self.data_source = DataSource::Fallback;
            self.metrics.input_timeouts += 1;
            info!("external input timed out; reverting to fallback producer");
            self.logger.line("input timeout: fallback producer engaged");
            self.snapshot = self.fallback.produce();
            evaluator::recompute_derived(&mut self.snapshot);
        }
    }

    /// Cheap overcurrent/short-circuit pre-check (spec §4.1): forces
    /// `short_circuit`, runs a mid-cycle evaluation, applies rates, and
    /// drives emergency outputs if correlation lands on EMERGENCY.
    fn run_fast_loop(&mut self) {
        self.metrics.fast_loop_runs += 1;

        let alert_sentinel = self.thresholds.current_short_a.max(self.thresholds.current_emergency_a);
        if self.snapshot.pack_current_a.abs() > alert_sentinel {
            self.snapshot.short_circuit = true;
        }

        if self.snapshot.short_circuit {
            let result = evaluator::evaluate(&self.snapshot, &self.thresholds);
            self.last_anomaly = result;
            let prev_state = self.correlation.current_state;
            let state = self.correlation.update(&result);
            if state != prev_state {
                self.metrics.correlation_transitions += 1;
            }
            self.apply_sampling_rates();
            if state == CorrelationStateKind::Emergency {
                self.drive_emergency_outputs();
            }
        } else {
            self.apply_sampling_rates();
        }
    }

    /// Fixed-order medium loop (spec §4.1, §5): derivatives, pre-pass,
    /// category evaluation, correlation counter resync, correlation
    /// update, status outputs.
    fn run_medium_loop(&mut self) {
        self.metrics.medium_loop_runs += 1;
        self.snapshot.short_circuit = false;

        self.update_derivatives();
        evaluator::recompute_derived(&mut self.snapshot);

        let result = evaluator::evaluate(&self.snapshot, &self.thresholds);
        self.last_anomaly = result;

        self.correlation.sync_limits(self.profile.medium_ms);

        let prev_state = self.correlation.current_state;
        let state = self.correlation.update(&result);
        if state != prev_state {
            self.metrics.correlation_transitions += 1;
            info!("correlation state transition: {:?} -> {:?}", prev_state, state);
        }

        self.outputs.set_state_leds(state.as_u8());
        if state == CorrelationStateKind::Emergency {
            self.drive_emergency_outputs();
        }
    }

    /// Computes `dr/dt` and per-module `dT/dt` as first differences over
    /// the current medium period (spec §3 `DerivativeHistory`).
    fn update_derivatives(&mut self) {
        let period_s = self.profile.medium_ms as f64 / 1000.0;
        if period_s <= 0.0 {
            return;
        }

        if let Some(prev_r) = self.derivatives.prev_r_internal_mohm {
            let dr = self.snapshot.r_internal_mohm - prev_r;
            self.snapshot.dr_dt_mohm_per_s = if dr.is_finite() { dr / period_s } else { 0.0 };
        }
        self.derivatives.prev_r_internal_mohm = Some(self.snapshot.r_internal_mohm);

        if self.derivatives.prev_module_ntc.len() != self.snapshot.modules.len() {
            self.derivatives.prev_module_ntc = vec![(f64::NAN, f64::NAN); self.snapshot.modules.len()];
        }

        let period_min = self.profile.medium_ms as f64 / 60_000.0;
        for (i, module) in self.snapshot.modules.iter_mut().enumerate() {
            let (prev1, prev2) = self.derivatives.prev_module_ntc[i];
            let rate = if prev1.is_finite() && prev2.is_finite() && period_min > 0.0 {
                let d1 = ((module.ntc1_c - prev1) / period_min).abs();
                let d2 = ((module.ntc2_c - prev2) / period_min).abs();
                d1.max(d2)
            } else {
                0.0
            };
            module.max_dt_dt = rate;
            self.derivatives.prev_module_ntc[i] = (module.ntc1_c, module.ntc2_c);
        }
    }

    /// Slow loop (spec §4.1): one pack frame then one module frame per
    /// module, in index order, as a single logical burst.
    fn run_slow_loop(&mut self) {
        self.metrics.slow_loop_runs += 1;

        let timestamp_ms = self.clock.uptime_ms();
        let pack_frame = encode_pack_frame(
            timestamp_ms,
            &self.snapshot,
            self.correlation.current_state,
            &self.last_anomaly,
        );
        if self.transport.send(&pack_frame).is_err() {
            self.metrics.transport_send_failures += 1;
        }

        for (i, module) in self.snapshot.modules.iter().enumerate() {
            let frame = encode_module_frame(i, module);
            if self.transport.send(&frame).is_err() {
                self.metrics.transport_send_failures += 1;
            }
        }
    }

    fn drive_emergency_outputs(&mut self) {
        self.outputs.relay_disconnect();
        self.outputs.buzzer_pulse(500);
        self.logger.line("EMERGENCY: pack disconnected");
    }

    /// Host-facing connect request: no-op unless self-check armed the
    /// relay (spec §4.4).
    pub fn try_relay_connect(&mut self) {
        if self.relay_arm.is_armed() {
            self.outputs.relay_connect();
        }
    }

    pub fn current_state(&self) -> CorrelationStateKind {
        self.correlation.current_state
    }

    pub fn data_source(&self) -> DataSource {
        self.data_source
    }
}

/// Convenience constructor bound used by the demo binary and tests: runs
/// `n` ticks back to back, advancing the clock by one [`SCHED_TICK_MS`]
/// before each.
pub fn run_ticks<T: Transport, C: Clock, O: Outputs, L: Logger>(
    sched: &mut Scheduler<T, C, O, L>,
    n: u64,
) {
    for _ in 0..n {
        sched.tick();
    }
}

/// Sends a fully-formed input snapshot (one pack frame + `NUM_MODULES`
/// module frames) into `transport`'s inbound queue, for demo/test
/// producers that want to push a snapshot in one shot.
pub fn inject_snapshot(
    transport: &mut crate::collaborators::LoopbackTransport,
    pack: &crate::wire::decode::ParsedPackFields,
    modules: &[crate::wire::decode::ParsedModuleFields; NUM_MODULES],
) -> CoreResult<()> {
    transport.inject(&crate::wire::decode::encode_input_pack_frame(pack));
    for (i, m) in modules.iter().enumerate() {
        transport.inject(&crate::wire::decode::encode_input_module_frame(i, m));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{LoopbackTransport, RecordingLogger, RecordingOutputs, SimClock};

    fn new_scheduler() -> Scheduler<LoopbackTransport, SimClock, RecordingOutputs, RecordingLogger> {
        let mut outputs = RecordingOutputs::default();
        outputs.armed = true;
        Scheduler::new(
            LoopbackTransport::new(),
            SimClock::new(),
            outputs,
            RecordingLogger::default(),
        )
    }

    fn tick_n(sched: &mut Scheduler<LoopbackTransport, SimClock, RecordingOutputs, RecordingLogger>, n: u64) {
        for _ in 0..n {
            sched.clock.advance(SCHED_TICK_MS);
            sched.tick();
        }
    }

    #[test]
    fn s1_nominal_snapshot_held_stays_normal() {
        let mut sched = new_scheduler();
        tick_n(&mut sched, 200);
        assert_eq!(sched.current_state(), CorrelationStateKind::Normal);
        assert_eq!(sched.last_anomaly.active_mask, 0);
        assert!(sched.last_anomaly.risk_factor < 0.1);
        assert_eq!(sched.last_anomaly.cascade_stage, 0);
    }

    #[test]
    fn s6_short_circuit_current_spike_latches_emergency() {
        let mut sched = new_scheduler();
        sched.snapshot.pack_current_a = 400.0;
        sched.snapshot.short_circuit = true;
        tick_n(&mut sched, 5);
        assert_eq!(sched.current_state(), CorrelationStateKind::Emergency);
        assert!(sched.correlation.emergency_latched);
        assert!(!sched.outputs.relay_connected);
    }

    #[test]
    fn alert_condition_accelerates_loop_periods() {
        let mut sched = new_scheduler();
        assert_eq!(sched.profile, Profile::NORMAL);
        sched.snapshot.pack_current_a = 400.0;
        sched.snapshot.short_circuit = true;
        tick_n(&mut sched, 1);
        assert_eq!(sched.profile, Profile::ALERT);
        assert!(sched.metrics.alert_mode_entries >= 1);
    }

    #[test]
    fn relay_never_connects_when_self_check_leaves_it_disarmed() {
        let mut outputs = RecordingOutputs::default();
        outputs.armed = true;
        let mut thresholds_bad = Thresholds::default();
        thresholds_bad.temp_critical_c = thresholds_bad.temp_warning_c - 1.0;
        let relay_arm = RelayArm::boot(&thresholds_bad);
        assert!(!relay_arm.is_armed());

        let mut sched = new_scheduler();
        sched.relay_arm = relay_arm;
        sched.try_relay_connect();
        assert!(!sched.outputs.relay_connected);
    }

    #[test]
    fn external_input_completes_a_snapshot_and_is_adopted() {
        use crate::wire::decode::{ParsedModuleFields, ParsedPackFields};

        let mut sched = new_scheduler();
        let pack = ParsedPackFields {
            pack_voltage_v: 377.0,
            pack_current_a: 2.0,
            r_internal_mohm: 42.0,
            ambient_c: 24.0,
            coolant_inlet_c: 19.0,
            coolant_outlet_c: 21.0,
            humidity_pct: 35.0,
            isolation_mohm: 4_800.0,
            gas_ratio_1: 1.0,
            gas_ratio_2: 1.0,
            pressure_delta_1_hpa: 0.0,
            pressure_delta_2_hpa: 0.0,
            short_circuit: false,
        };
        let module = ParsedModuleFields {
            ntc1_c: 26.0,
            ntc2_c: 26.0,
            swelling_pct: 0.0,
            max_dt_dt: 0.0,
            group_voltages_v: [3.3; crate::model::GROUPS_PER_MODULE],
        };
        let modules = std::array::from_fn(|_| module);
        inject_snapshot(&mut sched.transport, &pack, &modules).unwrap();

        tick_n(&mut sched, 1);
        assert_eq!(sched.data_source(), DataSource::External);
        assert!((sched.snapshot.pack_voltage_v - 377.0).abs() < 0.1);
    }

    #[test]
    fn input_timeout_reverts_to_fallback_producer() {
        use crate::wire::decode::{ParsedModuleFields, ParsedPackFields};

        let mut sched = new_scheduler();
        let pack = ParsedPackFields {
            pack_voltage_v: 377.0,
            pack_current_a: 2.0,
            r_internal_mohm: 42.0,
            ambient_c: 24.0,
            coolant_inlet_c: 19.0,
            coolant_outlet_c: 21.0,
            humidity_pct: 35.0,
            isolation_mohm: 4_800.0,
            gas_ratio_1: 1.0,
            gas_ratio_2: 1.0,
            pressure_delta_1_hpa: 0.0,
            pressure_delta_2_hpa: 0.0,
            short_circuit: false,
        };
        let module = ParsedModuleFields {
            ntc1_c: 26.0,
            ntc2_c: 26.0,
            swelling_pct: 0.0,
            max_dt_dt: 0.0,
            group_voltages_v: [3.3; crate::model::GROUPS_PER_MODULE],
        };
        let modules = std::array::from_fn(|_| module);
        inject_snapshot(&mut sched.transport, &pack, &modules).unwrap();
        tick_n(&mut sched, 1);
        assert_eq!(sched.data_source(), DataSource::External);

        for _ in 0..((EXTERNAL_INPUT_TIMEOUT_MS / SCHED_TICK_MS) + 5) {
            sched.clock.advance(SCHED_TICK_MS);
            sched.tick();
        }
        assert_eq!(sched.data_source(), DataSource::Fallback);
        assert_eq!(sched.metrics.input_timeouts, 1);
    }
}
