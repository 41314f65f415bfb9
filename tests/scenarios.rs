//! End-to-end scenarios S1-S12 (spec §8), driven through the public
//! scheduler/evaluator/correlation/wire surface rather than any crate
//! internals.

use battsafe_core::collaborators::{LoopbackTransport, RecordingLogger, RecordingOutputs, SimClock};
use battsafe_core::correlation::CorrelationStateKind;
use battsafe_core::evaluator::{evaluate, recompute_derived};
use battsafe_core::model::{category, AnomalyResult, PackSnapshot, GROUPS_PER_MODULE, NUM_MODULES};
use battsafe_core::scheduler::{Scheduler, SCHED_TICK_MS};
use battsafe_core::thresholds::Thresholds;
use battsafe_core::wire::decode::{
    encode_input_module_frame, encode_input_pack_frame, ParsedModuleFields, ParsedPackFields,
    ReceiverState,
};
use battsafe_core::wire::encode::{decode_pack_frame, encode_pack_frame, validate_frame, OUTPUT_SYNC};

type DemoScheduler = Scheduler<LoopbackTransport, SimClock, RecordingOutputs, RecordingLogger>;

fn new_scheduler() -> DemoScheduler {
    let mut outputs = RecordingOutputs::default();
    outputs.armed = true;
    Scheduler::new(
        LoopbackTransport::new(),
        SimClock::new(),
        outputs,
        RecordingLogger::default(),
    )
}

fn tick_n(sched: &mut DemoScheduler, n: u64) {
    for _ in 0..n {
        sched.clock.advance(SCHED_TICK_MS);
        sched.tick();
    }
}

#[test]
fn s1_nominal_pack_held_for_20_plus_medium_cycles_stays_normal() {
    let mut sched = new_scheduler();
    // 20 medium cycles at the Normal profile (500 ms) = 10_000 ms.
    tick_n(&mut sched, 10_000 / SCHED_TICK_MS);
    assert_eq!(sched.current_state(), CorrelationStateKind::Normal);
    assert_eq!(sched.last_anomaly.active_mask, 0);
    assert!(sched.last_anomaly.risk_factor < 0.1);
    assert_eq!(sched.last_anomaly.cascade_stage, 0);
}

#[test]
fn s2_single_module_thermal_anomaly_is_warning_not_latched() {
    let thresholds = Thresholds::default();
    let mut snap = PackSnapshot::nominal();
    snap.modules[2].ntc1_c = 62.0;
    snap.modules[2].ntc2_c = 58.0;
    snap.ambient_c = 25.0;
    recompute_derived(&mut snap);
    let result = evaluate(&snap, &thresholds);

    assert_eq!(result.active_mask, category::THERMAL);
    assert_eq!(result.active_count, 1);
    assert_eq!(result.hotspot_module, 3);
}

#[test]
fn s3_gas_only_anomaly_uses_worst_case_ratio() {
    let thresholds = Thresholds::default();
    let mut snap = PackSnapshot::nominal();
    snap.gas_ratio_1 = 0.55;
    snap.gas_ratio_2 = 0.60;
    recompute_derived(&mut snap);
    let result = evaluate(&snap, &thresholds);
    assert_eq!(result.active_mask, category::GAS);
}

#[test]
fn s4_two_categories_held_one_cycle_reaches_critical() {
    let thresholds = Thresholds::default();
    let mut snap = PackSnapshot::nominal();
    snap.modules[4].ntc1_c = 60.0;
    snap.gas_ratio_1 = 0.50;
    recompute_derived(&mut snap);
    let result = evaluate(&snap, &thresholds);
    assert_eq!(result.active_count, 2);

    let mut correlation = battsafe_core::correlation::CorrelationState::new(500);
    let state = correlation.update(&result);
    assert_eq!(state, CorrelationStateKind::Critical);
}

#[test]
fn s5_three_categories_is_immediate_latched_emergency() {
    let thresholds = Thresholds::default();
    let mut snap = PackSnapshot::nominal();
    snap.modules[4].ntc1_c = 65.0;
    snap.gas_ratio_1 = 0.35;
    snap.pressure_delta_1_hpa = 8.0;
    recompute_derived(&mut snap);
    let result = evaluate(&snap, &thresholds);
    assert!(result.active_count >= 3);

    let mut correlation = battsafe_core::correlation::CorrelationState::new(500);
    let state = correlation.update(&result);
    assert_eq!(state, CorrelationStateKind::Emergency);
    assert!(correlation.emergency_latched);
}

#[test]
fn s6_fast_loop_short_circuit_path_latches_emergency() {
    let mut sched = new_scheduler();
    sched.snapshot.pack_current_a = 400.0;
    sched.snapshot.short_circuit = true;
    tick_n(&mut sched, 5);
    assert_eq!(sched.current_state(), CorrelationStateKind::Emergency);
    assert!(sched.correlation.emergency_latched);
}

#[test]
fn s7_automatic_recovery_clears_latch_after_sustained_nominal_input() {
    let mut correlation = battsafe_core::correlation::CorrelationState::new(500);
    let mut emergency_result = AnomalyResult::nominal();
    emergency_result.active_count = 3;
    emergency_result.active_mask = category::ELECTRICAL | category::THERMAL | category::GAS;
    correlation.update(&emergency_result);
    assert!(correlation.emergency_latched);

    let nominal = AnomalyResult::nominal();
    for _ in 0..(correlation.emergency_recovery_limit + 1) {
        correlation.update(&nominal);
    }
    assert_eq!(correlation.current_state, CorrelationStateKind::Normal);
    assert!(!correlation.emergency_latched);
}

#[test]
fn s8_ambient_compensation_clears_thermal_after_deescalation() {
    let thresholds = Thresholds::default();
    let mut snap = PackSnapshot::nominal();
    for m in &mut snap.modules {
        m.ntc1_c = 45.0;
        m.ntc2_c = 45.0;
    }
    snap.ambient_c = 25.0;
    recompute_derived(&mut snap);
    let warm_result = evaluate(&snap, &thresholds);
    assert_ne!(warm_result.active_mask & category::THERMAL, 0);

    let mut correlation = battsafe_core::correlation::CorrelationState::new(500);
    let state = correlation.update(&warm_result);
    assert_eq!(state, CorrelationStateKind::Warning);

    snap.ambient_c = 38.0;
    recompute_derived(&mut snap);
    let cool_result = evaluate(&snap, &thresholds);
    assert_eq!(cool_result.active_mask & category::THERMAL, 0);
    assert_eq!(cool_result.active_count, 0);

    let limit = correlation.deescalation_limit;
    let mut state = correlation.current_state;
    for _ in 0..limit {
        state = correlation.update(&cool_result);
    }
    assert_eq!(state, CorrelationStateKind::Normal);
}

#[test]
fn s9_absolute_temperature_emergency_bypass_latches_within_one_cycle() {
    let thresholds = Thresholds::default();
    let mut snap = PackSnapshot::nominal();
    snap.modules[6].ntc1_c = 82.0;
    snap.modules[6].ntc2_c = 82.0;
    recompute_derived(&mut snap);
    let result = evaluate(&snap, &thresholds);
    assert!(result.is_emergency_direct);

    let mut correlation = battsafe_core::correlation::CorrelationState::new(500);
    let state = correlation.update(&result);
    assert_eq!(state, CorrelationStateKind::Emergency);
    assert!(correlation.emergency_latched);
}

#[test]
fn s10_rate_of_rise_emergency_bypass_latches_within_one_cycle() {
    let thresholds = Thresholds::default();
    let mut snap = PackSnapshot::nominal();
    snap.modules[0].max_dt_dt = 6.0;
    recompute_derived(&mut snap);
    let result = evaluate(&snap, &thresholds);
    assert!(result.is_emergency_direct);

    let mut correlation = battsafe_core::correlation::CorrelationState::new(500);
    let state = correlation.update(&result);
    assert_eq!(state, CorrelationStateKind::Emergency);
    assert!(correlation.emergency_latched);
}

#[test]
fn s11_resync_survives_premature_sync_and_a_corrupted_middle_frame() {
    let pack_fields = ParsedPackFields {
        pack_voltage_v: 380.0,
        pack_current_a: 1.0,
        r_internal_mohm: 41.0,
        ambient_c: 25.0,
        coolant_inlet_c: 20.0,
        coolant_outlet_c: 22.0,
        humidity_pct: 40.0,
        isolation_mohm: 5_000.0,
        gas_ratio_1: 1.0,
        gas_ratio_2: 1.0,
        pressure_delta_1_hpa: 0.0,
        pressure_delta_2_hpa: 0.0,
        short_circuit: false,
    };
    let module_fields = ParsedModuleFields {
        ntc1_c: 25.0,
        ntc2_c: 25.0,
        swelling_pct: 0.0,
        max_dt_dt: 0.0,
        group_voltages_v: [3.3; GROUPS_PER_MODULE],
    };

    let mut rx = ReceiverState::new();

    // A premature sync byte ahead of the real pack frame.
    rx.push_byte(0xFF);
    for b in encode_input_pack_frame(&pack_fields) {
        rx.push_byte(b);
    }

    for i in 0..NUM_MODULES {
        let mut frame = encode_input_module_frame(i, &module_fields);
        if i == NUM_MODULES / 2 {
            // Corrupt one byte in the middle of this frame's payload.
            let mid = frame.len() / 2;
            frame[mid] ^= 0xFF;
            for b in frame {
                rx.push_byte(b);
            }
            // The corrupted frame is dropped; feed a good one for this
            // slot afterward so the cycle can still complete.
            for b in encode_input_module_frame(i, &module_fields) {
                rx.push_byte(b);
            }
        } else {
            for b in frame {
                rx.push_byte(b);
            }
        }
    }

    assert!(rx.snapshot_complete());
    let snap = rx.build_snapshot().unwrap();
    assert_eq!(snap.modules.len(), NUM_MODULES);
    assert!((snap.pack_voltage_v - 380.0).abs() < 0.1);
    assert!(rx.checksum_mismatches >= 1);
}

#[test]
fn s12_encoded_snapshot_round_trips_through_the_output_validator() {
    let mut snap = PackSnapshot::nominal();
    snap.pack_voltage_v = 381.4;
    snap.pack_current_a = -12.7;
    recompute_derived(&mut snap);

    let frame = encode_pack_frame(
        12_345,
        &snap,
        CorrelationStateKind::Warning,
        &AnomalyResult::nominal(),
    );
    assert!(validate_frame(&frame, OUTPUT_SYNC).is_ok());

    let decoded = decode_pack_frame(&frame).unwrap();
    assert_eq!(decoded.pack_voltage_dv, (snap.pack_voltage_v * 10.0).round() as u16);
    assert_eq!(decoded.pack_current_da, (snap.pack_current_a * 10.0).round() as i16);
}
