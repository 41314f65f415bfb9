//! # Loopback demo
//!
//! Drives the safety core against an in-process [`LoopbackTransport`]
//! instead of a real UART/CoAP/etc. link, the host-side analogue of the
//! teacher project being its own digital twin for its simulated sensors.
//!
//! Feeds one injected snapshot with a thermal anomaly, then ticks the
//! scheduler until a slow-loop telemetry burst goes out, and prints the
//! resulting correlation state and outbound byte count.
//!
//! ## Usage
//! `cargo run --bin loopback_demo`

use battsafe_core::collaborators::{LoopbackTransport, RecordingLogger, RecordingOutputs, SimClock};
use battsafe_core::model::GROUPS_PER_MODULE;
use battsafe_core::scheduler::{inject_snapshot, Scheduler, SCHED_TICK_MS};
use battsafe_core::wire::decode::{ParsedModuleFields, ParsedPackFields};

fn main() {
    env_logger::init();

    let mut outputs = RecordingOutputs::default();
    outputs.armed = true;
    let mut sched = Scheduler::new(
        LoopbackTransport::new(),
        SimClock::new(),
        outputs,
        RecordingLogger::default(),
    );

    if !sched.relay_arm.is_armed() {
        log::error!("self-check failed at boot; relay will not arm");
    }

    let pack = ParsedPackFields {
        pack_voltage_v: 379.5,
        pack_current_a: 1.8,
        r_internal_mohm: 41.0,
        ambient_c: 25.0,
        coolant_inlet_c: 20.0,
        coolant_outlet_c: 22.0,
        humidity_pct: 38.0,
        isolation_mohm: 5_100.0,
        gas_ratio_1: 1.0,
        gas_ratio_2: 1.0,
        pressure_delta_1_hpa: 0.0,
        pressure_delta_2_hpa: 0.0,
        short_circuit: false,
    };
    let mut nominal_module = ParsedModuleFields {
        ntc1_c: 25.0,
        ntc2_c: 25.0,
        swelling_pct: 0.0,
        max_dt_dt: 0.0,
        group_voltages_v: [3.3; GROUPS_PER_MODULE],
    };
    let mut modules = [nominal_module; battsafe_core::model::NUM_MODULES];
    nominal_module.ntc1_c = 62.0;
    nominal_module.ntc2_c = 58.0;
    modules[2] = nominal_module;

    inject_snapshot(&mut sched.transport, &pack, &modules).expect("loopback inject never fails");

    for _ in 0..600 {
        sched.clock.advance(SCHED_TICK_MS);
        sched.tick();
    }

    println!("correlation state: {:?}", sched.current_state());
    println!("data source: {:?}", sched.data_source());
    println!("telemetry bytes emitted: {}", sched.transport.outbound.len());
    println!(
        "ticks={} fast={} medium={} slow={}",
        sched.metrics.ticks,
        sched.metrics.fast_loop_runs,
        sched.metrics.medium_loop_runs,
        sched.metrics.slow_loop_runs
    );

    sched.try_relay_connect();
    println!("relay connected: {}", sched.outputs.relay_connected);
}
