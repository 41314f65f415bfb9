//! Anomaly evaluator (spec §4.2): derived-metric pre-pass, independent
//! category rules, hotspot/cascade/risk derivation and the emergency-direct
//! bypass.
//!
//! Grounded on the teacher's `Processor::process_data` (moving-average
//! filter + statistical anomaly check over a `self.anomaly_threshold`):
//! the same shape — a pure function from raw readings to a small derived
//! result, called once per cycle before anything downstream reacts — is
//! kept here, generalized from "one sensor, one threshold" to "five
//! independent categories over a whole pack".

use crate::model::{category, AnomalyResult, PackSnapshot, R_THERMAL_CW};
use crate::thresholds::Thresholds;

/// Surface-temperature-over-ambient margin below which a module is not
/// considered a hotspot at all (spec §4.2 hotspot selection).
const HOTSPOT_EPSILON_C: f64 = 0.5;

/// Runs the derived-metric pre-pass (spec §4.2): must be called whenever
/// raw snapshot fields change and before [`evaluate`] runs.
pub fn recompute_derived(snapshot: &mut PackSnapshot) {
    for m in &mut snapshot.modules {
        m.recompute_derived();
    }

    let mut hotspot = f64::NEG_INFINITY;
    let mut lowest = f64::INFINITY;
    for m in &snapshot.modules {
        let t = m.surface_temp_c();
        hotspot = hotspot.max(t);
        lowest = lowest.min(t);
    }
    if snapshot.modules.is_empty() {
        hotspot = 0.0;
        lowest = 0.0;
    }
    snapshot.hotspot_temp_c = hotspot;
    snapshot.temp_spread_c = hotspot - lowest;

    let mut v_min = f64::INFINITY;
    let mut v_max = f64::NEG_INFINITY;
    for m in &snapshot.modules {
        for &v in &m.group_voltages_v {
            v_min = v_min.min(v);
            v_max = v_max.max(v);
        }
    }
    snapshot.v_spread_mv = if snapshot.modules.is_empty() {
        0.0
    } else {
        (v_max - v_min) * 1000.0
    };

    snapshot.dt_dt_max = snapshot
        .modules
        .iter()
        .map(|m| m.max_dt_dt)
        .fold(0.0_f64, f64::max);

    let i_cell = snapshot.cell_current_a();
    let r_int_ohm = snapshot.r_internal_mohm / 1000.0;
    snapshot.t_core_est_c = snapshot.hotspot_temp_c + i_cell * i_cell * r_int_ohm * R_THERMAL_CW;
}

/// Thermal-cascade stage (spec §4.2 cascade table), derived from
/// `t_core_est_c`.
pub fn cascade_stage(t_core_est_c: f64) -> u8 {
    match t_core_est_c {
        t if t <= 60.0 => 0,
        t if t <= 100.0 => 1,
        t if t <= 140.0 => 2,
        t if t <= 180.0 => 3,
        t if t <= 250.0 => 4,
        t if t <= 350.0 => 5,
        _ => 6,
    }
}

/// Human-readable label for a cascade stage, for logging.
pub fn cascade_label(stage: u8) -> &'static str {
    match stage {
        0 => "Normal",
        1 => "Elevated",
        2 => "SEI decomposition",
        3 => "Separator collapse",
        4 => "Electrolyte decomposition",
        5 => "Cathode decomposition",
        _ => "Full runaway",
    }
}

/// Evaluates a (pre-pass-complete) snapshot into an [`AnomalyResult`].
/// Caller must have run [`recompute_derived`] first if any raw field
/// changed since the last call.
pub fn evaluate(snapshot: &PackSnapshot, thresholds: &Thresholds) -> AnomalyResult {
    let mut mask: u8 = 0;
    let mut is_short_circuit = false;
    let mut is_emergency_direct = false;
    let mut anomaly_modules_mask: u32 = 0;

    // ELECTRICAL
    let abs_current = snapshot.pack_current_a.abs();
    let mut electrical = snapshot.pack_voltage_v < thresholds.voltage_low_v
        || abs_current > thresholds.current_warning_a
        || snapshot.r_internal_mohm > thresholds.r_int_warning_mohm;

    if snapshot.short_circuit || abs_current > thresholds.current_short_a {
        electrical = true;
        is_short_circuit = true;
    }
    if abs_current > thresholds.current_emergency_a {
        electrical = true;
        is_emergency_direct = true;
    }

    let (band_lo, band_hi) = thresholds.pack_voltage_band_v;
    if snapshot.pack_voltage_v < band_lo || snapshot.pack_voltage_v > band_hi {
        electrical = true;
    }
    if snapshot.v_spread_mv > thresholds.group_v_spread_limit_mv {
        electrical = true;
    }
    if max_group_deviation_mv(snapshot) > thresholds.group_deviation_limit_mv {
        electrical = true;
    }

    if electrical {
        mask |= category::ELECTRICAL;
    }

    // THERMAL
    let any_surface_warning = snapshot
        .modules
        .iter()
        .any(|m| m.surface_temp_c() > thresholds.temp_warning_c);
    let ambient_delta = snapshot.hotspot_temp_c - snapshot.ambient_c;
    let mut thermal = any_surface_warning
        || ambient_delta >= thresholds.delta_t_ambient_warning
        || snapshot.dt_dt_max > thresholds.dt_dt_warning_c_per_min;

    if snapshot.temp_spread_c > thresholds.module_temp_spread_limit_c {
        thermal = true;
    }
    let any_intra_over = snapshot
        .modules
        .iter()
        .any(|m| m.delta_t_intra > thresholds.module_delta_t_intra_limit_c);
    if any_intra_over {
        thermal = true;
    }

    let any_surface_emergency = snapshot
        .modules
        .iter()
        .any(|m| m.surface_temp_c() > thresholds.temp_emergency_c);
    if any_surface_emergency || snapshot.dt_dt_max > thresholds.dt_dt_emergency_c_per_min {
        thermal = true;
        is_emergency_direct = true;
    }

    if thermal {
        mask |= category::THERMAL;
    }

    // GAS: worst case is the lower ratio.
    let worst_gas = snapshot.gas_ratio_1.min(snapshot.gas_ratio_2);
    if worst_gas < thresholds.gas_warning_ratio {
        mask |= category::GAS;
    }

    // PRESSURE: worst case is the higher delta.
    let worst_pressure = snapshot.pressure_delta_1_hpa.max(snapshot.pressure_delta_2_hpa);
    if worst_pressure > thresholds.pressure_warning_hpa {
        mask |= category::PRESSURE;
    }

    // SWELLING
    let any_swelling = snapshot
        .modules
        .iter()
        .any(|m| m.swelling_pct > thresholds.swelling_warning_pct);
    if any_swelling {
        mask |= category::SWELLING;
    }

    // Per-module anomaly bitmask: THERMAL, SWELLING or intra-ΔT contribution.
    for (i, m) in snapshot.modules.iter().enumerate() {
        let contributed = m.surface_temp_c() > thresholds.temp_warning_c
            || m.surface_temp_c() > thresholds.temp_emergency_c
            || m.swelling_pct > thresholds.swelling_warning_pct
            || m.delta_t_intra > thresholds.module_delta_t_intra_limit_c;
        if contributed {
            anomaly_modules_mask |= 1 << i;
        }
    }

    let hotspot_module = select_hotspot_module(snapshot);
    let t_core = snapshot.t_core_est_c;

    AnomalyResult {
        active_mask: mask,
        active_count: mask.count_ones(),
        is_short_circuit,
        is_emergency_direct,
        hotspot_module,
        anomaly_modules_mask,
        risk_factor: risk_factor(snapshot, thresholds),
        cascade_stage: cascade_stage(t_core),
    }
}

/// 1-based index of the hottest module, tie-broken toward the lower
/// index, or 0 if no module clears `ambient + HOTSPOT_EPSILON_C`.
fn select_hotspot_module(snapshot: &PackSnapshot) -> usize {
    let mut best_idx = None;
    let mut best_temp = f64::NEG_INFINITY;
    for (i, m) in snapshot.modules.iter().enumerate() {
        let t = m.surface_temp_c();
        if t > best_temp {
            best_temp = t;
            best_idx = Some(i);
        }
    }
    match best_idx {
        Some(i) if best_temp > snapshot.ambient_c + HOTSPOT_EPSILON_C => i + 1,
        _ => 0,
    }
}

/// Largest |group_voltage - module_mean| across every module, in mV.
fn max_group_deviation_mv(snapshot: &PackSnapshot) -> f64 {
    let mut worst = 0.0_f64;
    for m in &snapshot.modules {
        let mean = m.module_voltage / m.group_voltages_v.len() as f64;
        for &v in &m.group_voltages_v {
            worst = worst.max((v - mean).abs() * 1000.0);
        }
    }
    worst
}

/// Bounded affine combination of normalized danger components (spec
/// §4.2). Weights sum to 1 and the result is clamped to `[0, 1]`.
fn risk_factor(snapshot: &PackSnapshot, thresholds: &Thresholds) -> f64 {
    const W_TEMP: f64 = 0.35;
    const W_DTDT: f64 = 0.25;
    const W_GAS: f64 = 0.20;
    const W_PRESSURE: f64 = 0.10;
    const W_SWELLING: f64 = 0.10;

    let temp_component = normalize(
        snapshot.hotspot_temp_c,
        thresholds.temp_warning_c,
        thresholds.temp_emergency_c,
    );
    let dtdt_component = (snapshot.dt_dt_max / thresholds.dt_dt_emergency_c_per_min).clamp(0.0, 1.0);

    let worst_gas = snapshot.gas_ratio_1.min(snapshot.gas_ratio_2);
    let gas_component = normalize_inverted(
        worst_gas,
        thresholds.gas_warning_ratio,
        thresholds.gas_critical_ratio,
    );

    let worst_pressure = snapshot.pressure_delta_1_hpa.max(snapshot.pressure_delta_2_hpa);
    let pressure_component = normalize(
        worst_pressure,
        thresholds.pressure_warning_hpa,
        thresholds.pressure_critical_hpa,
    );

    let max_swelling = snapshot
        .modules
        .iter()
        .map(|m| m.swelling_pct)
        .fold(0.0_f64, f64::max);
    let swelling_component = (max_swelling / (2.0 * thresholds.swelling_warning_pct)).clamp(0.0, 1.0);

    let risk = W_TEMP * temp_component
        + W_DTDT * dtdt_component
        + W_GAS * gas_component
        + W_PRESSURE * pressure_component
        + W_SWELLING * swelling_component;

    risk.clamp(0.0, 1.0)
}

/// Maps `value` linearly from `warning..=critical` onto `0.0..=1.0`,
/// clamped, for "higher is worse" quantities.
fn normalize(value: f64, warning: f64, critical: f64) -> f64 {
    if critical <= warning {
        return 0.0;
    }
    ((value - warning) / (critical - warning)).clamp(0.0, 1.0)
}

/// Maps `value` linearly from `warning..=critical` onto `0.0..=1.0`,
/// clamped, for "lower is worse" quantities (gas ratios).
fn normalize_inverted(value: f64, warning: f64, critical: f64) -> f64 {
    if warning <= critical {
        return 0.0;
    }
    ((warning - value) / (warning - critical)).clamp(0.0, 1.0)
}
