//! Shared data model: snapshot, module data, and the anomaly result the
//! evaluator produces from them (spec §3).
//!
//! The scheduler is the sole owner of a `PackSnapshot`; every other
//! component (evaluator, correlation machine, wire codecs) takes it by
//! shared or exclusive reference for the one call that needs it, per the
//! ownership rule in spec §3 and the "remove process-wide mutable state"
//! redesign flag in spec §9.

use serde::{Deserialize, Serialize};

/// Number of modules in the pack (full-pack variant: 8 modules).
pub const NUM_MODULES: usize = 8;
/// Series groups within one module (full-pack variant: 13 groups/module,
/// 8 * 13 = 104 groups in series).
pub const GROUPS_PER_MODULE: usize = 13;
/// Cells in parallel per group (8-parallel pack).
pub const PARALLEL: f64 = 8.0;
/// Thermal resistance calibration constant for cylindrical cells, °C/W.
pub const R_THERMAL_CW: f64 = 3.0;

/// Bit layout of [`AnomalyResult::active_mask`] (spec §3, §4.2).
pub mod category {
    pub const ELECTRICAL: u8 = 0b0000_0001;
    pub const THERMAL: u8 = 0b0000_0010;
    pub const GAS: u8 = 0b0000_0100;
    pub const PRESSURE: u8 = 0b0000_1000;
    pub const SWELLING: u8 = 0b0001_0000;
}

/// One module's raw and derived sensor data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleData {
    pub ntc1_c: f64,
    pub ntc2_c: f64,
    pub swelling_pct: f64,
    /// °C/min, already a rate (see SPEC_FULL.md §4 for the unit decision).
    pub max_dt_dt: f64,
    pub group_voltages_v: [f64; GROUPS_PER_MODULE],

    // Derived fields, recomputed by `recompute_derived` whenever raw
    // fields change.
    pub delta_t_intra: f64,
    pub module_voltage: f64,
    pub v_spread_mv: f64,
}

impl ModuleData {
    /// A module at rest: nominal temperature, full cell voltage, no swelling.
    pub fn nominal() -> Self {
        let mut m = Self {
            ntc1_c: 25.0,
            ntc2_c: 25.0,
            swelling_pct: 0.0,
            max_dt_dt: 0.0,
            group_voltages_v: [3.3; GROUPS_PER_MODULE],
            delta_t_intra: 0.0,
            module_voltage: 0.0,
            v_spread_mv: 0.0,
        };
        m.recompute_derived();
        m
    }

    /// Recomputes `delta_t_intra`, `module_voltage` and `v_spread_mv` from
    /// the raw fields. Must run before the pack-wide pre-pass whenever a
    /// module's raw fields change (spec §3 invariant).
    pub fn recompute_derived(&mut self) {
        self.delta_t_intra = (self.ntc1_c - self.ntc2_c).abs();
        self.module_voltage = self.group_voltages_v.iter().sum();

        let min = self
            .group_voltages_v
            .iter()
            .cloned()
            .fold(f64::INFINITY, f64::min);
        let max = self
            .group_voltages_v
            .iter()
            .cloned()
            .fold(f64::NEG_INFINITY, f64::max);
        self.v_spread_mv = (max - min) * 1000.0;
    }

    /// Higher of the two surface NTC readings (used for hotspot selection).
    pub fn surface_temp_c(&self) -> f64 {
        self.ntc1_c.max(self.ntc2_c)
    }
}

/// Full pack snapshot: electrical, environmental, gas/pressure fields and
/// the per-module sequence, plus pack-wide derived fields filled by the
/// evaluator's pre-pass (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackSnapshot {
    pub pack_voltage_v: f64,
    pub pack_current_a: f64,
    pub r_internal_mohm: f64,
    pub dr_dt_mohm_per_s: f64,

    pub ambient_c: f64,
    pub coolant_inlet_c: f64,
    pub coolant_outlet_c: f64,
    pub humidity_pct: f64,
    pub isolation_mohm: f64,

    pub gas_ratio_1: f64,
    pub gas_ratio_2: f64,
    pub pressure_delta_1_hpa: f64,
    pub pressure_delta_2_hpa: f64,

    pub modules: Vec<ModuleData>,

    // Derived fields, filled by the evaluator's pre-pass.
    pub hotspot_temp_c: f64,
    pub temp_spread_c: f64,
    pub v_spread_mv: f64,
    pub t_core_est_c: f64,
    pub dt_dt_max: f64,

    /// Transient flag, set by the fast loop from current magnitude or an
    /// external signal, cleared at the start of each evaluation cycle.
    pub short_circuit: bool,
}

impl PackSnapshot {
    /// A nominal, internally consistent snapshot with `NUM_MODULES` modules
    /// at rest. Used by the self-check's functional probe and as a test
    /// fixture baseline.
    pub fn nominal() -> Self {
        let mut snap = Self {
            pack_voltage_v: 380.0,
            pack_current_a: 0.0,
            r_internal_mohm: 40.0,
            dr_dt_mohm_per_s: 0.0,
            ambient_c: 25.0,
            coolant_inlet_c: 20.0,
            coolant_outlet_c: 22.0,
            humidity_pct: 40.0,
            isolation_mohm: 5_000.0,
            gas_ratio_1: 1.0,
            gas_ratio_2: 1.0,
            pressure_delta_1_hpa: 0.0,
            pressure_delta_2_hpa: 0.0,
            modules: (0..NUM_MODULES).map(|_| ModuleData::nominal()).collect(),
            hotspot_temp_c: 0.0,
            temp_spread_c: 0.0,
            v_spread_mv: 0.0,
            t_core_est_c: 0.0,
            dt_dt_max: 0.0,
            short_circuit: false,
        };
        for m in &mut snap.modules {
            m.recompute_derived();
        }
        snap
    }

    /// Average per-cell current, used by the core-temperature estimate.
    pub fn cell_current_a(&self) -> f64 {
        self.pack_current_a / PARALLEL
    }
}

/// Result of one anomaly-evaluation pass (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnomalyResult {
    pub active_mask: u8,
    pub active_count: u32,
    pub is_short_circuit: bool,
    pub is_emergency_direct: bool,
    /// 1-based module index, or 0 if no module exceeds ambient by epsilon.
    pub hotspot_module: usize,
    pub anomaly_modules_mask: u32,
    pub risk_factor: f64,
    pub cascade_stage: u8,
}

impl AnomalyResult {
    /// A result representing no anomaly whatsoever.
    pub fn nominal() -> Self {
        Self {
            active_mask: 0,
            active_count: 0,
            is_short_circuit: false,
            is_emergency_direct: false,
            hotspot_module: 0,
            anomaly_modules_mask: 0,
            risk_factor: 0.0,
            cascade_stage: 0,
        }
    }
}

/// Previous-cycle values used to compute first-difference derivatives
/// across one medium-loop period (spec §3).
#[derive(Debug, Clone, Default)]
pub struct DerivativeHistory {
    pub prev_r_internal_mohm: Option<f64>,
    pub prev_module_ntc: Vec<(f64, f64)>,
}

impl DerivativeHistory {
    pub fn new() -> Self {
        Self {
            prev_r_internal_mohm: None,
            prev_module_ntc: vec![(f64::NAN, f64::NAN); NUM_MODULES],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nominal_snapshot_is_internally_consistent() {
        let snap = PackSnapshot::nominal();
        assert_eq!(snap.modules.len(), NUM_MODULES);
        for m in &snap.modules {
            assert_eq!(m.delta_t_intra, 0.0);
            assert_eq!(m.module_voltage, 3.3 * GROUPS_PER_MODULE as f64);
            assert_eq!(m.v_spread_mv, 0.0);
        }
    }

    #[test]
    fn recompute_derived_tracks_raw_field_changes() {
        let mut m = ModuleData::nominal();
        m.ntc1_c = 40.0;
        m.ntc2_c = 30.0;
        m.group_voltages_v[0] = 3.0;
        m.recompute_derived();
        assert_eq!(m.delta_t_intra, 10.0);
        assert!((m.v_spread_mv - 300.0).abs() < 1e-9);
    }

    #[test]
    fn anomaly_result_nominal_has_no_bits_set() {
        let r = AnomalyResult::nominal();
        assert_eq!(r.active_mask, 0);
        assert_eq!(r.active_count, 0);
        assert_eq!(r.hotspot_module, 0);
    }
}
