//! Anomaly evaluator thresholds (spec §4.2): a constructible configuration
//! value, seeded with the documented defaults, with the ordering invariant
//! the self-check requires (spec §4.4) implemented once here.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Threshold configuration for the anomaly evaluator. Every field has a
/// single, documented physical meaning (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Per-pack/prototype under-voltage, volts.
    pub voltage_low_v: f64,
    /// Sustained overcurrent, amps.
    pub current_warning_a: f64,
    /// Definite short-circuit signature, amps.
    pub current_short_a: f64,
    /// Direct-emergency current spike, amps.
    pub current_emergency_a: f64,
    /// Degraded internal resistance, milliohms.
    pub r_int_warning_mohm: f64,
    /// Absolute cell temperature warning, °C.
    pub temp_warning_c: f64,
    /// Severity marker, °C (not itself a direct-emergency trigger).
    pub temp_critical_c: f64,
    /// Direct-emergency absolute temperature, °C.
    pub temp_emergency_c: f64,
    /// Rate-of-rise warning, °C/min.
    pub dt_dt_warning_c_per_min: f64,
    /// Direct-emergency rate-of-rise, °C/min.
    pub dt_dt_emergency_c_per_min: f64,
    /// Ambient-compensated warning delta, °C.
    pub delta_t_ambient_warning: f64,
    /// Gas anomaly ratio (lower is worse).
    pub gas_warning_ratio: f64,
    /// Severity marker ratio (lower is worse).
    pub gas_critical_ratio: f64,
    /// Enclosure pressure rise warning, hPa.
    pub pressure_warning_hpa: f64,
    /// Severity marker, hPa.
    pub pressure_critical_hpa: f64,
    /// Mechanical deformation warning, percent.
    pub swelling_warning_pct: f64,

    // Full-pack-only checks (spec §4.2 "In the full-pack variant...").
    /// Absolute pack voltage band, volts: (low, high).
    pub pack_voltage_band_v: (f64, f64),
    /// Tight group-voltage spread limit, millivolts.
    pub group_v_spread_limit_mv: f64,
    /// Tight per-group deviation-from-mean limit, millivolts.
    pub group_deviation_limit_mv: f64,
    /// Inter-module temperature spread limit, °C.
    pub module_temp_spread_limit_c: f64,
    /// Intra-module |ntc1 - ntc2| limit, °C.
    pub module_delta_t_intra_limit_c: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            voltage_low_v: 12.0,
            current_warning_a: 8.0,
            current_short_a: 15.0,
            current_emergency_a: 20.0,
            r_int_warning_mohm: 100.0,
            temp_warning_c: 55.0,
            temp_critical_c: 70.0,
            temp_emergency_c: 80.0,
            dt_dt_warning_c_per_min: 2.0,
            dt_dt_emergency_c_per_min: 5.0,
            delta_t_ambient_warning: 20.0,
            gas_warning_ratio: 0.70,
            gas_critical_ratio: 0.40,
            pressure_warning_hpa: 5.0,
            pressure_critical_hpa: 15.0,
            swelling_warning_pct: 30.0,

            pack_voltage_band_v: (280.0, 420.0),
            group_v_spread_limit_mv: 150.0,
            group_deviation_limit_mv: 80.0,
            module_temp_spread_limit_c: 15.0,
            module_delta_t_intra_limit_c: 8.0,
        }
    }
}

impl Thresholds {
    /// Parses an override set from JSON, falling back to documented
    /// defaults for any field the source leaves unspecified is not
    /// supported by `serde_json` field-by-field merge; callers that want
    /// partial overrides should deserialize into a sparse struct
    /// themselves. This helper is for loading a complete, explicit config.
    pub fn from_json(s: &str) -> CoreResult<Self> {
        serde_json::from_str(s).map_err(CoreError::from)
    }

    /// Validates the threshold-ordering invariant required before the
    /// relay connect path may be armed (spec §4.4).
    pub fn validate_ordering(&self) -> CoreResult<()> {
        if !(self.temp_warning_c < self.temp_critical_c) {
            return Err(CoreError::ThresholdOrdering(
                "temp_warning_c must be < temp_critical_c",
            ));
        }
        if !(self.gas_warning_ratio > self.gas_critical_ratio) {
            return Err(CoreError::ThresholdOrdering(
                "gas_warning_ratio must be > gas_critical_ratio",
            ));
        }
        if !(self.pressure_warning_hpa < self.pressure_critical_hpa) {
            return Err(CoreError::ThresholdOrdering(
                "pressure_warning_hpa must be < pressure_critical_hpa",
            ));
        }
        if !(self.current_warning_a < self.current_short_a) {
            return Err(CoreError::ThresholdOrdering(
                "current_warning_a must be < current_short_a",
            ));
        }
        Ok(())
    }
}
