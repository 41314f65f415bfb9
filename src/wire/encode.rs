//! Output telemetry encoder (spec §4.6): fixed-point pack and module
//! frames for the downstream collector. Scaled fields only — the encoder
//! never emits floating point on the wire.
//!
//! Grounded on the teacher's `Transmitter::send_to_actuators` framing
//! style (sync byte, explicit field order, checksum trailer) generalized
//! from a single actuator command to the two frame kinds spec §4.6
//! defines.

use crate::correlation::CorrelationStateKind;
use crate::error::{CoreError, CoreResult};
use crate::model::{AnomalyResult, ModuleData, PackSnapshot, GROUPS_PER_MODULE};
use crate::wire::{round_clamp_i16, round_clamp_u16, round_clamp_u8, xor_checksum};

/// Sync byte opening every frame this module emits.
pub const OUTPUT_SYNC: u8 = 0xAA;
pub const PACK_FRAME_TYPE: u8 = 0x01;
pub const MODULE_FRAME_TYPE: u8 = 0x02;

/// Total frame length, sync through checksum inclusive.
pub const PACK_FRAME_LEN: usize = 38;
pub const MODULE_FRAME_LEN: usize = 17;

/// Encodes one pack-level telemetry frame.
///
/// `timestamp_ms` is the scheduler's free-running virtual clock, truncated
/// to 32 bits (wraps after ~49.7 days, which is the fast-loop tick budget's
/// problem, not this encoder's).
#[allow(clippy::too_many_arguments)]
pub fn encode_pack_frame(
    timestamp_ms: u64,
    snapshot: &PackSnapshot,
    state: CorrelationStateKind,
    anomaly: &AnomalyResult,
) -> Vec<u8> {
    let mut payload = Vec::with_capacity(PACK_FRAME_LEN - 3);
    payload.extend_from_slice(&(timestamp_ms as u32).to_le_bytes());
    payload.extend_from_slice(&round_clamp_u16(snapshot.pack_voltage_v * 10.0).to_le_bytes());
    payload.extend_from_slice(&round_clamp_i16(snapshot.pack_current_a * 10.0).to_le_bytes());
    payload.extend_from_slice(&round_clamp_u16(snapshot.r_internal_mohm * 100.0).to_le_bytes());
    payload.extend_from_slice(&round_clamp_i16(snapshot.hotspot_temp_c * 10.0).to_le_bytes());
    payload.extend_from_slice(&round_clamp_i16(snapshot.ambient_c * 10.0).to_le_bytes());
    payload.extend_from_slice(&round_clamp_i16(snapshot.t_core_est_c * 10.0).to_le_bytes());
    payload.push(round_clamp_u8(snapshot.dt_dt_max * 100.0));
    payload.push(round_clamp_u8(snapshot.gas_ratio_1 * 100.0));
    payload.push(round_clamp_u8(snapshot.gas_ratio_2 * 100.0));
    payload
        .extend_from_slice(&round_clamp_i16(snapshot.pressure_delta_1_hpa * 100.0).to_le_bytes());
    payload
        .extend_from_slice(&round_clamp_i16(snapshot.pressure_delta_2_hpa * 100.0).to_le_bytes());
    payload.extend_from_slice(&round_clamp_u16(snapshot.v_spread_mv * 10.0).to_le_bytes());
    payload.push(round_clamp_u8(snapshot.temp_spread_c * 10.0));
    payload.push(state.as_u8());
    payload.push(anomaly.active_mask);
    payload.push(anomaly.active_count as u8);
    payload.push((anomaly.anomaly_modules_mask & 0xFF) as u8);
    payload.push(anomaly.hotspot_module as u8);
    payload.push(round_clamp_u8(anomaly.risk_factor * 100.0));
    payload.push(anomaly.cascade_stage);
    payload.push(if anomaly.is_emergency_direct { 0x01 } else { 0x00 });

    finish_frame(OUTPUT_SYNC, PACK_FRAME_TYPE, payload)
}

/// Encodes one module-level telemetry frame for `module_index`.
pub fn encode_module_frame(module_index: usize, module: &ModuleData) -> Vec<u8> {
    let mut payload = Vec::with_capacity(MODULE_FRAME_LEN - 3);
    payload.push(module_index as u8);
    payload.extend_from_slice(&round_clamp_i16(module.ntc1_c * 10.0).to_le_bytes());
    payload.extend_from_slice(&round_clamp_i16(module.ntc2_c * 10.0).to_le_bytes());
    payload.push(round_clamp_u8(module.swelling_pct));
    payload.push(round_clamp_u8(module.delta_t_intra * 10.0));
    payload.push(round_clamp_u8(module.max_dt_dt * 100.0));
    payload.extend_from_slice(&round_clamp_u16(module.module_voltage * 10.0).to_le_bytes());
    payload.extend_from_slice(&round_clamp_u16(module.v_spread_mv).to_le_bytes());
    payload.push(0x00); // reserved

    finish_frame(OUTPUT_SYNC, MODULE_FRAME_TYPE, payload)
}

fn finish_frame(sync: u8, frame_type: u8, payload: Vec<u8>) -> Vec<u8> {
    let len = payload.len() + 4; // sync + len + type + payload + checksum
    let mut frame = Vec::with_capacity(len);
    frame.push(sync);
    frame.push(len as u8);
    frame.push(frame_type);
    frame.extend_from_slice(&payload);
    let checksum = xor_checksum(&frame);
    frame.push(checksum);
    frame
}

/// Validates frame shape and checksum without decoding fields: the
/// self-check's functional probe (spec §4.4) runs this against a freshly
/// encoded nominal frame.
pub fn validate_frame(frame: &[u8], expected_sync: u8) -> CoreResult<()> {
    if frame.len() < 4 {
        return Err(CoreError::FrameTooShort {
            have: frame.len(),
            need: 4,
        });
    }
    if frame[0] != expected_sync {
        return Err(CoreError::SyncMismatch {
            expected: expected_sync,
            found: frame[0],
        });
    }
    let declared = frame[1] as usize;
    if declared != frame.len() {
        return Err(CoreError::FrameSizeMismatch {
            declared,
            expected: frame.len(),
        });
    }
    let computed = xor_checksum(&frame[..declared - 1]);
    let found = frame[declared - 1];
    if computed != found {
        return Err(CoreError::ChecksumMismatch { computed, found });
    }
    Ok(())
}

/// Scaled fields decoded back out of a pack frame, for round-trip testing
/// (spec S12, P4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedPackFrame {
    pub timestamp_ms: u32,
    pub pack_voltage_dv: u16,
    pub pack_current_da: i16,
    pub r_internal_cmohm: u16,
    pub hotspot_temp_dt: i16,
    pub ambient_dt: i16,
    pub core_temp_est_dt: i16,
    pub dt_dt_max_cdpm: u8,
    pub gas_ratio_1_cp: u8,
    pub gas_ratio_2_cp: u8,
    pub pressure_delta_1_chpa: i16,
    pub pressure_delta_2_chpa: i16,
    pub v_spread_dmv: u16,
    pub temp_spread_dt: u8,
    pub system_state: u8,
    pub anomaly_mask: u8,
    pub anomaly_count: u8,
    pub anomaly_modules_mask: u8,
    pub hotspot_module: u8,
    pub risk_factor_pct: u8,
    pub cascade_stage: u8,
    /// Bit 0 of the `flags` byte.
    pub is_emergency_direct: bool,
}

/// Decodes a pack frame previously produced by [`encode_pack_frame`].
pub fn decode_pack_frame(frame: &[u8]) -> CoreResult<DecodedPackFrame> {
    validate_frame(frame, OUTPUT_SYNC)?;
    if frame[2] != PACK_FRAME_TYPE {
        return Err(CoreError::UnknownFrameType(frame[2]));
    }
    let p = &frame[3..];
    Ok(DecodedPackFrame {
        timestamp_ms: u32::from_le_bytes(p[0..4].try_into().unwrap()),
        pack_voltage_dv: u16::from_le_bytes(p[4..6].try_into().unwrap()),
        pack_current_da: i16::from_le_bytes(p[6..8].try_into().unwrap()),
        r_internal_cmohm: u16::from_le_bytes(p[8..10].try_into().unwrap()),
        hotspot_temp_dt: i16::from_le_bytes(p[10..12].try_into().unwrap()),
        ambient_dt: i16::from_le_bytes(p[12..14].try_into().unwrap()),
        core_temp_est_dt: i16::from_le_bytes(p[14..16].try_into().unwrap()),
        dt_dt_max_cdpm: p[16],
        gas_ratio_1_cp: p[17],
        gas_ratio_2_cp: p[18],
        pressure_delta_1_chpa: i16::from_le_bytes(p[19..21].try_into().unwrap()),
        pressure_delta_2_chpa: i16::from_le_bytes(p[21..23].try_into().unwrap()),
        v_spread_dmv: u16::from_le_bytes(p[23..25].try_into().unwrap()),
        temp_spread_dt: p[25],
        system_state: p[26],
        anomaly_mask: p[27],
        anomaly_count: p[28],
        anomaly_modules_mask: p[29],
        hotspot_module: p[30],
        risk_factor_pct: p[31],
        cascade_stage: p[32],
        is_emergency_direct: p[33] & 0x01 != 0,
    })
}

/// Scaled fields decoded back out of a module frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedModuleFrame {
    pub module_index: u8,
    pub ntc1_dt: i16,
    pub ntc2_dt: i16,
    pub swelling_pct: u8,
    pub delta_t_intra_dt: u8,
    pub max_dt_dt_cdpm: u8,
    pub module_voltage_dv: u16,
    pub v_spread_mv: u16,
}

/// Decodes a module frame previously produced by [`encode_module_frame`].
pub fn decode_module_frame(frame: &[u8]) -> CoreResult<DecodedModuleFrame> {
    validate_frame(frame, OUTPUT_SYNC)?;
    if frame[2] != MODULE_FRAME_TYPE {
        return Err(CoreError::UnknownFrameType(frame[2]));
    }
    let p = &frame[3..];
    Ok(DecodedModuleFrame {
        module_index: p[0],
        ntc1_dt: i16::from_le_bytes(p[1..3].try_into().unwrap()),
        ntc2_dt: i16::from_le_bytes(p[3..5].try_into().unwrap()),
        swelling_pct: p[5],
        delta_t_intra_dt: p[6],
        max_dt_dt_cdpm: p[7],
        module_voltage_dv: u16::from_le_bytes(p[8..10].try_into().unwrap()),
        v_spread_mv: u16::from_le_bytes(p[10..12].try_into().unwrap()),
    })
}
