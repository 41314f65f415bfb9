//! Input receiver and resync state machine (spec §4.5): reassembles a
//! `PackSnapshot` from one pack frame and `NUM_MODULES` module frames
//! arriving byte-at-a-time on a possibly noisy channel.
//!
//! Grounded on the teacher's `component_b::receiver::Receiving` hand-off
//! pattern, generalized from "one complete message per read" to an
//! explicit byte-by-byte state machine, since spec §4.5 requires recovery
//! from a corrupted byte stream rather than assuming framed reads.
//!
//! Input frames carry the raw sensor truth a producer (in this workspace,
//! the loopback demo's fixture producer) would have available — not the
//! derived/scaled telemetry fields the output encoder emits. This is an
//! explicit resolution of an otherwise-silent spec point: the input wire
//! format is its own fixed-point layout, scaled the same way as the
//! output encoder for consistency, but carrying different fields (see
//! SPEC_FULL.md).

use std::collections::VecDeque;

use crate::model::{ModuleData, PackSnapshot, GROUPS_PER_MODULE, NUM_MODULES};
use crate::wire::{round_clamp_i16, round_clamp_u16, round_clamp_u8, xor_checksum};

pub const INPUT_SYNC: u8 = 0xBB;
pub const INPUT_PACK_TYPE: u8 = 0x01;
pub const INPUT_MODULE_TYPE: u8 = 0x02;

pub const INPUT_PACK_FRAME_LEN: usize = 26;
pub const INPUT_MODULE_FRAME_LEN: usize = 37;

/// Bounded receive buffer capacity (spec §3 invariant: at most
/// `RX_BUF_SIZE - 1` bytes held between frames).
const RX_BUF_SIZE: usize = 512;

/// Raw pack-level fields carried on the input wire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParsedPackFields {
    pub pack_voltage_v: f64,
    pub pack_current_a: f64,
    pub r_internal_mohm: f64,
    pub ambient_c: f64,
    pub coolant_inlet_c: f64,
    pub coolant_outlet_c: f64,
    pub humidity_pct: f64,
    pub isolation_mohm: f64,
    pub gas_ratio_1: f64,
    pub gas_ratio_2: f64,
    pub pressure_delta_1_hpa: f64,
    pub pressure_delta_2_hpa: f64,
    pub short_circuit: bool,
}

/// Raw per-module fields carried on the input wire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParsedModuleFields {
    pub ntc1_c: f64,
    pub ntc2_c: f64,
    pub swelling_pct: f64,
    pub max_dt_dt: f64,
    pub group_voltages_v: [f64; GROUPS_PER_MODULE],
}

/// Encodes one input pack frame. Used by the loopback demo's fixture
/// producer and by tests exercising the receiver end-to-end.
pub fn encode_input_pack_frame(fields: &ParsedPackFields) -> Vec<u8> {
    let mut payload = Vec::with_capacity(INPUT_PACK_FRAME_LEN - 3);
    payload.extend_from_slice(&round_clamp_u16(fields.pack_voltage_v * 10.0).to_le_bytes());
    payload.extend_from_slice(&round_clamp_i16(fields.pack_current_a * 10.0).to_le_bytes());
    payload.extend_from_slice(&round_clamp_u16(fields.r_internal_mohm * 100.0).to_le_bytes());
    payload.extend_from_slice(&round_clamp_i16(fields.ambient_c * 10.0).to_le_bytes());
    payload.extend_from_slice(&round_clamp_i16(fields.coolant_inlet_c * 10.0).to_le_bytes());
    payload.extend_from_slice(&round_clamp_i16(fields.coolant_outlet_c * 10.0).to_le_bytes());
    payload.push(round_clamp_u8(fields.humidity_pct));
    payload.extend_from_slice(&round_clamp_u16(fields.isolation_mohm / 10.0).to_le_bytes());
    payload.push(round_clamp_u8(fields.gas_ratio_1 * 100.0));
    payload.push(round_clamp_u8(fields.gas_ratio_2 * 100.0));
    payload
        .extend_from_slice(&round_clamp_i16(fields.pressure_delta_1_hpa * 100.0).to_le_bytes());
    payload
        .extend_from_slice(&round_clamp_i16(fields.pressure_delta_2_hpa * 100.0).to_le_bytes());
    payload.push(if fields.short_circuit { 0x01 } else { 0x00 });
    finish_input_frame(INPUT_PACK_TYPE, payload)
}

/// Encodes one input module frame for `module_index`.
pub fn encode_input_module_frame(module_index: usize, fields: &ParsedModuleFields) -> Vec<u8> {
    let mut payload = Vec::with_capacity(INPUT_MODULE_FRAME_LEN - 3);
    payload.push(module_index as u8);
    payload.extend_from_slice(&round_clamp_i16(fields.ntc1_c * 10.0).to_le_bytes());
    payload.extend_from_slice(&round_clamp_i16(fields.ntc2_c * 10.0).to_le_bytes());
    payload.push(round_clamp_u8(fields.swelling_pct));
    payload.push(round_clamp_u8(fields.max_dt_dt * 10.0));
    // groups start at payload offset 7 (idx:1 + ntc1:2 + ntc2:2 + swelling:1 + max_dt_dt:1)
    for v in fields.group_voltages_v {
        payload.extend_from_slice(&round_clamp_u16(v * 1000.0).to_le_bytes());
    }
    finish_input_frame(INPUT_MODULE_TYPE, payload)
}

fn finish_input_frame(frame_type: u8, payload: Vec<u8>) -> Vec<u8> {
    let len = payload.len() + 4;
    let mut frame = Vec::with_capacity(len);
    frame.push(INPUT_SYNC);
    frame.push(len as u8);
    frame.push(frame_type);
    frame.extend_from_slice(&payload);
    let checksum = xor_checksum(&frame);
    frame.push(checksum);
    frame
}

fn parse_pack_payload(p: &[u8]) -> ParsedPackFields {
    ParsedPackFields {
        pack_voltage_v: u16::from_le_bytes(p[0..2].try_into().unwrap()) as f64 / 10.0,
        pack_current_a: i16::from_le_bytes(p[2..4].try_into().unwrap()) as f64 / 10.0,
        r_internal_mohm: u16::from_le_bytes(p[4..6].try_into().unwrap()) as f64 / 100.0,
        ambient_c: i16::from_le_bytes(p[6..8].try_into().unwrap()) as f64 / 10.0,
        coolant_inlet_c: i16::from_le_bytes(p[8..10].try_into().unwrap()) as f64 / 10.0,
        coolant_outlet_c: i16::from_le_bytes(p[10..12].try_into().unwrap()) as f64 / 10.0,
        humidity_pct: p[12] as f64,
        isolation_mohm: u16::from_le_bytes(p[13..15].try_into().unwrap()) as f64 * 10.0,
        gas_ratio_1: p[15] as f64 / 100.0,
        gas_ratio_2: p[16] as f64 / 100.0,
        pressure_delta_1_hpa: i16::from_le_bytes(p[17..19].try_into().unwrap()) as f64 / 100.0,
        pressure_delta_2_hpa: i16::from_le_bytes(p[19..21].try_into().unwrap()) as f64 / 100.0,
        short_circuit: p[21] != 0,
    }
}

fn parse_module_payload(p: &[u8]) -> (usize, ParsedModuleFields) {
    let module_index = p[0] as usize;
    let mut group_voltages_v = [0.0; GROUPS_PER_MODULE];
    for (i, slot) in group_voltages_v.iter_mut().enumerate() {
        let off = 7 + i * 2;
        *slot = u16::from_le_bytes(p[off..off + 2].try_into().unwrap()) as f64 / 1000.0;
    }
    (
        module_index,
        ParsedModuleFields {
            ntc1_c: i16::from_le_bytes(p[1..3].try_into().unwrap()) as f64 / 10.0,
            ntc2_c: i16::from_le_bytes(p[3..5].try_into().unwrap()) as f64 / 10.0,
            swelling_pct: p[5] as f64,
            max_dt_dt: p[6] as f64 / 10.0,
            group_voltages_v,
        },
    )
}

/// Byte-at-a-time receiver and resync state machine.
pub struct ReceiverState {
    buf: VecDeque<u8>,
    last_pack: Option<ParsedPackFields>,
    last_modules: Vec<Option<ParsedModuleFields>>,
    pack_received: bool,
    modules_received: Vec<bool>,
    snapshot_ready_signaled: bool,
    pub resync_events: u64,
    pub checksum_mismatches: u64,
    pub frames_accepted: u64,
}

impl ReceiverState {
    pub fn new() -> Self {
        Self {
            buf: VecDeque::with_capacity(RX_BUF_SIZE),
            last_pack: None,
            last_modules: vec![None; NUM_MODULES],
            pack_received: false,
            modules_received: vec![false; NUM_MODULES],
            snapshot_ready_signaled: false,
            resync_events: 0,
            checksum_mismatches: 0,
            frames_accepted: 0,
        }
    }

    /// Feeds one incoming byte and runs the frame/resync state machine to
    /// a fixed point (spec §4.5 steps 1-6).
    pub fn push_byte(&mut self, byte: u8) {
        if self.buf.len() >= RX_BUF_SIZE {
            self.buf.clear();
            self.resync_events += 1;
        }
        self.buf.push_back(byte);
        self.process_buffer();
    }

    fn process_buffer(&mut self) {
        loop {
            while let Some(&front) = self.buf.front() {
                if front == INPUT_SYNC {
                    break;
                }
                self.buf.pop_front();
                self.resync_events += 1;
            }
            if self.buf.len() < 3 {
                break;
            }
            let length = self.buf[1] as usize;
            let frame_type = self.buf[2];
            let expected = match frame_type {
                INPUT_PACK_TYPE => INPUT_PACK_FRAME_LEN,
                INPUT_MODULE_TYPE => INPUT_MODULE_FRAME_LEN,
                _ => 0,
            };
            if expected == 0 || length != expected {
                self.buf.pop_front();
                self.resync_events += 1;
                continue;
            }
            if self.buf.len() < length {
                break;
            }
            let candidate: Vec<u8> = self.buf.iter().take(length).copied().collect();
            let computed = xor_checksum(&candidate[..length - 1]);
            let found = candidate[length - 1];
            if computed != found {
                self.checksum_mismatches += 1;
                self.buf.pop_front();
                self.resync_events += 1;
                continue;
            }
            self.buf.drain(0..length);
            self.accept_frame(frame_type, &candidate[3..length - 1]);
        }
    }

    fn accept_frame(&mut self, frame_type: u8, payload: &[u8]) {
        self.frames_accepted += 1;
        match frame_type {
            INPUT_PACK_TYPE => {
                self.last_pack = Some(parse_pack_payload(payload));
                self.pack_received = true;
            }
            INPUT_MODULE_TYPE => {
                let (index, fields) = parse_module_payload(payload);
                if index < NUM_MODULES {
                    self.last_modules[index] = Some(fields);
                    self.modules_received[index] = true;
                }
            }
            _ => {}
        }
    }

    /// True exactly once per completed cycle: a pack frame and all
    /// `NUM_MODULES` module frames have been received since the last
    /// [`Self::reset_cycle`] (spec §4.5 step 6).
    pub fn snapshot_complete(&mut self) -> bool {
        let complete = self.pack_received && self.modules_received.iter().all(|&r| r);
        if complete && !self.snapshot_ready_signaled {
            self.snapshot_ready_signaled = true;
            return true;
        }
        false
    }

    /// Builds a [`PackSnapshot`] from the last-valid frames. Derived
    /// fields are left at zero; the caller runs the evaluator's pre-pass
    /// before use.
    pub fn build_snapshot(&self) -> Option<PackSnapshot> {
        let pack = self.last_pack?;
        let mut modules = Vec::with_capacity(NUM_MODULES);
        for slot in &self.last_modules {
            let fields = (*slot)?;
            let mut module = ModuleData {
                ntc1_c: fields.ntc1_c,
                ntc2_c: fields.ntc2_c,
                swelling_pct: fields.swelling_pct,
                max_dt_dt: fields.max_dt_dt,
                group_voltages_v: fields.group_voltages_v,
                delta_t_intra: 0.0,
                module_voltage: 0.0,
                v_spread_mv: 0.0,
            };
            module.recompute_derived();
            modules.push(module);
        }
        Some(PackSnapshot {
            pack_voltage_v: pack.pack_voltage_v,
            pack_current_a: pack.pack_current_a,
            r_internal_mohm: pack.r_internal_mohm,
            dr_dt_mohm_per_s: 0.0,
            ambient_c: pack.ambient_c,
            coolant_inlet_c: pack.coolant_inlet_c,
            coolant_outlet_c: pack.coolant_outlet_c,
            humidity_pct: pack.humidity_pct,
            isolation_mohm: pack.isolation_mohm,
            gas_ratio_1: pack.gas_ratio_1,
            gas_ratio_2: pack.gas_ratio_2,
            pressure_delta_1_hpa: pack.pressure_delta_1_hpa,
            pressure_delta_2_hpa: pack.pressure_delta_2_hpa,
            modules,
            hotspot_temp_c: 0.0,
            temp_spread_c: 0.0,
            v_spread_mv: 0.0,
            t_core_est_c: 0.0,
            dt_dt_max: 0.0,
            short_circuit: pack.short_circuit,
        })
    }

    /// Clears the received bits (and the edge-trigger latch) so a new
    /// cycle's frames can be detected; last-valid frame contents are kept
    /// so a dropped frame next cycle still has a stale-but-usable value
    /// (spec §4.5 step 6, §3).
    pub fn reset_cycle(&mut self) {
        self.pack_received = false;
        self.modules_received.iter_mut().for_each(|r| *r = false);
        self.snapshot_ready_signaled = false;
    }
}

impl Default for ReceiverState {
    fn default() -> Self {
        Self::new()
    }
}
