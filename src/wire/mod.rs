//! Framed wire codecs (spec §4.5, §4.6): the output telemetry encoder, the
//! input receiver/resync state machine, and the byte-level helpers both
//! share.
//!
//! Grounded on the teacher's `Transmitter`/`Receiving` pair
//! (`component_a/transmitter.rs`, `component_b/receiver.rs`): a small,
//! explicit hand-off struct on each side of a channel. Here the "channel"
//! is a byte-oriented transport instead of a typed crossbeam queue, so the
//! hand-off struct is a fixed byte layout instead of a Rust struct — spec
//! §9's "packed structs as wire format" redesign flag replaces the
//! `#[repr(packed)]` idiom with explicit encode/decode functions.

pub mod decode;
pub mod encode;

/// XOR checksum over every byte in `bytes` (spec §4.5/§4.6: best-effort
/// integrity over a non-adversarial channel, not a cryptographic MAC).
pub fn xor_checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc ^ b)
}

#[inline]
pub(crate) fn round_clamp_u16(value: f64) -> u16 {
    value.round().clamp(0.0, u16::MAX as f64) as u16
}

#[inline]
pub(crate) fn round_clamp_i16(value: f64) -> i16 {
    value.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16
}

#[inline]
pub(crate) fn round_clamp_u8(value: f64) -> u8 {
    value.round().clamp(0.0, u8::MAX as f64) as u8
}
