//! Deterministic fallback snapshot producer (spec §4.1, §5): what the
//! scheduler substitutes for the external twin's input after
//! `EXTERNAL_INPUT_TIMEOUT` of silence.
//!
//! Grounded on the teacher's own role as a host-side stand-in for real
//! sensors — the teacher *is* a synthetic producer for its own pipeline.
//! This one is deliberately inert (always nominal) rather than a richer
//! simulation, since a scenario-injection generator is explicitly out of
//! scope (spec §1) and the fallback's only job is to keep monitoring
//! alive on a known-safe value while the input link is down.

use crate::model::PackSnapshot;

/// Produces the nominal snapshot every time it is polled. The scheduler
/// is responsible for logging the fallback transition and for not
/// mistaking "input is down" for "the pack is nominal" in any
/// safety-relevant decision beyond continuing to monitor.
#[derive(Debug, Default, Clone, Copy)]
pub struct FallbackProducer;

impl FallbackProducer {
    pub fn new() -> Self {
        Self
    }

    pub fn produce(&self) -> PackSnapshot {
        PackSnapshot::nominal()
    }
}
