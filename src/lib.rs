//! Deterministic core for an edge battery-safety monitor.
//!
//! A single-threaded, cooperative multi-rate scheduler ([`scheduler`])
//! ingests a periodic [`model::PackSnapshot`], classifies anomaly
//! categories ([`evaluator`]) against configured [`thresholds::Thresholds`],
//! drives a latched four-state [`correlation`] machine, and exchanges
//! framed telemetry over the [`wire`] codecs with an external twin through
//! the narrow [`collaborators`] traits. See `SPEC_FULL.md` for the full
//! design.

pub mod collaborators;
pub mod correlation;
pub mod error;
pub mod evaluator;
pub mod fallback;
pub mod metrics;
pub mod model;
pub mod scheduler;
pub mod self_check;
pub mod thresholds;
pub mod wire;
