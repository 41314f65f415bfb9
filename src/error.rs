//! Error types for the safety core.
//!
//! Nothing in this crate aborts on these errors (spec §7): every caller
//! either matches the documented fallback (self-check failure → relay
//! stays disconnected; checksum mismatch → receiver resyncs) or logs and
//! continues. The enum exists so those failure modes are named and
//! testable instead of being embedded as ad hoc `bool`/`Option`.

use thiserror::Error;

/// Errors surfaced by the self-check, wire codecs and configuration layer.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A declared frame size did not match the encoder's fixed layout.
    #[error("frame size mismatch: declared {declared}, expected {expected}")]
    FrameSizeMismatch { declared: usize, expected: usize },

    /// A buffer was too short to contain the frame its header describes.
    #[error("frame too short: have {have} bytes, need {need}")]
    FrameTooShort { have: usize, need: usize },

    /// The trailing XOR byte did not match the recomputed checksum.
    #[error("checksum mismatch: computed {computed:#04x}, frame has {found:#04x}")]
    ChecksumMismatch { computed: u8, found: u8 },

    /// The sync byte at the head of the buffer did not match.
    #[error("sync byte mismatch: expected {expected:#04x}, found {found:#04x}")]
    SyncMismatch { expected: u8, found: u8 },

    /// The type byte did not correspond to a known frame kind.
    #[error("unknown frame type byte: {0:#04x}")]
    UnknownFrameType(u8),

    /// A module index carried by a module frame was out of range.
    #[error("module index {index} out of range (NUM_MODULES = {num_modules})")]
    ModuleIndexOutOfRange { index: usize, num_modules: usize },

    /// The threshold ordering invariant required by self-check did not hold.
    #[error("threshold ordering invariant violated: {0}")]
    ThresholdOrdering(&'static str),

    /// The self-check's functional encode/decode probe failed.
    #[error("self-check functional probe failed: {0}")]
    ProbeFailed(&'static str),

    /// Deserializing a threshold override from JSON failed.
    #[error("threshold config error: {source}")]
    Config {
        #[from]
        source: serde_json::Error,
    },
}

pub type CoreResult<T> = Result<T, CoreError>;
