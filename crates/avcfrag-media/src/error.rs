//! Error types for avcfrag-media.

use std::fmt;
use std::io;
use thiserror::Error;

/// Result type for avcfrag-media operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Which parameter set an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterSetKind {
    /// Sequence Parameter Set.
    Sps,
    /// Picture Parameter Set.
    Pps,
}

impl fmt::Display for ParameterSetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sps => write!(f, "SPS"),
            Self::Pps => write!(f, "PPS"),
        }
    }
}

/// Error type for avcfrag-media operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The bitstream carries no SPS or no PPS.
    #[error("Missing parameter set: no {0} NAL unit in bitstream")]
    MissingParameterSet(ParameterSetKind),

    /// Two different parameter sets of the same kind under the strict policy.
    #[error("Conflicting parameter sets: bitstream carries more than one distinct {0}")]
    ConflictingParameterSets(ParameterSetKind),

    /// The AVC decoder configuration could not be built or parsed.
    #[error("Codec description error: {0}")]
    CodecDescription(String),

    /// A box could not be encoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A tick value does not fit its field.
    #[error("Timing overflow: {seconds}s at timescale {timescale} does not fit {field}")]
    TimingOverflow {
        seconds: u64,
        timescale: u32,
        field: &'static str,
    },

    /// Negative or otherwise unusable timestamp/duration at the binding boundary.
    #[error("Invalid timing: {0}")]
    InvalidTiming(String),

    /// Invalid muxer configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The frame bitstream contains no NAL units.
    #[error("Empty sample: bitstream contains no NAL units")]
    EmptySample,

    /// Malformed length-prefixed sample data.
    #[error("Invalid bitstream: {0}")]
    InvalidBitstream(String),

    /// Invalid MP4 structure while inspecting a segment.
    #[error("Invalid MP4: {0}")]
    InvalidMp4(String),

    /// Stream session protocol violation.
    #[error("Session error: {0}")]
    Session(String),

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Create a codec description error.
    pub fn codec(msg: impl Into<String>) -> Self {
        Self::CodecDescription(msg.into())
    }

    /// Create an invalid MP4 error.
    pub fn invalid_mp4(msg: impl Into<String>) -> Self {
        Self::InvalidMp4(msg.into())
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a session error.
    pub fn session(msg: impl Into<String>) -> Self {
        Self::Session(msg.into())
    }
}
