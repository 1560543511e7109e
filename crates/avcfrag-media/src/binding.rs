//! Host-facing entry points.
//!
//! Thin wrappers over [`crate::mux`] for callers across a runtime boundary:
//! each call returns either the produced bytes or a readable error message,
//! never a Rust error type. Settings are [`MuxConfig::default`].

use crate::error::{Error, Result};
use crate::mux::{self, MuxConfig};

/// Result of a host call: segment bytes or an error message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingOutput {
    Buffer(Vec<u8>),
    Message(String),
}

impl BindingOutput {
    fn from_result(operation: &'static str, result: Result<Vec<u8>>) -> Self {
        match result {
            Ok(bytes) => Self::Buffer(bytes),
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(operation, error = %e, "Muxing call failed");
                #[cfg(not(feature = "tracing"))]
                let _ = operation;

                Self::Message(e.to_string())
            }
        }
    }

    pub fn is_buffer(&self) -> bool {
        matches!(self, Self::Buffer(_))
    }

    /// Bytes on success, the message otherwise.
    pub fn into_result(self) -> std::result::Result<Vec<u8>, String> {
        match self {
            Self::Buffer(bytes) => Ok(bytes),
            Self::Message(msg) => Err(msg),
        }
    }
}

/// `createInit`: init segment from a bitstream carrying SPS and PPS.
pub fn create_init(bitstream: &[u8]) -> BindingOutput {
    BindingOutput::from_result(
        "createInit",
        mux::create_init(bitstream, &MuxConfig::default()),
    )
}

/// `createSegment`: one-sample fragment; timestamp and duration in seconds.
pub fn create_segment(bitstream: &[u8], timestamp: i64, duration: i64) -> BindingOutput {
    let result = non_negative("timestamp", timestamp).and_then(|timestamp| {
        let duration = non_negative("duration", duration)?;
        mux::create_segment(bitstream, timestamp, duration, &MuxConfig::default())
    });
    BindingOutput::from_result("createSegment", result)
}

fn non_negative(name: &str, value: i64) -> Result<u64> {
    u64::try_from(value)
        .map_err(|_| Error::InvalidTiming(format!("{} must be non-negative, got {}", name, value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPS: &[u8] = &[0x27, 0x64, 0x00, 0x1F, 0xAC, 0x56, 0x80, 0x50, 0x05, 0xB9];
    const PPS: &[u8] = &[0x28, 0xEE, 0x3C, 0xB0];
    const IDR: &[u8] = &[0x25, 0xB8, 0x20, 0x04, 0xFF];

    fn stream(units: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        for unit in units {
            out.extend_from_slice(&[0, 0, 1]);
            out.extend_from_slice(unit);
        }
        out
    }

    #[test]
    fn test_create_init_buffer() {
        let output = create_init(&stream(&[SPS, PPS, IDR]));
        assert!(output.is_buffer());
        let bytes = output.into_result().unwrap();
        assert_eq!(&bytes[4..8], b"ftyp");
    }

    #[test]
    fn test_create_init_message_without_pps() {
        let output = create_init(&stream(&[SPS, IDR]));
        assert_eq!(
            output,
            BindingOutput::Message(
                "Missing parameter set: no PPS NAL unit in bitstream".to_string()
            )
        );
    }

    #[test]
    fn test_create_segment_buffer() {
        let bytes = create_segment(&stream(&[IDR]), 0, 1).into_result().unwrap();
        assert_eq!(&bytes[4..8], b"moof");
    }

    #[test]
    fn test_create_segment_rejects_negative_values() {
        let msg = create_segment(&stream(&[IDR]), -1, 1)
            .into_result()
            .unwrap_err();
        assert!(msg.contains("timestamp must be non-negative"), "{}", msg);

        let msg = create_segment(&stream(&[IDR]), 0, -5)
            .into_result()
            .unwrap_err();
        assert!(msg.contains("duration must be non-negative"), "{}", msg);
    }

    #[test]
    fn test_create_segment_empty_input() {
        let output = create_segment(&[], 0, 1);
        assert!(!output.is_buffer());
    }
}
