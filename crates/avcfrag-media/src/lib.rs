//! # avcfrag-media
//!
//! Fragmented MP4 multiplexing for raw H.264 (Annex-B) bitstreams.
//!
//! Two independent, stateless builders:
//!
//! - [`create_init`]: extracts SPS/PPS and writes an initialization segment
//!   (`ftyp` + `moov` with one `avc1` track)
//! - [`create_segment`]: converts one access unit to 4-byte length-prefixed
//!   form and writes a media segment (`moof` + `mdat`) holding one sync sample
//!
//! ```
//! use avcfrag_media::{create_init, create_segment, MuxConfig};
//!
//! let sps = [0x27, 0x64, 0x00, 0x1F, 0xAC, 0x56, 0x80, 0x50, 0x05, 0xB9];
//! let pps = [0x28, 0xEE, 0x3C, 0xB0];
//! let idr = [0x25, 0xB8, 0x20, 0x04];
//!
//! let mut frame = Vec::new();
//! for nal in [&sps[..], &pps[..], &idr[..]] {
//!     frame.extend_from_slice(&[0, 0, 0, 1]);
//!     frame.extend_from_slice(nal);
//! }
//!
//! let config = MuxConfig::default();
//! let init = create_init(&frame, &config).unwrap();
//! let segment = create_segment(&frame, 0, 1, &config).unwrap();
//!
//! assert_eq!(&init[4..8], b"ftyp");
//! assert_eq!(&segment[4..8], b"moof");
//! ```
//!
//! [`StreamSession`] wraps both builders for callers that want the
//! init-once, increasing-timestamp protocol checked. [`inspect`] parses
//! produced segments back into summaries.

pub mod avcc;
pub mod binding;
pub mod error;
pub mod fmp4;
pub mod inspect;
pub mod mux;
pub mod nal;
pub mod session;
pub mod sps;

#[cfg(all(target_arch = "wasm32", feature = "wasm"))]
pub mod wasm;

pub use avcc::AvcDecoderConfig;
pub use error::{Error, ParameterSetKind, Result};
pub use inspect::{InitSegmentInfo, MediaSegmentInfo, SegmentInfo};
pub use mux::{create_init, create_segment, MuxConfig, DEFAULT_TIMESCALE, DEFAULT_TRACK_ID};
pub use nal::{NalUnit, NalUnitType, ParameterSetPolicy};
pub use session::StreamSession;
pub use sps::Sps;
