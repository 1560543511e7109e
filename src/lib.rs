//! avcfrag - H.264 Annex-B to fragmented MP4 packager
//!
//! This library crate exposes the CLI's configuration and input handling for
//! integration testing. The muxer itself lives in `avcfrag-media`.

pub mod config;
pub mod input;
