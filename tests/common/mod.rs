//! Shared fixtures for integration tests.
//!
//! `keyframe_a.hex` and `keyframe_b.hex` are single-keyframe H.264 Annex-B
//! access units (SPS, PPS, SEI, IDR slice) from a 1280x720 High profile
//! stream, stored as hex text.

#![allow(dead_code)]

use std::path::PathBuf;

/// High profile, level 3.1, 1280x720
pub const SPS_HIGH: &[u8] = &[0x27, 0x64, 0x00, 0x1F, 0xAC, 0x56, 0x80, 0x50, 0x05, 0xB9];
/// Constrained Baseline, level 4.0, 1920x1080
pub const SPS_BASELINE: &[u8] = &[0x67, 0x42, 0xC0, 0x28, 0xDA, 0x01, 0xE0, 0x08, 0x9F, 0x95];
pub const PPS: &[u8] = &[0x28, 0xEE, 0x3C, 0xB0];

/// Length of the fixtures' IDR slices
pub const KEYFRAME_A_IDR_LEN: usize = 205;
pub const KEYFRAME_B_IDR_LEN: usize = 214;

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn decode(text: &str) -> Vec<u8> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    hex::decode(compact).expect("fixture is valid hex")
}

pub fn keyframe_a() -> Vec<u8> {
    decode(include_str!("../fixtures/keyframe_a.hex"))
}

pub fn keyframe_b() -> Vec<u8> {
    decode(include_str!("../fixtures/keyframe_b.hex"))
}

/// Join NAL units with 4-byte start codes.
pub fn annex_b(units: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::new();
    for unit in units {
        out.extend_from_slice(&[0, 0, 0, 1]);
        out.extend_from_slice(unit);
    }
    out
}

pub fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}
