//! H.264 Sequence Parameter Set (SPS) parsing.
//!
//! Only the fields needed to describe the track are kept: profile and level
//! for the decoder configuration record, chroma format and bit depth for the
//! High-profile `avcC` extension, and the cropped picture size for `tkhd` and
//! the `avc1` sample entry.

use crate::error::{Error, Result};
use crate::nal::{NalUnit, NalUnitType};

/// Profiles whose SPS carries chroma format and bit depth syntax.
const CHROMA_FORMAT_PROFILES: [u8; 13] = [
    100, 110, 122, 244, 44, 83, 86, 118, 128, 138, 139, 134, 135,
];

/// Sequence Parameter Set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sps {
    /// `profile_idc`
    pub profile_idc: u8,
    /// Constraint set flags byte (`profile_compatibility` in avcC)
    pub constraint_flags: u8,
    /// `level_idc`
    pub level_idc: u8,
    /// `seq_parameter_set_id`
    pub seq_parameter_set_id: u32,
    /// 0 = monochrome, 1 = 4:2:0, 2 = 4:2:2, 3 = 4:4:4
    pub chroma_format_idc: u32,
    pub separate_colour_plane: bool,
    /// Bit depth for luma samples
    pub bit_depth_luma: u8,
    /// Bit depth for chroma samples
    pub bit_depth_chroma: u8,
    /// Progressive frames only (no field coding)
    pub frame_mbs_only: bool,
    /// Picture width in luma samples after cropping
    pub width: u32,
    /// Picture height in luma samples after cropping
    pub height: u32,
}

/// Parse an SPS NAL unit (header byte included, escaping kept).
pub fn parse_sps(nalu: &[u8]) -> Result<Sps> {
    let unit = NalUnit::new(nalu).ok_or_else(|| Error::codec("empty SPS NAL unit"))?;
    if unit.nal_type != NalUnitType::Sps {
        return Err(Error::codec(format!(
            "expected SPS, found NAL unit type {}",
            unit.nal_type.as_u8()
        )));
    }

    let rbsp = unit.rbsp();
    let mut reader = BitReader::new(&rbsp);
    parse_fields(&mut reader).ok_or_else(|| Error::codec("SPS is truncated or malformed"))
}

fn parse_fields(reader: &mut BitReader) -> Option<Sps> {
    let profile_idc = reader.read_bits(8)? as u8;
    let constraint_flags = reader.read_bits(8)? as u8;
    let level_idc = reader.read_bits(8)? as u8;
    let seq_parameter_set_id = reader.read_ue()?;

    let mut chroma_format_idc = 1;
    let mut separate_colour_plane = false;
    let mut bit_depth_luma = 8u8;
    let mut bit_depth_chroma = 8u8;

    if CHROMA_FORMAT_PROFILES.contains(&profile_idc) {
        chroma_format_idc = reader.read_ue()?;
        if chroma_format_idc > 3 {
            return None;
        }
        if chroma_format_idc == 3 {
            separate_colour_plane = reader.read_flag()?;
        }
        bit_depth_luma = u8::try_from(reader.read_ue()?.checked_add(8)?).ok()?;
        bit_depth_chroma = u8::try_from(reader.read_ue()?.checked_add(8)?).ok()?;
        // qpprime_y_zero_transform_bypass_flag
        reader.read_flag()?;
        if reader.read_flag()? {
            let lists = if chroma_format_idc == 3 { 12 } else { 8 };
            for i in 0..lists {
                if reader.read_flag()? {
                    skip_scaling_list(reader, if i < 6 { 16 } else { 64 })?;
                }
            }
        }
    }

    // log2_max_frame_num_minus4
    reader.read_ue()?;

    let pic_order_cnt_type = reader.read_ue()?;
    match pic_order_cnt_type {
        0 => {
            // log2_max_pic_order_cnt_lsb_minus4
            reader.read_ue()?;
        }
        1 => {
            reader.read_flag()?; // delta_pic_order_always_zero_flag
            reader.read_se()?; // offset_for_non_ref_pic
            reader.read_se()?; // offset_for_top_to_bottom_field
            let cycle = reader.read_ue()?;
            if cycle > 255 {
                return None;
            }
            for _ in 0..cycle {
                reader.read_se()?;
            }
        }
        2 => {}
        _ => return None,
    }

    // max_num_ref_frames
    reader.read_ue()?;
    // gaps_in_frame_num_value_allowed_flag
    reader.read_flag()?;

    let width_in_mbs = reader.read_ue()?.checked_add(1)?;
    let height_in_map_units = reader.read_ue()?.checked_add(1)?;

    let frame_mbs_only = reader.read_flag()?;
    if !frame_mbs_only {
        // mb_adaptive_frame_field_flag
        reader.read_flag()?;
    }
    // direct_8x8_inference_flag
    reader.read_flag()?;

    let mut width = width_in_mbs.checked_mul(16)?;
    let field_factor = if frame_mbs_only { 1 } else { 2 };
    let mut height = height_in_map_units.checked_mul(16 * field_factor)?;

    if reader.read_flag()? {
        let left = reader.read_ue()?;
        let right = reader.read_ue()?;
        let top = reader.read_ue()?;
        let bottom = reader.read_ue()?;

        let chroma_array_type = if separate_colour_plane {
            0
        } else {
            chroma_format_idc
        };
        let (crop_unit_x, crop_unit_y) = match chroma_array_type {
            0 => (1, field_factor),
            1 => (2, 2 * field_factor),
            2 => (2, field_factor),
            _ => (1, field_factor),
        };

        let crop_x = left.checked_add(right)?.checked_mul(crop_unit_x)?;
        let crop_y = top.checked_add(bottom)?.checked_mul(crop_unit_y)?;
        width = width.checked_sub(crop_x)?;
        height = height.checked_sub(crop_y)?;
    }

    Some(Sps {
        profile_idc,
        constraint_flags,
        level_idc,
        seq_parameter_set_id,
        chroma_format_idc,
        separate_colour_plane,
        bit_depth_luma,
        bit_depth_chroma,
        frame_mbs_only,
        width,
        height,
    })
}

fn skip_scaling_list(reader: &mut BitReader, size: usize) -> Option<()> {
    let mut last_scale = 8i32;
    let mut next_scale = 8i32;
    for _ in 0..size {
        if next_scale != 0 {
            let delta = reader.read_se()?;
            next_scale = (last_scale + delta + 256).rem_euclid(256);
        }
        if next_scale != 0 {
            last_scale = next_scale;
        }
    }
    Some(())
}

/// MSB-first bit reader over an unescaped RBSP.
struct BitReader<'a> {
    data: &'a [u8],
    byte_pos: usize,
    bit_pos: u8,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            byte_pos: 0,
            bit_pos: 0,
        }
    }

    /// Read n bits (up to 32)
    fn read_bits(&mut self, n: u8) -> Option<u32> {
        let mut result = 0u32;

        for _ in 0..n {
            let byte = *self.data.get(self.byte_pos)?;
            let bit = (byte >> (7 - self.bit_pos)) & 1;
            result = (result << 1) | (bit as u32);

            self.bit_pos += 1;
            if self.bit_pos == 8 {
                self.bit_pos = 0;
                self.byte_pos += 1;
            }
        }

        Some(result)
    }

    fn read_flag(&mut self) -> Option<bool> {
        Some(self.read_bits(1)? == 1)
    }

    /// Read unsigned Exp-Golomb coded value
    fn read_ue(&mut self) -> Option<u32> {
        let mut leading_zeros = 0u8;
        while self.read_bits(1)? == 0 {
            leading_zeros += 1;
            if leading_zeros > 31 {
                return None;
            }
        }

        if leading_zeros == 0 {
            return Some(0);
        }

        let suffix = self.read_bits(leading_zeros)?;
        Some(((1u64 << leading_zeros) - 1 + suffix as u64) as u32)
    }

    /// Read signed Exp-Golomb coded value
    fn read_se(&mut self) -> Option<i32> {
        let code = self.read_ue()? as i64;
        let value = if code % 2 == 1 {
            (code + 1) / 2
        } else {
            -(code / 2)
        };
        Some(value as i32)
    }
}
