//! AVCDecoderConfigurationRecord (`avcC` box content, ISO/IEC 14496-15).

use bytes::BufMut;

use crate::error::{Error, Result};
use crate::nal::{NalUnit, NalUnitType};
use crate::sps::Sps;

/// NAL length field size used in every sample (`lengthSizeMinusOne = 3`).
pub const NAL_LENGTH_SIZE: u8 = 4;

/// Profiles whose configuration record carries the chroma/bit-depth extension.
const EXTENDED_PROFILES: [u8; 4] = [100, 110, 122, 144];

/// Decoder configuration for one AVC track.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct AvcDecoderConfig {
    pub profile_indication: u8,
    pub profile_compatibility: u8,
    pub level_indication: u8,
    pub length_size_minus_one: u8,
    /// SPS NAL units, header byte included
    pub sps: Vec<Vec<u8>>,
    /// PPS NAL units, header byte included
    pub pps: Vec<Vec<u8>>,
    /// Present for High profiles (100, 110, 122, 144)
    pub high_profile_ext: Option<HighProfileExt>,
}

/// Trailing fields of the record for High profiles.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct HighProfileExt {
    pub chroma_format: u8,
    pub bit_depth_luma_minus8: u8,
    pub bit_depth_chroma_minus8: u8,
    pub sps_ext: Vec<Vec<u8>>,
}

impl AvcDecoderConfig {
    /// Build a record holding exactly one SPS and one PPS.
    ///
    /// `sps` is the parsed form of `sps_nalu`; profile, compatibility and
    /// level come from its first three payload bytes.
    pub fn from_parameter_sets(sps: &Sps, sps_nalu: &[u8], pps_nalu: &[u8]) -> Result<Self> {
        match NalUnit::new(pps_nalu) {
            Some(unit) if unit.nal_type == NalUnitType::Pps => {}
            Some(unit) => {
                return Err(Error::codec(format!(
                    "expected PPS, found NAL unit type {}",
                    unit.nal_type.as_u8()
                )))
            }
            None => return Err(Error::codec("empty PPS NAL unit")),
        }
        for (name, nalu) in [("SPS", sps_nalu), ("PPS", pps_nalu)] {
            if nalu.len() > u16::MAX as usize {
                return Err(Error::codec(format!(
                    "{} of {} bytes exceeds the 16-bit length field",
                    name,
                    nalu.len()
                )));
            }
        }

        let high_profile_ext = EXTENDED_PROFILES
            .contains(&sps.profile_idc)
            .then(|| HighProfileExt {
                chroma_format: sps.chroma_format_idc as u8,
                bit_depth_luma_minus8: sps.bit_depth_luma.saturating_sub(8),
                bit_depth_chroma_minus8: sps.bit_depth_chroma.saturating_sub(8),
                sps_ext: Vec::new(),
            });

        Ok(Self {
            profile_indication: sps.profile_idc,
            profile_compatibility: sps.constraint_flags,
            level_indication: sps.level_idc,
            length_size_minus_one: NAL_LENGTH_SIZE - 1,
            sps: vec![sps_nalu.to_vec()],
            pps: vec![pps_nalu.to_vec()],
            high_profile_ext,
        })
    }

    /// Size in bytes when encoded.
    pub fn size(&self) -> usize {
        let sets: usize = self
            .sps
            .iter()
            .chain(self.pps.iter())
            .map(|n| 2 + n.len())
            .sum();
        let ext = self.high_profile_ext.as_ref().map_or(0, |e| {
            4 + e.sps_ext.iter().map(|n| 2 + n.len()).sum::<usize>()
        });
        7 + sets + ext
    }

    /// Encode the record (the `avcC` box payload).
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.size());
        out.put_u8(1); // configurationVersion
        out.put_u8(self.profile_indication);
        out.put_u8(self.profile_compatibility);
        out.put_u8(self.level_indication);
        out.put_u8(0xFC | (self.length_size_minus_one & 0x03));
        out.put_u8(0xE0 | (self.sps.len() as u8 & 0x1F));
        put_nalus(&mut out, &self.sps);
        out.put_u8(self.pps.len() as u8);
        put_nalus(&mut out, &self.pps);
        if let Some(ext) = &self.high_profile_ext {
            out.put_u8(0xFC | (ext.chroma_format & 0x03));
            out.put_u8(0xF8 | (ext.bit_depth_luma_minus8 & 0x07));
            out.put_u8(0xF8 | (ext.bit_depth_chroma_minus8 & 0x07));
            out.put_u8(ext.sps_ext.len() as u8);
            put_nalus(&mut out, &ext.sps_ext);
        }
        out
    }

    /// Parse an encoded record.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = RecordReader { data, pos: 0 };

        let version = reader.u8()?;
        if version != 1 {
            return Err(Error::codec(format!(
                "unsupported configurationVersion {}",
                version
            )));
        }
        let profile_indication = reader.u8()?;
        let profile_compatibility = reader.u8()?;
        let level_indication = reader.u8()?;
        let length_size_minus_one = reader.u8()? & 0x03;

        let num_sps = reader.u8()? & 0x1F;
        let sps = reader.nalus(num_sps as usize)?;
        let num_pps = reader.u8()?;
        let pps = reader.nalus(num_pps as usize)?;

        let high_profile_ext =
            if EXTENDED_PROFILES.contains(&profile_indication) && reader.remaining() >= 4 {
                let chroma_format = reader.u8()? & 0x03;
                let bit_depth_luma_minus8 = reader.u8()? & 0x07;
                let bit_depth_chroma_minus8 = reader.u8()? & 0x07;
                let num_ext = reader.u8()?;
                Some(HighProfileExt {
                    chroma_format,
                    bit_depth_luma_minus8,
                    bit_depth_chroma_minus8,
                    sps_ext: reader.nalus(num_ext as usize)?,
                })
            } else {
                None
            };

        Ok(Self {
            profile_indication,
            profile_compatibility,
            level_indication,
            length_size_minus_one,
            sps,
            pps,
            high_profile_ext,
        })
    }

    /// RFC 6381 codec string, e.g. `avc1.64001f`.
    pub fn codec_string(&self) -> String {
        format!(
            "avc1.{:02x}{:02x}{:02x}",
            self.profile_indication, self.profile_compatibility, self.level_indication
        )
    }
}

fn put_nalus(out: &mut Vec<u8>, nalus: &[Vec<u8>]) {
    for nalu in nalus {
        out.put_u16(nalu.len() as u16);
        out.put_slice(nalu);
    }
}

struct RecordReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> RecordReader<'a> {
    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(Error::codec(format!(
                "decoder configuration truncated at offset {} (need {} bytes)",
                self.pos, n
            )));
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn nalus(&mut self, count: usize) -> Result<Vec<Vec<u8>>> {
        let mut nalus = Vec::with_capacity(count);
        for _ in 0..count {
            let len = self.take(2)?;
            let len = u16::from_be_bytes([len[0], len[1]]) as usize;
            nalus.push(self.take(len)?.to_vec());
        }
        Ok(nalus)
    }
}
