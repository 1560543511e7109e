//! H.264 NAL unit extraction and framing conversion.
//!
//! Annex-B streams delimit NAL units with `00 00 01` or `00 00 00 01` start
//! codes. MP4 samples carry the same units with a 4-byte big-endian length in
//! front of each one instead. Payloads keep their emulation-prevention bytes
//! in both forms; only bit-level parsing needs the unescaped RBSP.

use bytes::BufMut;

use crate::error::{Error, ParameterSetKind, Result};

/// H.264 NAL unit types (ITU-T H.264 Table 7-1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NalUnitType {
    /// Coded slice of a non-IDR picture
    NonIdrSlice,
    /// Coded slice data partition A
    PartitionA,
    /// Coded slice data partition B
    PartitionB,
    /// Coded slice data partition C
    PartitionC,
    /// Coded slice of an IDR picture
    IdrSlice,
    /// Supplemental enhancement information
    Sei,
    /// Sequence parameter set
    Sps,
    /// Picture parameter set
    Pps,
    /// Access unit delimiter
    AccessUnitDelimiter,
    /// End of sequence
    EndOfSequence,
    /// End of stream
    EndOfStream,
    /// Filler data
    FillerData,
    /// Sequence parameter set extension
    SpsExtension,
    /// Prefix NAL unit (SVC/MVC)
    PrefixNal,
    /// Subset sequence parameter set
    SubsetSps,
    /// Unspecified or reserved value
    Other(u8),
}

impl NalUnitType {
    /// Classify a NAL unit from its header byte (low 5 bits).
    pub fn from_header_byte(byte: u8) -> Self {
        Self::from(byte & 0x1F)
    }

    /// The numeric `nal_unit_type`.
    pub fn as_u8(self) -> u8 {
        match self {
            Self::NonIdrSlice => 1,
            Self::PartitionA => 2,
            Self::PartitionB => 3,
            Self::PartitionC => 4,
            Self::IdrSlice => 5,
            Self::Sei => 6,
            Self::Sps => 7,
            Self::Pps => 8,
            Self::AccessUnitDelimiter => 9,
            Self::EndOfSequence => 10,
            Self::EndOfStream => 11,
            Self::FillerData => 12,
            Self::SpsExtension => 13,
            Self::PrefixNal => 14,
            Self::SubsetSps => 15,
            Self::Other(v) => v,
        }
    }

    /// True for coded slice data (types 1-5).
    pub fn is_vcl(self) -> bool {
        matches!(self.as_u8(), 1..=5)
    }
}

impl From<u8> for NalUnitType {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::NonIdrSlice,
            2 => Self::PartitionA,
            3 => Self::PartitionB,
            4 => Self::PartitionC,
            5 => Self::IdrSlice,
            6 => Self::Sei,
            7 => Self::Sps,
            8 => Self::Pps,
            9 => Self::AccessUnitDelimiter,
            10 => Self::EndOfSequence,
            11 => Self::EndOfStream,
            12 => Self::FillerData,
            13 => Self::SpsExtension,
            14 => Self::PrefixNal,
            15 => Self::SubsetSps,
            v => Self::Other(v),
        }
    }
}

/// A NAL unit borrowed from its source buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NalUnit<'a> {
    /// NAL unit type
    pub nal_type: NalUnitType,
    /// `nal_ref_idc` (0 = not used for reference)
    pub nal_ref_idc: u8,
    /// Header byte plus payload, start code removed, escaping kept
    pub data: &'a [u8],
}

impl<'a> NalUnit<'a> {
    /// Wrap a raw NAL unit. Returns `None` for an empty slice.
    pub fn new(data: &'a [u8]) -> Option<Self> {
        let header = *data.first()?;
        Some(Self {
            nal_type: NalUnitType::from_header_byte(header),
            nal_ref_idc: (header >> 5) & 0x03,
            data,
        })
    }

    /// Payload after the header byte with emulation prevention removed.
    pub fn rbsp(&self) -> Vec<u8> {
        remove_emulation_prevention(&self.data[1..])
    }
}

/// How repeated SPS/PPS units in one bitstream are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ParameterSetPolicy {
    /// Keep the last SPS and the last PPS seen.
    #[default]
    LastWins,
    /// Reject a second SPS (or PPS) whose bytes differ from the first.
    Strict,
}

/// The SPS and PPS selected from a bitstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterSets<'a> {
    pub sps: &'a [u8],
    pub pps: &'a [u8],
}

/// Extract NAL units from an Annex-B byte stream.
///
/// Bytes before the first start code are ignored. Zero bytes in front of a
/// start code (the leading zero of a 4-byte start code, or
/// `trailing_zero_8bits`) are not part of the preceding unit.
pub fn extract_nal_units(data: &[u8]) -> Vec<NalUnit<'_>> {
    let starts = find_start_codes(data);
    let mut units = Vec::with_capacity(starts.len());

    for (idx, &(_, payload_start)) in starts.iter().enumerate() {
        let end = starts
            .get(idx + 1)
            .map(|&(code_pos, _)| code_pos)
            .unwrap_or(data.len());
        let payload = trim_trailing_zeros(&data[payload_start..end]);
        if let Some(unit) = NalUnit::new(payload) {
            units.push(unit);
        }
    }

    units
}

/// Positions of every `00 00 01` start code as (code offset, payload offset).
fn find_start_codes(data: &[u8]) -> Vec<(usize, usize)> {
    let mut starts = Vec::new();
    let mut i = 0;
    while i + 3 <= data.len() {
        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            starts.push((i, i + 3));
            i += 3;
        } else {
            i += 1;
        }
    }
    starts
}

fn trim_trailing_zeros(data: &[u8]) -> &[u8] {
    let end = data.iter().rposition(|&b| b != 0).map_or(0, |p| p + 1);
    &data[..end]
}

/// Select the SPS and PPS used to build the decoder configuration.
///
/// Every unit in the stream is scanned. Under [`ParameterSetPolicy::LastWins`]
/// the last SPS and the last PPS are returned; under
/// [`ParameterSetPolicy::Strict`] a repeated unit must be byte-identical to
/// the first one.
pub fn extract_parameter_sets(
    data: &[u8],
    policy: ParameterSetPolicy,
) -> Result<ParameterSets<'_>> {
    let mut sps: Option<&[u8]> = None;
    let mut pps: Option<&[u8]> = None;

    for unit in extract_nal_units(data) {
        let (slot, kind) = match unit.nal_type {
            NalUnitType::Sps => (&mut sps, ParameterSetKind::Sps),
            NalUnitType::Pps => (&mut pps, ParameterSetKind::Pps),
            _ => continue,
        };
        if policy == ParameterSetPolicy::Strict {
            if let Some(previous) = *slot {
                if previous != unit.data {
                    return Err(Error::ConflictingParameterSets(kind));
                }
            }
        }
        *slot = Some(unit.data);
    }

    Ok(ParameterSets {
        sps: sps.ok_or(Error::MissingParameterSet(ParameterSetKind::Sps))?,
        pps: pps.ok_or(Error::MissingParameterSet(ParameterSetKind::Pps))?,
    })
}

/// Convert an Annex-B byte stream to a sample with 4-byte NAL lengths.
pub fn annex_b_to_length_prefixed(data: &[u8]) -> Vec<u8> {
    let units = extract_nal_units(data);
    let total: usize = units.iter().map(|u| 4 + u.data.len()).sum();
    let mut out = Vec::with_capacity(total);
    for unit in &units {
        out.put_u32(unit.data.len() as u32);
        out.put_slice(unit.data);
    }
    out
}

/// Split a sample with 4-byte NAL lengths into its NAL units.
pub fn split_length_prefixed(sample: &[u8]) -> Result<Vec<&[u8]>> {
    let mut nalus = Vec::new();
    let mut pos = 0usize;
    while pos < sample.len() {
        if pos + 4 > sample.len() {
            return Err(Error::InvalidBitstream(format!(
                "truncated length field at offset {}",
                pos
            )));
        }
        let len = u32::from_be_bytes([
            sample[pos],
            sample[pos + 1],
            sample[pos + 2],
            sample[pos + 3],
        ]) as usize;
        pos += 4;
        if len > sample.len() - pos {
            return Err(Error::InvalidBitstream(format!(
                "NAL unit of {} bytes at offset {} overruns sample of {} bytes",
                len,
                pos,
                sample.len()
            )));
        }
        nalus.push(&sample[pos..pos + len]);
        pos += len;
    }
    Ok(nalus)
}

/// Replace 4-byte lengths in a sample with 4-byte Annex-B start codes.
pub fn length_prefixed_to_annex_b(sample: &[u8]) -> Result<Vec<u8>> {
    let nalus = split_length_prefixed(sample)?;
    let mut out = Vec::with_capacity(sample.len());
    for nalu in nalus {
        out.put_slice(&[0, 0, 0, 1]);
        out.put_slice(nalu);
    }
    Ok(out)
}

/// Remove emulation prevention bytes (the `03` in `00 00 03`).
pub fn remove_emulation_prevention(data: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(data.len());
    let mut zeros = 0usize;

    for &byte in data {
        if zeros >= 2 && byte == 0x03 {
            zeros = 0;
            continue;
        }
        if byte == 0 {
            zeros += 1;
        } else {
            zeros = 0;
        }
        result.push(byte);
    }

    result
}
