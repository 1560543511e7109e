//! Parse init and media segments back into summaries.
//!
//! Used to verify muxer output and by the CLI `inspect` command. The parser
//! walks the box tree of a complete in-memory segment; it accepts the general
//! ISO BMFF encodings (version 0/1 headers, optional `tfhd`/`trun` fields),
//! not only what this crate writes.

use std::path::Path;

use crate::avcc::AvcDecoderConfig;
use crate::error::{Error, Result};

/// A box located inside a buffer.
#[derive(Debug, Clone, Copy)]
pub struct BoxRef<'a> {
    /// 4-byte box type (e.g. `*b"moov"`).
    pub box_type: [u8; 4],
    /// Offset of the box header relative to the parsed buffer.
    pub offset: usize,
    /// Header size (8, or 16 for 64-bit sizes).
    pub header_size: usize,
    /// Box content (after the header).
    pub content: &'a [u8],
}

impl BoxRef<'_> {
    /// Total size including the header.
    pub fn size(&self) -> usize {
        self.header_size + self.content.len()
    }

    /// Offset of the first content byte.
    pub fn content_offset(&self) -> usize {
        self.offset + self.header_size
    }

    /// Box type as text, e.g. `"moov"`.
    pub fn type_str(&self) -> String {
        fourcc(&self.box_type)
    }
}

/// Summary of an initialization segment.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct InitSegmentInfo {
    pub major_brand: String,
    pub compatible_brands: Vec<String>,
    /// Number of `trak` boxes in `moov`.
    pub track_count: usize,
    pub track_id: u32,
    pub next_track_id: u32,
    pub timescale: u32,
    pub language: String,
    pub handler_type: String,
    pub handler_name: String,
    /// Sample entry type, e.g. `avc1`.
    pub sample_entry: String,
    pub width: u16,
    pub height: u16,
    /// Decoder configuration from `avcC`.
    pub avcc: AvcDecoderConfig,
}

impl InitSegmentInfo {
    /// RFC 6381 codec string for the track.
    pub fn codec_string(&self) -> String {
        self.avcc.codec_string()
    }
}

/// One `trun` entry, with `tfhd` defaults applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct TrunSampleInfo {
    pub duration: u32,
    pub size: u32,
    pub flags: u32,
    pub composition_offset: i32,
}

impl TrunSampleInfo {
    /// `sample_is_non_sync_sample` is clear.
    pub fn is_sync(&self) -> bool {
        self.flags & 0x0001_0000 == 0
    }
}

/// Summary of a media segment.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct MediaSegmentInfo {
    /// Major brand of a leading `styp`, if any.
    pub styp_brand: Option<String>,
    pub sequence_number: u32,
    pub track_id: u32,
    pub base_decode_time: u64,
    /// `trun` data offset relative to the start of `moof`.
    pub data_offset: Option<i32>,
    /// Offset of the `moof` box in the segment.
    pub moof_offset: usize,
    pub samples: Vec<TrunSampleInfo>,
    /// Offset of the first `mdat` payload byte in the segment.
    pub mdat_offset: usize,
    /// `mdat` payload length.
    pub mdat_size: usize,
}

impl MediaSegmentInfo {
    /// Sum of sample durations in ticks.
    pub fn total_duration(&self) -> u64 {
        self.samples.iter().map(|s| s.duration as u64).sum()
    }

    /// The `mdat` payload of `segment` (the buffer this summary came from).
    pub fn mdat_payload<'a>(&self, segment: &'a [u8]) -> &'a [u8] {
        &segment[self.mdat_offset..self.mdat_offset + self.mdat_size]
    }

    /// Absolute offset of the first sample byte, if `trun` carries one.
    pub fn first_sample_offset(&self) -> Option<usize> {
        let offset = self.data_offset?;
        usize::try_from(offset).ok().map(|o| self.moof_offset + o)
    }
}

/// Either kind of segment.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "serialize", serde(tag = "kind", rename_all = "snake_case"))]
pub enum SegmentInfo {
    Init(InitSegmentInfo),
    Media(MediaSegmentInfo),
}

/// Detect the segment kind from its first box and parse it.
pub fn parse_segment(data: &[u8]) -> Result<SegmentInfo> {
    let first = read_boxes(data, 0)?
        .into_iter()
        .next()
        .ok_or_else(|| Error::invalid_mp4("empty buffer"))?;
    match &first.box_type {
        b"ftyp" | b"moov" => parse_init_segment(data).map(SegmentInfo::Init),
        b"styp" | b"moof" => parse_media_segment(data).map(SegmentInfo::Media),
        other => Err(Error::invalid_mp4(format!(
            "unexpected leading box '{}'",
            fourcc(other)
        ))),
    }
}

/// Read a file and parse it with [`parse_segment`].
pub fn inspect_file(path: impl AsRef<Path>) -> Result<SegmentInfo> {
    let data = std::fs::read(path)?;
    parse_segment(&data)
}

/// Parse an initialization segment.
pub fn parse_init_segment(data: &[u8]) -> Result<InitSegmentInfo> {
    let top = read_boxes(data, 0)?;

    let ftyp = find(&top, b"ftyp")?;
    let mut reader = FieldReader::new(ftyp.content, "ftyp");
    let major_brand = fourcc(&reader.fourcc()?);
    reader.u32()?; // minor_version
    let mut compatible_brands = Vec::new();
    while reader.remaining() >= 4 {
        compatible_brands.push(fourcc(&reader.fourcc()?));
    }

    let moov = find(&top, b"moov")?;
    let moov_children = read_boxes(moov.content, moov.content_offset())?;
    let next_track_id = parse_mvhd(find(&moov_children, b"mvhd")?)?;

    let traks: Vec<&BoxRef> = moov_children
        .iter()
        .filter(|b| &b.box_type == b"trak")
        .collect();
    let trak = traks
        .first()
        .ok_or_else(|| Error::invalid_mp4("moov has no trak"))?;
    let trak_children = read_boxes(trak.content, trak.content_offset())?;
    let track_id = parse_tkhd(find(&trak_children, b"tkhd")?)?;

    let mdia = find(&trak_children, b"mdia")?;
    let mdia_children = read_boxes(mdia.content, mdia.content_offset())?;
    let (timescale, language) = parse_mdhd(find(&mdia_children, b"mdhd")?)?;
    let (handler_type, handler_name) = parse_hdlr(find(&mdia_children, b"hdlr")?)?;

    let minf = find(&mdia_children, b"minf")?;
    let minf_children = read_boxes(minf.content, minf.content_offset())?;
    let stbl = find(&minf_children, b"stbl")?;
    let stbl_children = read_boxes(stbl.content, stbl.content_offset())?;
    let (entry_type, width, height, avcc) = parse_stsd(find(&stbl_children, b"stsd")?)?;

    Ok(InitSegmentInfo {
        major_brand,
        compatible_brands,
        track_count: traks.len(),
        track_id,
        next_track_id,
        timescale,
        language,
        handler_type,
        handler_name,
        sample_entry: entry_type,
        width,
        height,
        avcc,
    })
}

/// Parse a media segment holding one `moof` (one `traf`) and one `mdat`.
pub fn parse_media_segment(data: &[u8]) -> Result<MediaSegmentInfo> {
    let top = read_boxes(data, 0)?;

    let styp_brand = match top.iter().find(|b| &b.box_type == b"styp") {
        Some(styp) => Some(fourcc(&FieldReader::new(styp.content, "styp").fourcc()?)),
        None => None,
    };

    let moof = find(&top, b"moof")?;
    let moof_children = read_boxes(moof.content, moof.content_offset())?;

    let mut mfhd = FieldReader::new(find(&moof_children, b"mfhd")?.content, "mfhd");
    mfhd.fullbox_header()?;
    let sequence_number = mfhd.u32()?;

    let traf = find(&moof_children, b"traf")?;
    let traf_children = read_boxes(traf.content, traf.content_offset())?;
    let defaults = parse_tfhd(find(&traf_children, b"tfhd")?)?;

    let base_decode_time = match traf_children.iter().find(|b| &b.box_type == b"tfdt") {
        Some(tfdt) => {
            let mut reader = FieldReader::new(tfdt.content, "tfdt");
            let (version, _) = reader.fullbox_header()?;
            if version == 1 {
                reader.u64()?
            } else {
                reader.u32()? as u64
            }
        }
        None => 0,
    };

    let (data_offset, samples) = match traf_children.iter().find(|b| &b.box_type == b"trun") {
        Some(trun) => parse_trun(trun, &defaults)?,
        None => (None, Vec::new()),
    };

    let mdat = find(&top, b"mdat")?;

    Ok(MediaSegmentInfo {
        styp_brand,
        sequence_number,
        track_id: defaults.track_id,
        base_decode_time,
        data_offset,
        moof_offset: moof.offset,
        samples,
        mdat_offset: mdat.content_offset(),
        mdat_size: mdat.content.len(),
    })
}

/// Split `data` into sibling boxes. `base` is the absolute offset of `data`.
pub fn read_boxes(data: &[u8], base: usize) -> Result<Vec<BoxRef<'_>>> {
    let mut boxes = Vec::new();
    let mut pos = 0usize;

    while pos < data.len() {
        let mut reader = FieldReader::new(&data[pos..], "box header");
        let size32 = reader.u32()?;
        let box_type = reader.fourcc()?;

        let (size, header_size) = match size32 {
            // extends to the end of the enclosing buffer
            0 => ((data.len() - pos) as u64, 8usize),
            1 => (reader.u64()?, 16usize),
            n => (n as u64, 8usize),
        };
        if size < header_size as u64 || size > (data.len() - pos) as u64 {
            return Err(Error::invalid_mp4(format!(
                "box '{}' at offset {} has invalid size {}",
                fourcc(&box_type),
                base + pos,
                size
            )));
        }
        let size = size as usize;

        boxes.push(BoxRef {
            box_type,
            offset: base + pos,
            header_size,
            content: &data[pos + header_size..pos + size],
        });
        pos += size;
    }

    Ok(boxes)
}

/// Unpack the 15-bit `mdhd` language field.
pub fn unpack_language(packed: u16) -> String {
    [10u16, 5, 0]
        .iter()
        .map(|shift| (((packed >> shift) & 0x1F) as u8 + 0x60) as char)
        .collect()
}

fn fourcc(code: &[u8; 4]) -> String {
    String::from_utf8_lossy(code).into_owned()
}

fn find<'a, 'b>(boxes: &'b [BoxRef<'a>], box_type: &[u8; 4]) -> Result<&'b BoxRef<'a>> {
    boxes
        .iter()
        .find(|b| &b.box_type == box_type)
        .ok_or_else(|| Error::invalid_mp4(format!("missing '{}' box", fourcc(box_type))))
}

// ---------------------------------------------------------------------------
// Box parsers
// ---------------------------------------------------------------------------

/// Returns `next_track_ID`.
fn parse_mvhd(mvhd: &BoxRef) -> Result<u32> {
    let mut reader = FieldReader::new(mvhd.content, "mvhd");
    let (version, _) = reader.fullbox_header()?;
    // times, timescale, duration
    reader.skip(if version == 1 { 28 } else { 16 })?;
    // rate, volume, reserved, matrix, pre_defined
    reader.skip(4 + 2 + 10 + 36 + 24)?;
    reader.u32()
}

/// Returns the track ID.
fn parse_tkhd(tkhd: &BoxRef) -> Result<u32> {
    let mut reader = FieldReader::new(tkhd.content, "tkhd");
    let (version, _) = reader.fullbox_header()?;
    reader.skip(if version == 1 { 16 } else { 8 })?;
    reader.u32()
}

/// Returns (timescale, language).
fn parse_mdhd(mdhd: &BoxRef) -> Result<(u32, String)> {
    let mut reader = FieldReader::new(mdhd.content, "mdhd");
    let (version, _) = reader.fullbox_header()?;
    reader.skip(if version == 1 { 16 } else { 8 })?;
    let timescale = reader.u32()?;
    reader.skip(if version == 1 { 8 } else { 4 })?;
    let language = unpack_language(reader.u16()?);
    Ok((timescale, language))
}

/// Returns (handler type, name).
fn parse_hdlr(hdlr: &BoxRef) -> Result<(String, String)> {
    let mut reader = FieldReader::new(hdlr.content, "hdlr");
    reader.fullbox_header()?;
    reader.u32()?; // pre_defined
    let handler_type = fourcc(&reader.fourcc()?);
    reader.skip(12)?;
    let rest = reader.rest();
    let name_end = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
    let name = String::from_utf8_lossy(&rest[..name_end]).into_owned();
    Ok((handler_type, name))
}

/// Returns (entry type, width, height, avcC) for the first sample entry.
fn parse_stsd(stsd: &BoxRef) -> Result<(String, u16, u16, AvcDecoderConfig)> {
    let mut reader = FieldReader::new(stsd.content, "stsd");
    reader.fullbox_header()?;
    let entry_count = reader.u32()?;
    if entry_count == 0 {
        return Err(Error::invalid_mp4("stsd has no sample entries"));
    }
    let entry_base = stsd.content_offset() + 8;
    let entries = read_boxes(reader.rest(), entry_base)?;
    let entry = entries
        .first()
        .ok_or_else(|| Error::invalid_mp4("stsd has no sample entries"))?;

    let entry_type = entry.type_str();
    if !matches!(&entry.box_type, b"avc1" | b"avc3") {
        return Err(Error::invalid_mp4(format!(
            "unsupported sample entry '{}'",
            entry_type
        )));
    }

    // VisualSampleEntry: 24 bytes before width/height, 78 bytes in total
    let mut visual = FieldReader::new(entry.content, "avc1");
    visual.skip(24)?;
    let width = visual.u16()?;
    let height = visual.u16()?;
    visual.skip(78 - 28)?;

    let children = read_boxes(visual.rest(), entry.content_offset() + 78)?;
    let avcc = AvcDecoderConfig::parse(find(&children, b"avcC")?.content)?;

    Ok((entry_type, width, height, avcc))
}

/// `tfhd` values that fill in absent `trun` fields.
struct TrackFragmentDefaults {
    track_id: u32,
    duration: u32,
    size: u32,
    flags: u32,
}

fn parse_tfhd(tfhd: &BoxRef) -> Result<TrackFragmentDefaults> {
    let mut reader = FieldReader::new(tfhd.content, "tfhd");
    let (_, flags) = reader.fullbox_header()?;
    let track_id = reader.u32()?;
    if flags & 0x01 != 0 {
        reader.u64()?; // base_data_offset
    }
    if flags & 0x02 != 0 {
        reader.u32()?; // sample_description_index
    }
    let duration = if flags & 0x08 != 0 { reader.u32()? } else { 0 };
    let size = if flags & 0x10 != 0 { reader.u32()? } else { 0 };
    let sample_flags = if flags & 0x20 != 0 { reader.u32()? } else { 0 };
    Ok(TrackFragmentDefaults {
        track_id,
        duration,
        size,
        flags: sample_flags,
    })
}

/// Most `trun` entries accepted when every field comes from `tfhd` defaults.
const MAX_DEFAULTED_SAMPLES: usize = 1 << 16;

fn parse_trun(
    trun: &BoxRef,
    defaults: &TrackFragmentDefaults,
) -> Result<(Option<i32>, Vec<TrunSampleInfo>)> {
    let mut reader = FieldReader::new(trun.content, "trun");
    let (version, flags) = reader.fullbox_header()?;
    let count = reader.u32()? as usize;
    let data_offset = if flags & 0x001 != 0 {
        Some(reader.i32()?)
    } else {
        None
    };
    let first_sample_flags = if flags & 0x004 != 0 {
        Some(reader.u32()?)
    } else {
        None
    };

    let entry_size = [0x100, 0x200, 0x400, 0x800]
        .iter()
        .filter(|&&bit| flags & bit != 0)
        .count()
        * 4;
    if count.saturating_mul(entry_size) > reader.remaining() {
        return Err(Error::invalid_mp4(format!(
            "trun declares {} samples but holds {} bytes",
            count,
            reader.remaining()
        )));
    }

    if entry_size == 0 && count > MAX_DEFAULTED_SAMPLES {
        return Err(Error::invalid_mp4(format!(
            "trun declares {} samples without per-sample fields",
            count
        )));
    }

    let mut samples = Vec::with_capacity(count.min(reader.remaining() / entry_size.max(1)));
    for i in 0..count {
        let duration = if flags & 0x100 != 0 {
            reader.u32()?
        } else {
            defaults.duration
        };
        let size = if flags & 0x200 != 0 {
            reader.u32()?
        } else {
            defaults.size
        };
        let sample_flags = if flags & 0x400 != 0 {
            reader.u32()?
        } else if i == 0 {
            first_sample_flags.unwrap_or(defaults.flags)
        } else {
            defaults.flags
        };
        let composition_offset = if flags & 0x800 != 0 {
            if version == 0 {
                // unsigned in version 0
                reader.u32()? as i32
            } else {
                reader.i32()?
            }
        } else {
            0
        };
        samples.push(TrunSampleInfo {
            duration,
            size,
            flags: sample_flags,
            composition_offset,
        });
    }

    Ok((data_offset, samples))
}

/// Big-endian field reader over one box's content.
struct FieldReader<'a> {
    data: &'a [u8],
    pos: usize,
    context: &'static str,
}

impl<'a> FieldReader<'a> {
    fn new(data: &'a [u8], context: &'static str) -> Self {
        Self {
            data,
            pos: 0,
            context,
        }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(Error::invalid_mp4(format!(
                "{} truncated: need {} bytes at offset {}, have {}",
                self.context,
                n,
                self.pos,
                self.remaining()
            )));
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn skip(&mut self, n: usize) -> Result<()> {
        self.take(n).map(|_| ())
    }

    fn rest(&mut self) -> &'a [u8] {
        let out = &self.data[self.pos..];
        self.pos = self.data.len();
        out
    }

    fn fourcc(&mut self) -> Result<[u8; 4]> {
        let b = self.take(4)?;
        Ok([b[0], b[1], b[2], b[3]])
    }

    fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.fourcc()?))
    }

    fn i32(&mut self) -> Result<i32> {
        Ok(i32::from_be_bytes(self.fourcc()?))
    }

    fn u64(&mut self) -> Result<u64> {
        let b = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(b);
        Ok(u64::from_be_bytes(buf))
    }

    /// (version, flags)
    fn fullbox_header(&mut self) -> Result<(u8, u32)> {
        let val = self.u32()?;
        Ok(((val >> 24) as u8, val & 0x00FF_FFFF))
    }
}
