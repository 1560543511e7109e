//! ISO BMFF box encoders.
//!
//! Each box is `size (u32 BE) | type (4 ASCII bytes) | content`. Only the
//! boxes an AVC init segment and a single-track fragment need are covered.

use bytes::BufMut;

use crate::avcc::AvcDecoderConfig;

/// Sample flags for a sync sample (`sample_depends_on = 2`).
pub const SYNC_SAMPLE_FLAGS: u32 = 0x0200_0000;
/// Sample flags for a non-sync sample (`sample_depends_on = 1`, `is_non_sync`).
pub const NON_SYNC_SAMPLE_FLAGS: u32 = 0x0101_0000;

/// `tfhd` default-base-is-moof.
pub const TFHD_DEFAULT_BASE_IS_MOOF: u32 = 0x02_0000;

/// `trun` flags: data offset, then duration, size, flags and composition
/// offset per sample.
pub const TRUN_DATA_OFFSET: u32 = 0x00_0001;
pub const TRUN_SAMPLE_DURATION: u32 = 0x00_0100;
pub const TRUN_SAMPLE_SIZE: u32 = 0x00_0200;
pub const TRUN_SAMPLE_FLAGS: u32 = 0x00_0400;
pub const TRUN_SAMPLE_CTO: u32 = 0x00_0800;

const IDENTITY_MATRIX: [u32; 9] = [
    0x0001_0000,
    0,
    0,
    0,
    0x0001_0000,
    0,
    0,
    0,
    0x4000_0000,
];

// ---------------------------------------------------------------------------
// Primitives
// ---------------------------------------------------------------------------

/// Box with opaque content.
pub(crate) fn write_box(box_type: &[u8; 4], content: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + content.len());
    out.put_u32((8 + content.len()) as u32);
    out.put_slice(box_type);
    out.put_slice(content);
    out
}

/// Container box whose content is its children, in order.
pub(crate) fn write_container_box(box_type: &[u8; 4], children: &[&[u8]]) -> Vec<u8> {
    let len: usize = children.iter().map(|c| c.len()).sum();
    let mut out = Vec::with_capacity(8 + len);
    out.put_u32((8 + len) as u32);
    out.put_slice(box_type);
    for child in children {
        out.put_slice(child);
    }
    out
}

/// Version (8 bits) and flags (24 bits) of a full box.
pub(crate) fn put_fullbox_header(out: &mut Vec<u8>, version: u8, flags: u32) {
    out.put_u32(((version as u32) << 24) | (flags & 0x00FF_FFFF));
}

fn put_matrix(out: &mut Vec<u8>) {
    for value in IDENTITY_MATRIX {
        out.put_u32(value);
    }
}

/// Pack an ISO-639-2/T code into the 15-bit `mdhd` language field.
pub fn pack_language(code: &[u8; 3]) -> u16 {
    code.iter()
        .fold(0u16, |acc, &c| (acc << 5) | (c.wrapping_sub(0x60) as u16 & 0x1F))
}

// ---------------------------------------------------------------------------
// File and segment type
// ---------------------------------------------------------------------------

fn write_brands(
    box_type: &[u8; 4],
    major: &[u8; 4],
    minor: u32,
    compatible: &[&[u8; 4]],
) -> Vec<u8> {
    let mut content = Vec::with_capacity(8 + 4 * compatible.len());
    content.put_slice(major);
    content.put_u32(minor);
    for brand in compatible {
        content.put_slice(*brand);
    }
    write_box(box_type, &content)
}

/// `ftyp`: major `iso6`, minor 0, compatible `iso6`, `dash`.
pub(crate) fn write_ftyp() -> Vec<u8> {
    write_brands(b"ftyp", b"iso6", 0, &[b"iso6", b"dash"])
}

/// `styp`: major `msdh`, minor 0, compatible `msdh`, `msix`.
pub(crate) fn write_styp() -> Vec<u8> {
    write_brands(b"styp", b"msdh", 0, &[b"msdh", b"msix"])
}

// ---------------------------------------------------------------------------
// Movie and track headers
// ---------------------------------------------------------------------------

/// `mvhd` v1 with zero duration.
pub(crate) fn write_mvhd(timescale: u32, next_track_id: u32) -> Vec<u8> {
    let mut content = Vec::with_capacity(112);
    put_fullbox_header(&mut content, 1, 0);
    content.put_u64(0); // creation_time
    content.put_u64(0); // modification_time
    content.put_u32(timescale);
    content.put_u64(0); // duration
    content.put_u32(0x0001_0000); // rate 1.0
    content.put_u16(0x0100); // volume 1.0
    content.put_bytes(0, 10);
    put_matrix(&mut content);
    content.put_bytes(0, 24); // pre_defined
    content.put_u32(next_track_id);
    write_box(b"mvhd", &content)
}

/// `tkhd` v1, flags enabled | in_movie | in_preview, zero volume.
pub(crate) fn write_tkhd(track_id: u32, width: u32, height: u32) -> Vec<u8> {
    let mut content = Vec::with_capacity(96);
    put_fullbox_header(&mut content, 1, 0x000007);
    content.put_u64(0); // creation_time
    content.put_u64(0); // modification_time
    content.put_u32(track_id);
    content.put_u32(0);
    content.put_u64(0); // duration
    content.put_bytes(0, 8);
    content.put_u16(0); // layer
    content.put_u16(0); // alternate_group
    content.put_u16(0); // volume
    content.put_u16(0);
    put_matrix(&mut content);
    // 16.16 fixed point
    content.put_u32(width << 16);
    content.put_u32(height << 16);
    write_box(b"tkhd", &content)
}

/// `mdhd` v1 with zero duration.
pub(crate) fn write_mdhd(timescale: u32, language: u16) -> Vec<u8> {
    let mut content = Vec::with_capacity(36);
    put_fullbox_header(&mut content, 1, 0);
    content.put_u64(0);
    content.put_u64(0);
    content.put_u32(timescale);
    content.put_u64(0);
    content.put_u16(language & 0x7FFF);
    content.put_u16(0);
    write_box(b"mdhd", &content)
}

/// `hdlr` with a null-terminated name.
pub(crate) fn write_hdlr(handler_type: &[u8; 4], name: &str) -> Vec<u8> {
    let mut content = Vec::with_capacity(25 + name.len());
    put_fullbox_header(&mut content, 0, 0);
    content.put_u32(0); // pre_defined
    content.put_slice(handler_type);
    content.put_bytes(0, 12);
    content.put_slice(name.as_bytes());
    content.put_u8(0);
    write_box(b"hdlr", &content)
}

// ---------------------------------------------------------------------------
// Media information
// ---------------------------------------------------------------------------

pub(crate) fn write_vmhd() -> Vec<u8> {
    let mut content = Vec::with_capacity(12);
    put_fullbox_header(&mut content, 0, 1);
    content.put_u16(0); // graphicsmode
    content.put_bytes(0, 6); // opcolor
    write_box(b"vmhd", &content)
}

/// `dinf` { `dref` { `url ` (self-contained) } }
pub(crate) fn write_dinf() -> Vec<u8> {
    let mut url = Vec::with_capacity(4);
    put_fullbox_header(&mut url, 0, 1);
    let url = write_box(b"url ", &url);

    let mut dref = Vec::with_capacity(8 + url.len());
    put_fullbox_header(&mut dref, 0, 0);
    dref.put_u32(1);
    dref.put_slice(&url);
    let dref = write_box(b"dref", &dref);

    write_container_box(b"dinf", &[&dref])
}

/// Empty sample table with a zero entry count (`stts`, `stsc`, `stco`).
fn write_empty_table(box_type: &[u8; 4]) -> Vec<u8> {
    let mut content = Vec::with_capacity(8);
    put_fullbox_header(&mut content, 0, 0);
    content.put_u32(0);
    write_box(box_type, &content)
}

fn write_empty_stsz() -> Vec<u8> {
    let mut content = Vec::with_capacity(12);
    put_fullbox_header(&mut content, 0, 0);
    content.put_u32(0); // sample_size
    content.put_u32(0); // sample_count
    write_box(b"stsz", &content)
}

/// `avc1` visual sample entry carrying the `avcC` record.
pub(crate) fn write_avc1(width: u16, height: u16, avcc: &AvcDecoderConfig) -> Vec<u8> {
    let avcc = write_box(b"avcC", &avcc.encode());

    let mut entry = Vec::with_capacity(78 + avcc.len());
    entry.put_bytes(0, 6);
    entry.put_u16(1); // data_reference_index
    entry.put_bytes(0, 16);
    entry.put_u16(width);
    entry.put_u16(height);
    entry.put_u32(0x0048_0000); // 72 dpi
    entry.put_u32(0x0048_0000);
    entry.put_u32(0);
    entry.put_u16(1); // frame_count
    entry.put_bytes(0, 32); // compressorname
    entry.put_u16(0x0018); // depth
    entry.put_i16(-1);
    entry.put_slice(&avcc);
    write_box(b"avc1", &entry)
}

pub(crate) fn write_stsd(sample_entry: &[u8]) -> Vec<u8> {
    let mut content = Vec::with_capacity(8 + sample_entry.len());
    put_fullbox_header(&mut content, 0, 0);
    content.put_u32(1);
    content.put_slice(sample_entry);
    write_box(b"stsd", &content)
}

pub(crate) fn write_stbl(sample_entry: &[u8]) -> Vec<u8> {
    let stsd = write_stsd(sample_entry);
    let stts = write_empty_table(b"stts");
    let stsc = write_empty_table(b"stsc");
    let stsz = write_empty_stsz();
    let stco = write_empty_table(b"stco");
    write_container_box(b"stbl", &[&stsd, &stts, &stsc, &stsz, &stco])
}

// ---------------------------------------------------------------------------
// Movie extends
// ---------------------------------------------------------------------------

pub(crate) fn write_trex(track_id: u32) -> Vec<u8> {
    let mut content = Vec::with_capacity(24);
    put_fullbox_header(&mut content, 0, 0);
    content.put_u32(track_id);
    content.put_u32(1); // default_sample_description_index
    content.put_u32(0); // default_sample_duration
    content.put_u32(0); // default_sample_size
    content.put_u32(0); // default_sample_flags
    write_box(b"trex", &content)
}

pub(crate) fn write_mvex(track_id: u32) -> Vec<u8> {
    write_container_box(b"mvex", &[&write_trex(track_id)])
}

// ---------------------------------------------------------------------------
// Movie fragment
// ---------------------------------------------------------------------------

pub(crate) fn write_mfhd(sequence_number: u32) -> Vec<u8> {
    let mut content = Vec::with_capacity(8);
    put_fullbox_header(&mut content, 0, 0);
    content.put_u32(sequence_number);
    write_box(b"mfhd", &content)
}

pub(crate) fn write_tfhd(track_id: u32) -> Vec<u8> {
    let mut content = Vec::with_capacity(8);
    put_fullbox_header(&mut content, 0, TFHD_DEFAULT_BASE_IS_MOOF);
    content.put_u32(track_id);
    write_box(b"tfhd", &content)
}

pub(crate) fn write_tfdt(base_media_decode_time: u64) -> Vec<u8> {
    let mut content = Vec::with_capacity(12);
    put_fullbox_header(&mut content, 1, 0);
    content.put_u64(base_media_decode_time);
    write_box(b"tfdt", &content)
}

/// One `trun` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TrunEntry {
    pub duration: u32,
    pub size: u32,
    pub flags: u32,
    pub composition_offset: i32,
}

/// Size of a `trun` box carrying `count` entries.
pub(crate) fn trun_size(count: usize) -> usize {
    8 + 4 + 4 + 4 + count * 16
}

/// `trun` v1 (signed composition offsets). `data_offset` is relative to the
/// start of the enclosing `moof`.
pub(crate) fn write_trun(entries: &[TrunEntry], data_offset: i32) -> Vec<u8> {
    let flags = TRUN_DATA_OFFSET
        | TRUN_SAMPLE_DURATION
        | TRUN_SAMPLE_SIZE
        | TRUN_SAMPLE_FLAGS
        | TRUN_SAMPLE_CTO;

    let mut content = Vec::with_capacity(trun_size(entries.len()) - 8);
    put_fullbox_header(&mut content, 1, flags);
    content.put_u32(entries.len() as u32);
    content.put_i32(data_offset);
    for entry in entries {
        content.put_u32(entry.duration);
        content.put_u32(entry.size);
        content.put_u32(entry.flags);
        content.put_i32(entry.composition_offset);
    }
    write_box(b"trun", &content)
}

/// `mdat` header for `data_size` payload bytes, 64-bit form when needed.
pub(crate) fn write_mdat_header(data_size: u64) -> Vec<u8> {
    let mut hdr = Vec::with_capacity(16);
    if data_size + 8 > u32::MAX as u64 {
        hdr.put_u32(1);
        hdr.put_slice(b"mdat");
        hdr.put_u64(data_size + 16);
    } else {
        hdr.put_u32((data_size + 8) as u32);
        hdr.put_slice(b"mdat");
    }
    hdr
}
