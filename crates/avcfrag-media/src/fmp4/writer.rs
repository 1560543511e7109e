//! Init and media segment assembly.
//!
//! `write_init_segment` produces `ftyp` + `moov` for one AVC track;
//! `write_media_segment` produces an optional `styp`, then `moof` + `mdat`.

use super::boxes::{self, TrunEntry};
use crate::avcc::AvcDecoderConfig;
use crate::error::{Error, Result};

/// Track description for an init segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackConfig {
    /// Track ID, shared with every fragment.
    pub track_id: u32,
    /// Media timescale (ticks per second).
    pub timescale: u32,
    /// ISO-639-2/T language code.
    pub language: [u8; 3],
    /// Handler name written to `hdlr`.
    pub name: String,
    /// Picture width in pixels.
    pub width: u32,
    /// Picture height in pixels.
    pub height: u32,
    /// Decoder configuration carried in `avcC`.
    pub avcc: AvcDecoderConfig,
}

/// One sample of a media segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleInfo {
    /// Length-prefixed NAL units.
    pub data: Vec<u8>,
    /// Duration in timescale ticks.
    pub duration: u32,
    /// Random access point.
    pub is_sync: bool,
    /// Composition time offset in ticks.
    pub composition_offset: i32,
}

/// Per-fragment header values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentConfig {
    pub sequence_number: u32,
    pub track_id: u32,
    /// `tfdt` base media decode time in ticks.
    pub base_decode_time: u64,
    /// Lead the segment with an `styp` box.
    pub emit_styp: bool,
}

/// Generate an initialization segment (`ftyp` + `moov`).
pub fn write_init_segment(config: &TrackConfig) -> Result<Vec<u8>> {
    if config.track_id == 0 {
        return Err(Error::invalid_config("track ID must be non-zero"));
    }
    if config.timescale == 0 {
        return Err(Error::invalid_config("timescale must be non-zero"));
    }
    let (width, height) = match (u16::try_from(config.width), u16::try_from(config.height)) {
        (Ok(w), Ok(h)) => (w, h),
        _ => {
            return Err(Error::Serialization(format!(
                "picture size {}x{} does not fit the sample entry",
                config.width, config.height
            )))
        }
    };
    let next_track_id = config
        .track_id
        .checked_add(1)
        .ok_or_else(|| Error::invalid_config("track ID leaves no next_track_ID"))?;

    let ftyp = boxes::write_ftyp();

    let avc1 = boxes::write_avc1(width, height, &config.avcc);
    let stbl = boxes::write_stbl(&avc1);
    let minf = boxes::write_container_box(
        b"minf",
        &[&boxes::write_vmhd(), &boxes::write_dinf(), &stbl],
    );
    let mdhd = boxes::write_mdhd(config.timescale, boxes::pack_language(&config.language));
    let hdlr = boxes::write_hdlr(b"vide", &config.name);
    let mdia = boxes::write_container_box(b"mdia", &[&mdhd, &hdlr, &minf]);
    let tkhd = boxes::write_tkhd(config.track_id, config.width, config.height);
    let trak = boxes::write_container_box(b"trak", &[&tkhd, &mdia]);

    let mvhd = boxes::write_mvhd(config.timescale, next_track_id);
    let mvex = boxes::write_mvex(config.track_id);
    let moov = boxes::write_container_box(b"moov", &[&mvhd, &trak, &mvex]);

    let mut result = Vec::with_capacity(ftyp.len() + moov.len());
    result.extend_from_slice(&ftyp);
    result.extend_from_slice(&moov);
    Ok(result)
}

/// Generate a media segment: optional `styp`, then `moof` + `mdat`.
///
/// The `trun` data offset is measured from the start of `moof` (the `tfhd`
/// uses default-base-is-moof), so it does not depend on `styp`.
pub fn write_media_segment(fragment: &FragmentConfig, samples: &[SampleInfo]) -> Result<Vec<u8>> {
    if fragment.track_id == 0 {
        return Err(Error::invalid_config("track ID must be non-zero"));
    }

    let entries = samples
        .iter()
        .map(|s| {
            let size = u32::try_from(s.data.len()).map_err(|_| {
                Error::Serialization(format!(
                    "sample of {} bytes exceeds the 32-bit size field",
                    s.data.len()
                ))
            })?;
            Ok(TrunEntry {
                duration: s.duration,
                size,
                flags: if s.is_sync {
                    boxes::SYNC_SAMPLE_FLAGS
                } else {
                    boxes::NON_SYNC_SAMPLE_FLAGS
                },
                composition_offset: s.composition_offset,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mfhd = boxes::write_mfhd(fragment.sequence_number);
    let tfhd = boxes::write_tfhd(fragment.track_id);
    let tfdt = boxes::write_tfdt(fragment.base_decode_time);

    let total_data_size: u64 = samples.iter().map(|s| s.data.len() as u64).sum();
    let mdat_hdr = boxes::write_mdat_header(total_data_size);

    // moof = header + mfhd + traf(header + tfhd + tfdt + trun)
    let traf_size = 8 + tfhd.len() + tfdt.len() + boxes::trun_size(entries.len());
    let moof_size = 8 + mfhd.len() + traf_size;
    let data_offset = i32::try_from(moof_size + mdat_hdr.len()).map_err(|_| {
        Error::Serialization(format!("moof of {} bytes is too large", moof_size))
    })?;

    let trun = boxes::write_trun(&entries, data_offset);
    let traf = boxes::write_container_box(b"traf", &[&tfhd, &tfdt, &trun]);
    let moof = boxes::write_container_box(b"moof", &[&mfhd, &traf]);
    debug_assert_eq!(moof.len(), moof_size);

    let styp = fragment.emit_styp.then(boxes::write_styp);
    let styp_len = styp.as_ref().map_or(0, Vec::len);

    let mut result =
        Vec::with_capacity(styp_len + moof.len() + mdat_hdr.len() + total_data_size as usize);
    if let Some(styp) = styp {
        result.extend_from_slice(&styp);
    }
    result.extend_from_slice(&moof);
    result.extend_from_slice(&mdat_hdr);
    for sample in samples {
        result.extend_from_slice(&sample.data);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sps::parse_sps;

    const SPS: &[u8] = &[0x27, 0x64, 0x00, 0x1F, 0xAC, 0x56, 0x80, 0x50, 0x05, 0xB9];
    const PPS: &[u8] = &[0x28, 0xEE, 0x3C, 0xB0];

    fn read_u32(data: &[u8], offset: usize) -> u32 {
        u32::from_be_bytes([
            data[offset],
            data[offset + 1],
            data[offset + 2],
            data[offset + 3],
        ])
    }

    fn track() -> TrackConfig {
        let sps = parse_sps(SPS).unwrap();
        TrackConfig {
            track_id: 1,
            timescale: 12800,
            language: *b"und",
            name: "video".to_string(),
            width: sps.width,
            height: sps.height,
            avcc: AvcDecoderConfig::from_parameter_sets(&sps, SPS, PPS).unwrap(),
        }
    }

    fn keyframe(len: usize) -> SampleInfo {
        SampleInfo {
            data: vec![0xAB; len],
            duration: 12800,
            is_sync: true,
            composition_offset: 0,
        }
    }

    fn fragment() -> FragmentConfig {
        FragmentConfig {
            sequence_number: 1,
            track_id: 1,
            base_decode_time: 0,
            emit_styp: false,
        }
    }

    /// Walk sibling boxes in `data[start..end]`, returning (type, offset, size).
    fn walk(data: &[u8], start: usize, end: usize) -> Vec<([u8; 4], usize, usize)> {
        let mut boxes = Vec::new();
        let mut pos = start;
        while pos + 8 <= end {
            let size = read_u32(data, pos) as usize;
            assert!(size >= 8 && pos + size <= end, "bad box at {}", pos);
            let mut box_type = [0u8; 4];
            box_type.copy_from_slice(&data[pos + 4..pos + 8]);
            boxes.push((box_type, pos, size));
            pos += size;
        }
        assert_eq!(pos, end, "boxes do not span their parent");
        boxes
    }

    #[test]
    fn test_init_segment_layout() {
        let init = write_init_segment(&track()).unwrap();
        let top = walk(&init, 0, init.len());
        assert_eq!(top.len(), 2);
        assert_eq!(&top[0].0, b"ftyp");
        assert_eq!(&top[1].0, b"moov");
        assert_eq!(init.len(), 24 + 649);

        let (_, moov_pos, moov_size) = top[1];
        let children: Vec<_> = walk(&init, moov_pos + 8, moov_pos + moov_size)
            .into_iter()
            .map(|(t, _, _)| t)
            .collect();
        assert_eq!(children, vec![*b"mvhd", *b"trak", *b"mvex"]);
    }

    #[test]
    fn test_init_segment_is_deterministic() {
        let config = track();
        assert_eq!(
            write_init_segment(&config).unwrap(),
            write_init_segment(&config).unwrap()
        );
    }

    #[test]
    fn test_init_segment_rejects_bad_config() {
        let mut config = track();
        config.track_id = 0;
        assert!(matches!(
            write_init_segment(&config),
            Err(Error::InvalidConfig(_))
        ));

        let mut config = track();
        config.width = 70_000;
        assert!(matches!(
            write_init_segment(&config),
            Err(Error::Serialization(_))
        ));
    }

    #[test]
    fn test_media_segment_layout() {
        let segment = write_media_segment(&fragment(), &[keyframe(271)]).unwrap();
        let top = walk(&segment, 0, segment.len());
        assert_eq!(&top[0].0, b"moof");
        assert_eq!(top[0].2, 104);
        assert_eq!(&top[1].0, b"mdat");
        assert_eq!(top[1].2, 8 + 271);

        // trun data offset points at the first mdat payload byte
        let data_offset = read_u32(&segment, 104 - 36 + 16) as usize;
        assert_eq!(data_offset, 112);
        assert_eq!(&segment[data_offset..data_offset + 271], &[0xAB; 271][..]);
    }

    #[test]
    fn test_media_segment_with_styp() {
        let config = FragmentConfig {
            emit_styp: true,
            ..fragment()
        };
        let segment = write_media_segment(&config, &[keyframe(10)]).unwrap();
        assert_eq!(&segment[4..8], b"styp");
        assert_eq!(&segment[24 + 4..24 + 8], b"moof");
        let data_offset = read_u32(&segment, 24 + 104 - 36 + 16) as usize;
        assert_eq!(&segment[24 + data_offset..], &[0xAB; 10][..]);
    }

    #[test]
    fn test_media_segment_multiple_samples() {
        let mut second = keyframe(50);
        second.is_sync = false;
        second.composition_offset = -512;
        let segment = write_media_segment(&fragment(), &[keyframe(100), second]).unwrap();

        let moof_size = read_u32(&segment, 0) as usize;
        assert_eq!(moof_size, 104 + 16);
        assert_eq!(read_u32(&segment, moof_size) as usize, 8 + 150);
        // flags of the second entry
        let trun_pos = moof_size - boxes::trun_size(2);
        assert_eq!(&segment[trun_pos + 4..trun_pos + 8], b"trun");
        assert_eq!(read_u32(&segment, trun_pos + 20 + 16 + 8), 0x0101_0000);
        assert_eq!(read_u32(&segment, trun_pos + 20 + 16 + 12) as i32, -512);
    }

    #[test]
    fn test_media_segment_rejects_zero_track() {
        let config = FragmentConfig {
            track_id: 0,
            ..fragment()
        };
        assert!(matches!(
            write_media_segment(&config, &[keyframe(1)]),
            Err(Error::InvalidConfig(_))
        ));
    }
}
