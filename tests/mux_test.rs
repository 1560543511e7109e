//! Integration tests for init and media segment generation.

mod common;

use avcfrag_media::inspect::{self, BoxRef, SegmentInfo};
use avcfrag_media::nal::{self, NalUnitType};
use avcfrag_media::{
    binding, create_init, create_segment, sps, Error, MuxConfig, ParameterSetKind,
    ParameterSetPolicy, StreamSession,
};
use common::{annex_b, keyframe_a, keyframe_b, PPS, SPS_BASELINE, SPS_HIGH};

const CONTAINERS: &[&[u8; 4]] = &[
    b"moov", b"trak", b"mdia", b"minf", b"dinf", b"stbl", b"mvex", b"moof", b"traf",
];

/// Check that every container's children exactly tile its payload.
fn assert_well_nested(data: &[u8], base: usize) -> usize {
    let boxes = inspect::read_boxes(data, base).unwrap();
    let covered: usize = boxes.iter().map(BoxRef::size).sum();
    assert_eq!(covered, data.len(), "boxes do not tile payload at {}", base);
    let mut count = boxes.len();
    for b in &boxes {
        if CONTAINERS.contains(&&b.box_type) {
            count += assert_well_nested(b.content, b.content_offset());
        }
    }
    count
}

// ---------------------------------------------------------------------------
// Init segments
// ---------------------------------------------------------------------------

#[test]
fn init_from_keyframe_fixture() {
    let init = create_init(&keyframe_a(), &MuxConfig::default()).unwrap();
    assert_eq!(&init[4..8], b"ftyp");

    let info = inspect::parse_init_segment(&init).unwrap();
    assert_eq!(info.major_brand, "iso6");
    assert_eq!(info.track_count, 1);
    assert_eq!(info.track_id, 1);
    assert_eq!(info.next_track_id, 2);
    assert_eq!(info.timescale, 12800);
    assert_eq!(info.language, "und");
    assert_eq!(info.handler_type, "vide");
    assert_eq!(info.sample_entry, "avc1");
    assert_eq!((info.width, info.height), (1280, 720));
    assert_eq!(info.avcc.sps, vec![SPS_HIGH.to_vec()]);
    assert_eq!(info.avcc.pps, vec![PPS.to_vec()]);
    assert_eq!(info.codec_string(), "avc1.64001f");
}

#[test]
fn init_boxes_are_well_nested() {
    let init = create_init(&keyframe_a(), &MuxConfig::default()).unwrap();
    let count = assert_well_nested(&init, 0);
    // ftyp moov mvhd trak tkhd mdia mdhd hdlr minf vmhd dinf dref stbl
    // stsd stts stsc stsz stco mvex trex
    assert_eq!(count, 20);
}

#[test]
fn init_is_independent_of_frame_payload() {
    // Both fixtures carry the same parameter sets
    let config = MuxConfig::default();
    let a = create_init(&keyframe_a(), &config).unwrap();
    let b = create_init(&keyframe_b(), &config).unwrap();
    assert_eq!(a, b);

    let bare = create_init(&annex_b(&[SPS_HIGH, PPS]), &config).unwrap();
    assert_eq!(a, bare);
}

#[test]
fn init_requires_both_parameter_sets() {
    let config = MuxConfig::default();
    let idr: &[u8] = &[0x65, 0x88, 0x84, 0x00];

    let err = create_init(&annex_b(&[PPS, idr]), &config).unwrap_err();
    assert!(matches!(err, Error::MissingParameterSet(ParameterSetKind::Sps)));

    let err = create_init(&annex_b(&[SPS_HIGH, idr]), &config).unwrap_err();
    assert!(matches!(err, Error::MissingParameterSet(ParameterSetKind::Pps)));

    let err = create_init(&[], &config).unwrap_err();
    assert!(matches!(err, Error::MissingParameterSet(_)));
}

#[test]
fn repeated_parameter_sets_last_wins() {
    let stream = annex_b(&[SPS_HIGH, PPS, SPS_BASELINE, PPS]);
    let init = create_init(&stream, &MuxConfig::default()).unwrap();
    let info = inspect::parse_init_segment(&init).unwrap();
    assert_eq!(info.avcc.sps, vec![SPS_BASELINE.to_vec()]);
    assert_eq!((info.width, info.height), (1920, 1080));
    assert_eq!(info.codec_string(), "avc1.42c028");
}

#[test]
fn repeated_parameter_sets_strict() {
    let config = MuxConfig {
        parameter_set_policy: ParameterSetPolicy::Strict,
        ..Default::default()
    };

    let conflicting = annex_b(&[SPS_HIGH, PPS, SPS_BASELINE, PPS]);
    let err = create_init(&conflicting, &config).unwrap_err();
    assert!(matches!(
        err,
        Error::ConflictingParameterSets(ParameterSetKind::Sps)
    ));

    // Identical repeats are fine
    let repeated = annex_b(&[SPS_HIGH, PPS, SPS_HIGH, PPS]);
    assert!(create_init(&repeated, &config).is_ok());
}

#[test]
fn init_honors_track_settings() {
    let config = MuxConfig {
        timescale: 90000,
        track_id: 3,
        language: "eng".to_string(),
        track_name: "camera".to_string(),
        ..Default::default()
    };
    let init = create_init(&keyframe_a(), &config).unwrap();
    let info = inspect::parse_init_segment(&init).unwrap();
    assert_eq!(info.timescale, 90000);
    assert_eq!(info.track_id, 3);
    assert_eq!(info.next_track_id, 4);
    assert_eq!(info.language, "eng");
    assert_eq!(info.handler_name, "camera");
}

// ---------------------------------------------------------------------------
// Media segments
// ---------------------------------------------------------------------------

#[test]
fn segment_from_keyframe_fixture() {
    let frame = keyframe_b();
    let segment = create_segment(&frame, 0, 1, &MuxConfig::default()).unwrap();
    assert_eq!(&segment[4..8], b"moof");

    let info = inspect::parse_media_segment(&segment).unwrap();
    assert_eq!(info.styp_brand, None);
    assert_eq!(info.sequence_number, 1);
    assert_eq!(info.track_id, 1);
    assert_eq!(info.base_decode_time, 0);
    assert_eq!(info.samples.len(), 1);

    let sample = &info.samples[0];
    assert_eq!(sample.duration, 12800);
    assert_eq!(sample.size, 274);
    assert_eq!(sample.composition_offset, 0);
    assert!(sample.is_sync());

    assert_eq!(info.mdat_size, 274);
    assert_eq!(
        info.first_sample_offset(),
        Some(info.mdat_offset),
        "data offset must point at the first mdat payload byte"
    );
    assert_eq!(
        info.mdat_payload(&segment),
        nal::annex_b_to_length_prefixed(&frame).as_slice()
    );
}

#[test]
fn segment_boxes_are_well_nested() {
    let segment = create_segment(&keyframe_b(), 0, 1, &MuxConfig::default()).unwrap();
    // moof mfhd traf tfhd tfdt trun mdat
    assert_eq!(assert_well_nested(&segment, 0), 7);
}

#[test]
fn segment_decode_time_scales_with_timestamp() {
    let config = MuxConfig::default();
    for ts in [0u64, 1, 2, 60, 3600] {
        let segment = create_segment(&keyframe_b(), ts, 2, &config).unwrap();
        let info = inspect::parse_media_segment(&segment).unwrap();
        assert_eq!(info.base_decode_time, ts * 12800);
        assert_eq!(info.total_duration(), 2 * 12800);
    }
}

#[test]
fn segment_with_zero_duration() {
    let frame = keyframe_b();
    let segment = create_segment(&frame, 0, 0, &MuxConfig::default()).unwrap();

    let info = inspect::parse_media_segment(&segment).unwrap();
    assert_eq!(info.base_decode_time, 0);
    assert_eq!(info.samples.len(), 1);

    let sample = &info.samples[0];
    assert_eq!(sample.duration, 0);
    assert!(sample.is_sync());
    assert_eq!(
        sample.size as usize,
        nal::annex_b_to_length_prefixed(&frame).len()
    );
}

#[test]
fn segment_is_deterministic() {
    let config = MuxConfig::default();
    let a = create_segment(&keyframe_b(), 7, 1, &config).unwrap();
    let b = create_segment(&keyframe_b(), 7, 1, &config).unwrap();
    assert_eq!(a, b);
}

#[test]
fn segment_with_styp() {
    let config = MuxConfig {
        emit_styp: true,
        ..Default::default()
    };
    let segment = create_segment(&keyframe_b(), 0, 1, &config).unwrap();
    assert_eq!(&segment[4..8], b"styp");

    let info = inspect::parse_media_segment(&segment).unwrap();
    assert_eq!(info.styp_brand.as_deref(), Some("msdh"));
    assert_eq!(info.moof_offset, 24);
    assert_eq!(info.first_sample_offset(), Some(info.mdat_offset));
}

#[test]
fn segment_rejects_empty_frame() {
    let err = create_segment(&[], 0, 1, &MuxConfig::default()).unwrap_err();
    assert!(matches!(err, Error::EmptySample));
}

#[test]
fn segment_rejects_unrepresentable_duration() {
    let too_long = u64::from(u32::MAX) / 12800 + 1;
    let err = create_segment(&keyframe_b(), 0, too_long, &MuxConfig::default()).unwrap_err();
    assert!(matches!(err, Error::TimingOverflow { .. }));
}

#[test]
fn parse_segment_dispatches_on_first_box() {
    let config = MuxConfig::default();
    let init = create_init(&keyframe_a(), &config).unwrap();
    let segment = create_segment(&keyframe_b(), 0, 1, &config).unwrap();

    assert!(matches!(
        inspect::parse_segment(&init).unwrap(),
        SegmentInfo::Init(_)
    ));
    assert!(matches!(
        inspect::parse_segment(&segment).unwrap(),
        SegmentInfo::Media(_)
    ));
}

// ---------------------------------------------------------------------------
// Bitstream handling
// ---------------------------------------------------------------------------

#[test]
fn fixture_nal_structure() {
    let frame = keyframe_a();
    let units: Vec<(NalUnitType, usize)> = nal::extract_nal_units(&frame)
        .iter()
        .map(|u| (u.nal_type, u.data.len()))
        .collect();
    assert_eq!(
        units,
        vec![
            (NalUnitType::Sps, 10),
            (NalUnitType::Pps, 4),
            (NalUnitType::Sei, 30),
            (NalUnitType::IdrSlice, common::KEYFRAME_A_IDR_LEN),
        ]
    );
}

#[test]
fn length_prefixed_round_trip_preserves_units() {
    let frame = keyframe_b();
    let sample = nal::annex_b_to_length_prefixed(&frame);
    assert_eq!(sample.len(), 274);

    let original: Vec<&[u8]> = nal::extract_nal_units(&frame)
        .iter()
        .map(|u| u.data)
        .collect();
    let split = nal::split_length_prefixed(&sample).unwrap();
    assert_eq!(split, original);

    let restored = nal::length_prefixed_to_annex_b(&sample).unwrap();
    let reparsed: Vec<&[u8]> = nal::extract_nal_units(&restored)
        .iter()
        .map(|u| u.data)
        .collect();
    assert_eq!(reparsed, original);
}

#[test]
fn fixture_sps_fields() {
    let parsed = sps::parse_sps(SPS_HIGH).unwrap();
    assert_eq!(parsed.profile_idc, 100);
    assert_eq!(parsed.level_idc, 31);
    assert_eq!((parsed.width, parsed.height), (1280, 720));
}

// ---------------------------------------------------------------------------
// Sessions and binding surface
// ---------------------------------------------------------------------------

#[test]
fn session_numbers_consecutive_segments() {
    let mut session = StreamSession::new(MuxConfig::default());
    session.init(&keyframe_a()).unwrap();

    for (i, frame) in [keyframe_a(), keyframe_b(), keyframe_a()].iter().enumerate() {
        let segment = session.segment(frame, i as u64, 1).unwrap();
        let info = inspect::parse_media_segment(&segment).unwrap();
        assert_eq!(info.sequence_number, i as u32 + 1);
        assert_eq!(info.base_decode_time, i as u64 * 12800);
    }
}

#[test]
fn binding_returns_buffers_or_messages() {
    let init = binding::create_init(&keyframe_a());
    assert!(init.is_buffer());
    assert_eq!(
        init.into_result().unwrap(),
        create_init(&keyframe_a(), &MuxConfig::default()).unwrap()
    );

    let segment = binding::create_segment(&keyframe_b(), 0, 1);
    assert!(segment.is_buffer());

    let missing = binding::create_init(&annex_b(&[PPS])).into_result();
    assert!(missing.unwrap_err().contains("SPS"));

    let negative = binding::create_segment(&keyframe_b(), -1, 1).into_result();
    assert!(negative.unwrap_err().contains("non-negative"));
}
