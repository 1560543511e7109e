//! Init and segment builders over raw Annex-B input.
//!
//! Both builders are pure functions of their arguments: no state is kept
//! between calls. Callers are expected to send the init segment once, then
//! segments with increasing timestamps; [`crate::session::StreamSession`]
//! enforces that ordering when wanted.

use crate::avcc::AvcDecoderConfig;
use crate::error::{Error, Result};
use crate::fmp4::{self, FragmentConfig, SampleInfo, TrackConfig};
use crate::nal::{self, ParameterSetPolicy};
use crate::sps;

/// Default media timescale (ticks per second).
pub const DEFAULT_TIMESCALE: u32 = 12800;
/// Default track ID, shared by the init segment and every fragment.
pub const DEFAULT_TRACK_ID: u32 = 1;
/// Default `mdhd` language (undetermined).
pub const DEFAULT_LANGUAGE: &str = "und";
/// Default `hdlr` name.
pub const DEFAULT_TRACK_NAME: &str = "video";

/// Settings shared by [`create_init`] and [`create_segment`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MuxConfig {
    /// Ticks per second for every timing field.
    pub timescale: u32,
    pub track_id: u32,
    /// Three lowercase ASCII letters (ISO-639-2/T).
    pub language: String,
    pub track_name: String,
    /// `mfhd` sequence number for [`create_segment`].
    pub sequence_number: u32,
    /// Lead each segment with an `styp` box.
    pub emit_styp: bool,
    pub parameter_set_policy: ParameterSetPolicy,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            timescale: DEFAULT_TIMESCALE,
            track_id: DEFAULT_TRACK_ID,
            language: DEFAULT_LANGUAGE.to_string(),
            track_name: DEFAULT_TRACK_NAME.to_string(),
            sequence_number: 1,
            emit_styp: false,
            parameter_set_policy: ParameterSetPolicy::default(),
        }
    }
}

impl MuxConfig {
    /// Check the values every builder depends on.
    pub fn validate(&self) -> Result<()> {
        if self.timescale == 0 {
            return Err(Error::invalid_config("timescale must be non-zero"));
        }
        if self.track_id == 0 {
            return Err(Error::invalid_config("track ID must be non-zero"));
        }
        self.language_code()?;
        Ok(())
    }

    fn language_code(&self) -> Result<[u8; 3]> {
        let bytes = self.language.as_bytes();
        match <[u8; 3]>::try_from(bytes) {
            Ok(code) if code.iter().all(u8::is_ascii_lowercase) => Ok(code),
            _ => Err(Error::invalid_config(format!(
                "language '{}' is not a three-letter lowercase code",
                self.language
            ))),
        }
    }

    /// Convert whole seconds to ticks at this timescale.
    pub fn seconds_to_ticks(&self, seconds: u64) -> Option<u64> {
        seconds.checked_mul(self.timescale as u64)
    }
}

/// Build an initialization segment from a bitstream carrying SPS and PPS.
///
/// Fails with [`Error::MissingParameterSet`] when either parameter set is
/// absent and with [`Error::CodecDescription`] when the SPS cannot be parsed.
pub fn create_init(bitstream: &[u8], config: &MuxConfig) -> Result<Vec<u8>> {
    config.validate()?;

    let sets = nal::extract_parameter_sets(bitstream, config.parameter_set_policy)?;
    let sps = sps::parse_sps(sets.sps)?;
    let avcc = AvcDecoderConfig::from_parameter_sets(&sps, sets.sps, sets.pps)?;

    #[cfg(feature = "tracing")]
    tracing::debug!(
        codec = %avcc.codec_string(),
        width = sps.width,
        height = sps.height,
        timescale = config.timescale,
        "Building init segment"
    );

    let track = TrackConfig {
        track_id: config.track_id,
        timescale: config.timescale,
        language: config.language_code()?,
        name: config.track_name.clone(),
        width: sps.width,
        height: sps.height,
        avcc,
    };
    fmp4::write_init_segment(&track)
}

/// Build a media segment holding one sync sample.
///
/// `bitstream` is one access unit in Annex-B form; `timestamp` and `duration`
/// are whole seconds, scaled by `config.timescale`.
pub fn create_segment(
    bitstream: &[u8],
    timestamp: u64,
    duration: u64,
    config: &MuxConfig,
) -> Result<Vec<u8>> {
    config.validate()?;

    let data = nal::annex_b_to_length_prefixed(bitstream);
    if data.is_empty() {
        return Err(Error::EmptySample);
    }

    let duration_ticks = config
        .seconds_to_ticks(duration)
        .and_then(|ticks| u32::try_from(ticks).ok())
        .ok_or(Error::TimingOverflow {
            seconds: duration,
            timescale: config.timescale,
            field: "sample duration",
        })?;
    let decode_time = config
        .seconds_to_ticks(timestamp)
        .ok_or(Error::TimingOverflow {
            seconds: timestamp,
            timescale: config.timescale,
            field: "base media decode time",
        })?;

    #[cfg(feature = "tracing")]
    tracing::debug!(
        sequence_number = config.sequence_number,
        decode_time,
        duration_ticks,
        size = data.len(),
        "Building media segment"
    );

    let fragment = FragmentConfig {
        sequence_number: config.sequence_number,
        track_id: config.track_id,
        base_decode_time: decode_time,
        emit_styp: config.emit_styp,
    };
    let sample = SampleInfo {
        data,
        duration: duration_ticks,
        is_sync: true,
        composition_offset: 0,
    };
    fmp4::write_media_segment(&fragment, std::slice::from_ref(&sample))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParameterSetKind;

    const SPS: &[u8] = &[0x27, 0x64, 0x00, 0x1F, 0xAC, 0x56, 0x80, 0x50, 0x05, 0xB9];
    const PPS: &[u8] = &[0x28, 0xEE, 0x3C, 0xB0];
    const IDR: &[u8] = &[0x25, 0xB8, 0x20, 0x04, 0xFF];

    fn stream(units: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        for unit in units {
            out.extend_from_slice(&[0, 0, 0, 1]);
            out.extend_from_slice(unit);
        }
        out
    }

    fn read_u32(data: &[u8], offset: usize) -> u32 {
        u32::from_be_bytes([
            data[offset],
            data[offset + 1],
            data[offset + 2],
            data[offset + 3],
        ])
    }

    #[test]
    fn test_default_config() {
        let config = MuxConfig::default();
        assert_eq!(config.timescale, 12800);
        assert_eq!(config.track_id, 1);
        assert_eq!(config.language, "und");
        assert_eq!(config.sequence_number, 1);
        assert!(!config.emit_styp);
        assert_eq!(config.parameter_set_policy, ParameterSetPolicy::LastWins);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        for config in [
            MuxConfig {
                timescale: 0,
                ..Default::default()
            },
            MuxConfig {
                track_id: 0,
                ..Default::default()
            },
            MuxConfig {
                language: "EN".to_string(),
                ..Default::default()
            },
            MuxConfig {
                language: "Eng".to_string(),
                ..Default::default()
            },
        ] {
            assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
        }
    }

    #[test]
    fn test_create_init_starts_with_ftyp() {
        let init = create_init(&stream(&[SPS, PPS, IDR]), &MuxConfig::default()).unwrap();
        assert_eq!(&init[4..8], b"ftyp");
    }

    #[test]
    fn test_create_init_missing_parameter_sets() {
        let config = MuxConfig::default();
        let err = create_init(&stream(&[PPS, IDR]), &config).unwrap_err();
        assert!(matches!(
            err,
            Error::MissingParameterSet(ParameterSetKind::Sps)
        ));
        let err = create_init(&stream(&[SPS, IDR]), &config).unwrap_err();
        assert!(matches!(
            err,
            Error::MissingParameterSet(ParameterSetKind::Pps)
        ));
    }

    #[test]
    fn test_create_segment_timing() {
        let config = MuxConfig::default();
        let segment = create_segment(&stream(&[IDR]), 3, 2, &config).unwrap();
        assert_eq!(&segment[4..8], b"moof");
        // tfdt at 48, trun at 68
        assert_eq!(&segment[52..56], b"tfdt");
        let decode_time = u64::from_be_bytes(segment[60..68].try_into().unwrap());
        assert_eq!(decode_time, 3 * 12800);
        assert_eq!(read_u32(&segment, 88), 2 * 12800);
        assert_eq!(read_u32(&segment, 92), 4 + IDR.len() as u32);
        assert_eq!(read_u32(&segment, 96), 0x0200_0000);
        assert_eq!(read_u32(&segment, 100), 0);
    }

    #[test]
    fn test_create_segment_zero_duration() {
        let segment = create_segment(&stream(&[IDR]), 0, 0, &MuxConfig::default()).unwrap();
        assert_eq!(read_u32(&segment, 88), 0);
        assert_eq!(read_u32(&segment, 92), 4 + IDR.len() as u32);
        assert_eq!(read_u32(&segment, 96), 0x0200_0000);
    }

    #[test]
    fn test_create_segment_sequence_and_track() {
        let config = MuxConfig {
            sequence_number: 7,
            track_id: 3,
            ..Default::default()
        };
        let segment = create_segment(&stream(&[IDR]), 0, 1, &config).unwrap();
        assert_eq!(read_u32(&segment, 20), 7);
        assert_eq!(read_u32(&segment, 44), 3);
    }

    #[test]
    fn test_create_segment_empty_input() {
        let err = create_segment(&[0, 0, 0, 1], 0, 1, &MuxConfig::default()).unwrap_err();
        assert!(matches!(err, Error::EmptySample));
        let err = create_segment(&[], 0, 1, &MuxConfig::default()).unwrap_err();
        assert!(matches!(err, Error::EmptySample));
    }

    #[test]
    fn test_create_segment_duration_overflow() {
        let seconds = u32::MAX as u64 / 12800 + 1;
        let err = create_segment(&stream(&[IDR]), 0, seconds, &MuxConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            Error::TimingOverflow {
                field: "sample duration",
                ..
            }
        ));

        // the largest whole-second duration still fits
        assert!(create_segment(&stream(&[IDR]), 0, seconds - 1, &MuxConfig::default()).is_ok());
    }

    #[test]
    fn test_create_segment_timestamp_overflow() {
        let err =
            create_segment(&stream(&[IDR]), u64::MAX, 1, &MuxConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            Error::TimingOverflow {
                field: "base media decode time",
                ..
            }
        ));
    }
}
