use avcfrag_media::{MuxConfig, ParameterSetPolicy};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub mux: MuxSettings,

    #[serde(default)]
    pub output: OutputConfig,
}

impl Config {
    /// Settings handed to the muxer.
    pub fn mux_config(&self) -> MuxConfig {
        MuxConfig {
            timescale: self.mux.timescale,
            track_id: self.mux.track_id,
            language: self.mux.language.clone(),
            track_name: self.mux.track_name.clone(),
            emit_styp: self.mux.emit_styp,
            parameter_set_policy: if self.mux.strict_parameter_sets {
                ParameterSetPolicy::Strict
            } else {
                ParameterSetPolicy::LastWins
            },
            ..MuxConfig::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MuxSettings {
    /// Ticks per second for every timing field
    #[serde(default = "default_timescale")]
    pub timescale: u32,

    #[serde(default = "default_track_id")]
    pub track_id: u32,

    /// ISO-639-2/T code written to `mdhd`
    #[serde(default = "default_language")]
    pub language: String,

    /// Handler name written to `hdlr`
    #[serde(default = "default_track_name")]
    pub track_name: String,

    /// Lead every media segment with an `styp` box
    #[serde(default)]
    pub emit_styp: bool,

    /// Reject streams carrying two different SPS (or PPS) units instead of
    /// keeping the last one
    #[serde(default)]
    pub strict_parameter_sets: bool,
}

fn default_timescale() -> u32 {
    avcfrag_media::DEFAULT_TIMESCALE
}
fn default_track_id() -> u32 {
    avcfrag_media::DEFAULT_TRACK_ID
}
fn default_language() -> String {
    "und".to_string()
}
fn default_track_name() -> String {
    "video".to_string()
}

impl Default for MuxSettings {
    fn default() -> Self {
        Self {
            timescale: default_timescale(),
            track_id: default_track_id(),
            language: default_language(),
            track_name: default_track_name(),
            emit_styp: false,
            strict_parameter_sets: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    /// File name of the init segment
    #[serde(default = "default_init_name")]
    pub init_name: String,

    /// File name of each media segment; `{seq}` is replaced by the sequence
    /// number
    #[serde(default = "default_segment_pattern")]
    pub segment_pattern: String,
}

fn default_init_name() -> String {
    "init.mp4".to_string()
}
fn default_segment_pattern() -> String {
    "segment_{seq}.m4s".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            init_name: default_init_name(),
            segment_pattern: default_segment_pattern(),
        }
    }
}

impl OutputConfig {
    pub fn segment_name(&self, sequence_number: u32) -> String {
        self.segment_pattern
            .replace("{seq}", &sequence_number.to_string())
    }
}
