//! Fragmented MP4 (fMP4) serialization.
//!
//! - Init segment: `ftyp` + `moov` describing one AVC video track
//! - Media segment: optional `styp`, `moof` + `mdat` with length-prefixed samples

pub(crate) mod boxes;
mod writer;

pub use boxes::{pack_language, NON_SYNC_SAMPLE_FLAGS, SYNC_SAMPLE_FLAGS};
pub use writer::{
    write_init_segment, write_media_segment, FragmentConfig, SampleInfo, TrackConfig,
};
