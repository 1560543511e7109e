//! Stateful wrapper enforcing the init-then-segments protocol.

use crate::error::{Error, Result};
use crate::mux::{self, MuxConfig};

/// One output stream: an init segment followed by fragments with strictly
/// increasing timestamps and consecutive sequence numbers.
#[derive(Debug, Clone)]
pub struct StreamSession {
    config: MuxConfig,
    initialized: bool,
    next_sequence_number: u32,
    last_timestamp: Option<u64>,
}

impl StreamSession {
    /// Start a session; the first fragment uses `config.sequence_number`.
    pub fn new(config: MuxConfig) -> Self {
        let next_sequence_number = config.sequence_number;
        Self {
            config,
            initialized: false,
            next_sequence_number,
            last_timestamp: None,
        }
    }

    pub fn config(&self) -> &MuxConfig {
        &self.config
    }

    /// Produce the init segment. Only allowed once per session.
    pub fn init(&mut self, bitstream: &[u8]) -> Result<Vec<u8>> {
        if self.initialized {
            return Err(Error::session("init segment already produced"));
        }
        let init = mux::create_init(bitstream, &self.config)?;
        self.initialized = true;

        #[cfg(feature = "tracing")]
        tracing::debug!(size = init.len(), "Session initialized");

        Ok(init)
    }

    /// Produce the next fragment. State only advances on success.
    pub fn segment(&mut self, bitstream: &[u8], timestamp: u64, duration: u64) -> Result<Vec<u8>> {
        if !self.initialized {
            return Err(Error::session("segment requested before init segment"));
        }
        if let Some(last) = self.last_timestamp {
            if timestamp <= last {
                return Err(Error::session(format!(
                    "timestamp {} is not after previous timestamp {}",
                    timestamp, last
                )));
            }
        }

        let following = self
            .next_sequence_number
            .checked_add(1)
            .ok_or_else(|| Error::session("sequence number space exhausted"))?;

        let config = MuxConfig {
            sequence_number: self.next_sequence_number,
            ..self.config.clone()
        };
        let segment = mux::create_segment(bitstream, timestamp, duration, &config)?;

        self.next_sequence_number = following;
        self.last_timestamp = Some(timestamp);

        #[cfg(feature = "tracing")]
        tracing::debug!(
            sequence_number = config.sequence_number,
            timestamp,
            size = segment.len(),
            "Session produced segment"
        );

        Ok(segment)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Sequence number the next fragment will carry.
    pub fn next_sequence_number(&self) -> u32 {
        self.next_sequence_number
    }

    /// Timestamp (seconds) of the last fragment produced.
    pub fn last_timestamp(&self) -> Option<u64> {
        self.last_timestamp
    }
}
