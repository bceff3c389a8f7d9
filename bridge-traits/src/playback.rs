//! Playback bridge traits.
//!
//! Decoding and rendering live in the host audio engine. The core only tells
//! the engine what to play and where to start, and reads back the position.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::Result;

/// Where the audio for one track comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioSource {
    /// Downloaded file on the local file system.
    LocalFile { path: PathBuf },
    /// Remote HTTP(S) stream fetched by the host.
    RemoteStream {
        url: String,
        headers: HashMap<String, String>,
    },
}

impl AudioSource {
    /// Determine whether the source represents remote content.
    pub fn is_remote(&self) -> bool {
        matches!(self, AudioSource::RemoteStream { .. })
    }
}

/// One playable track handed to the media pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedTrack {
    pub index: u32,
    /// Offset of the track inside the whole item, in seconds.
    pub start_offset: f64,
    pub duration: f64,
    pub source: AudioSource,
}

/// Host media pipeline.
///
/// Positions are item-global seconds; the pipeline maps them onto the track
/// that covers them. Stalls and decoder failures are reported back to the
/// core through the controller, not through this trait.
#[async_trait]
pub trait MediaPipeline: Send + Sync {
    /// Replace the current queue and prepare playback at `start_position`.
    async fn load(&self, tracks: Vec<QueuedTrack>, start_position: f64) -> Result<()>;

    async fn play(&self) -> Result<()>;

    async fn pause(&self) -> Result<()>;

    async fn seek(&self, position: f64) -> Result<()>;

    /// Current item-global position in seconds.
    async fn position(&self) -> Result<f64>;

    /// Tear down decoders and release audio resources.
    async fn release(&self) -> Result<()>;
}
