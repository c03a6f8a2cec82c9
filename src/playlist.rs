use crate::audio::decode::AudioPcm;
use crate::foundation::error::{SpectrumError, SpectrumResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where a track's audio payload comes from.
#[derive(Clone, Debug)]
pub enum TrackSource {
    /// Encoded audio file, decoded through an [`AudioDecoder`](crate::AudioDecoder).
    File(PathBuf),
    /// Already-decoded PCM.
    Pcm(Arc<AudioPcm>),
}

/// One playlist entry. Immutable once constructed.
#[derive(Clone, Debug)]
pub struct Track {
    id: String,
    name: String,
    duration_secs: f64,
    source: TrackSource,
}

impl Track {
    /// Create a file-backed track with a known duration.
    pub fn from_file(
        id: impl Into<String>,
        name: impl Into<String>,
        duration_secs: f64,
        path: impl Into<PathBuf>,
    ) -> SpectrumResult<Self> {
        Self::new(id.into(), name.into(), duration_secs, TrackSource::File(path.into()))
    }

    /// Create a track from decoded PCM. The duration is derived from the sample count.
    pub fn from_pcm(
        id: impl Into<String>,
        name: impl Into<String>,
        pcm: AudioPcm,
    ) -> SpectrumResult<Self> {
        let duration_secs = pcm.duration_secs();
        Self::new(
            id.into(),
            name.into(),
            duration_secs,
            TrackSource::Pcm(Arc::new(pcm)),
        )
    }

    fn new(
        id: String,
        name: String,
        duration_secs: f64,
        source: TrackSource,
    ) -> SpectrumResult<Self> {
        if id.trim().is_empty() {
            return Err(SpectrumError::validation("track id must be non-empty"));
        }
        if !duration_secs.is_finite() || duration_secs <= 0.0 {
            return Err(SpectrumError::validation(format!(
                "track '{id}' duration must be finite and > 0, got {duration_secs}"
            )));
        }
        Ok(Self {
            id,
            name,
            duration_secs,
            source,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration_secs
    }

    pub fn source(&self) -> &TrackSource {
        &self.source
    }

    /// Path of a file-backed track.
    pub fn path(&self) -> Option<&Path> {
        match &self.source {
            TrackSource::File(p) => Some(p),
            TrackSource::Pcm(_) => None,
        }
    }
}

/// Ordered track list. Order defines playback and render order.
#[derive(Clone, Debug, Default)]
pub struct Playlist {
    tracks: Vec<Track>,
}

impl Playlist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a track. Track ids must be unique within the playlist.
    pub fn push(&mut self, track: Track) -> SpectrumResult<()> {
        if self.tracks.iter().any(|t| t.id == track.id) {
            return Err(SpectrumError::validation(format!(
                "duplicate track id '{}'",
                track.id
            )));
        }
        self.tracks.push(track);
        Ok(())
    }

    /// Remove a track by id.
    pub fn remove(&mut self, id: &str) -> Option<Track> {
        let idx = self.tracks.iter().position(|t| t.id == id)?;
        Some(self.tracks.remove(idx))
    }

    /// Move the track at `from` so it ends up at index `to`.
    pub fn move_track(&mut self, from: usize, to: usize) -> SpectrumResult<()> {
        let len = self.tracks.len();
        if from >= len || to >= len {
            return Err(SpectrumError::validation(format!(
                "move_track indices out of range ({from} -> {to}, len {len})"
            )));
        }
        let t = self.tracks.remove(from);
        self.tracks.insert(to, t);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == id)
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Sum of track durations (one pass, no looping).
    pub fn total_duration_secs(&self) -> f64 {
        self.tracks.iter().map(|t| t.duration_secs).sum()
    }
}
