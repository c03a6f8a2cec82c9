use crate::audio::decode::AudioDecoder;
use crate::foundation::core::Canvas;
use crate::foundation::error::{SpectrumError, SpectrumResult};
use crate::playlist::{Playlist, Track};
use crate::settings::encoding::{EncodingSettings, QualityPreset, RenderConfig};
use crate::settings::visual::VisualSettings;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// One playlist entry as written in a project file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlaylistEntry {
    /// Defaults to `track-<n>` (1-based).
    #[serde(default)]
    pub id: Option<String>,
    /// Defaults to the file stem.
    #[serde(default)]
    pub name: Option<String>,
    pub path: PathBuf,
    /// Seconds. Read with ffprobe when omitted.
    #[serde(default)]
    pub duration: Option<f64>,
}

/// JSON project: playlist, visuals, encoding and output settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectFile {
    /// Base name of the output file.
    #[serde(default = "default_name")]
    pub name: String,
    pub playlist: Vec<PlaylistEntry>,
    #[serde(default)]
    pub canvas: Canvas,
    #[serde(default)]
    pub quality: QualityPreset,
    /// Explicit video settings; overrides `quality` when present.
    #[serde(default)]
    pub render: Option<RenderConfig>,
    #[serde(default)]
    pub encoding: EncodingSettings,
    #[serde(default)]
    pub visual: VisualSettings,
}

fn default_name() -> String {
    "render".to_owned()
}

impl ProjectFile {
    /// Parse a project from JSON. Paths are kept as written.
    pub fn from_reader<R: std::io::Read>(r: R) -> SpectrumResult<Self> {
        serde_json::from_reader(r).map_err(|e| SpectrumError::serde(format!("parse project JSON: {e}")))
    }

    /// Load a project file and resolve relative paths against its directory.
    pub fn from_path(path: impl AsRef<Path>) -> SpectrumResult<Self> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|e| {
            SpectrumError::validation(format!("open project JSON '{}': {e}", path.display()))
        })?;
        let mut project = Self::from_reader(BufReader::new(f))?;
        let root = path.parent().unwrap_or_else(|| Path::new("."));
        project.resolve_paths(root);
        Ok(project)
    }

    /// Make every relative track and image path relative to `root`.
    pub fn resolve_paths(&mut self, root: &Path) {
        let fix = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = root.join(&*p);
            }
        };
        for entry in &mut self.playlist {
            fix(&mut entry.path);
        }
        if let Some(img) = &mut self.visual.background.image {
            fix(img);
        }
        if let Some(logo) = &mut self.visual.logo {
            fix(&mut logo.image);
        }
    }

    /// Replace the video settings with a named preset.
    pub fn set_quality(&mut self, preset: QualityPreset) {
        self.quality = preset;
        self.render = None;
    }

    pub fn render_config(&self) -> RenderConfig {
        self.render.clone().unwrap_or_else(|| self.quality.config())
    }

    pub fn validate(&self) -> SpectrumResult<()> {
        if self.playlist.is_empty() {
            return Err(SpectrumError::validation("project playlist is empty"));
        }
        for (i, entry) in self.playlist.iter().enumerate() {
            if let Some(d) = entry.duration
                && (!d.is_finite() || d <= 0.0)
            {
                return Err(SpectrumError::validation(format!(
                    "playlist entry {} duration must be > 0, got {d}",
                    i + 1
                )));
            }
        }
        self.canvas.validate()?;
        self.encoding.validate()?;
        self.render_config().validate()?;
        self.visual.validate()
    }

    /// Build the playlist, probing durations the file leaves out.
    pub fn build_playlist(&self, decoder: &dyn AudioDecoder) -> SpectrumResult<Playlist> {
        let mut playlist = Playlist::new();
        for (i, entry) in self.playlist.iter().enumerate() {
            let id = entry.id.clone().unwrap_or_else(|| format!("track-{}", i + 1));
            let name = entry.name.clone().unwrap_or_else(|| {
                entry
                    .path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| id.clone())
            });
            let duration = match entry.duration {
                Some(d) => d,
                None => {
                    let d = decoder.read_duration(&entry.path)?;
                    tracing::debug!(track = %id, duration_secs = d, "read track duration");
                    d
                }
            };
            playlist.push(Track::from_file(id, name, duration, entry.path.clone())?)?;
        }
        Ok(playlist)
    }
}
