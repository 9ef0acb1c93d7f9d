//! Render settings and their optional TOML file.

use crate::error::RenderError;
use crate::views::DEFAULT_VIEW_STEP;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const MIN_WIDTH: u32 = 100;
pub const MAX_WIDTH: u32 = 3840;
pub const MIN_HEIGHT: u32 = 100;
pub const MAX_HEIGHT: u32 = 2160;

/// File name of the archive produced by a batch.
pub const ARCHIVE_NAME: &str = "rendered_results.zip";

/// Environment variable that points at a settings file.
pub const CONFIG_ENV: &str = "STEP_RENDER_CONFIG";

/// Settings file looked up in the working directory.
pub const CONFIG_FILE: &str = "step-render.toml";

/// Output image size in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Resolution {
    width: u32,
    height: u32,
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            width: 500,
            height: 500,
        }
    }
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Result<Self, RenderError> {
        if !(MIN_WIDTH..=MAX_WIDTH).contains(&width) {
            return Err(RenderError::Config(format!(
                "width {width} outside {MIN_WIDTH}..={MAX_WIDTH}"
            )));
        }
        if !(MIN_HEIGHT..=MAX_HEIGHT).contains(&height) {
            return Err(RenderError::Config(format!(
                "height {height} outside {MIN_HEIGHT}..={MAX_HEIGHT}"
            )));
        }
        Ok(Self { width, height })
    }

    /// Saturate both dimensions into the allowed bounds.
    pub fn clamped(width: u32, height: u32) -> Self {
        Self {
            width: width.clamp(MIN_WIDTH, MAX_WIDTH),
            height: height.clamp(MIN_HEIGHT, MAX_HEIGHT),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

/// What a batch does when one file fails to render.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop the batch and produce no archive.
    #[default]
    Abort,
    /// Log the failure, keep going and archive what rendered.
    Skip,
}

/// Settings as they appear in `step-render.toml`. Every field is optional.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderSettings {
    pub width: u32,
    pub height: u32,
    /// Angular step in degrees between captured views.
    pub view_step: u32,
    /// Tessellation density relative to the model's bounding box diameter.
    /// Smaller values give finer meshes.
    pub tessellation_factor: f64,
    /// Uniform surface color, linear RGB in 0..=1.
    pub model_color: [f32; 3],
    /// Directory the archive is written to.
    pub output_dir: PathBuf,
    pub on_failure: FailurePolicy,
}

impl Default for RenderSettings {
    fn default() -> Self {
        let resolution = Resolution::default();
        Self {
            width: resolution.width,
            height: resolution.height,
            view_step: DEFAULT_VIEW_STEP,
            tessellation_factor: 0.005,
            model_color: [0.72, 0.72, 0.75],
            output_dir: PathBuf::from("."),
            on_failure: FailurePolicy::Abort,
        }
    }
}

impl RenderSettings {
    pub fn resolution(&self) -> Result<Resolution, RenderError> {
        Resolution::new(self.width, self.height)
    }

    pub fn archive_path(&self) -> PathBuf {
        self.output_dir.join(ARCHIVE_NAME)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, RenderError> {
        let settings: RenderSettings = toml::from_str(content)
            .map_err(|e| RenderError::Config(format!("invalid settings: {e}")))?;
        settings.resolution()?;
        crate::views::view_count(settings.view_step)?;
        if !(settings.tessellation_factor > 0.0 && settings.tessellation_factor.is_finite()) {
            return Err(RenderError::Config(format!(
                "tessellation_factor must be positive, got {}",
                settings.tessellation_factor
            )));
        }
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self, RenderError> {
        let content = std::fs::read_to_string(path).map_err(|e| RenderError::io(path, e))?;
        Self::from_toml_str(&content)
    }

    /// Load settings from `$STEP_RENDER_CONFIG`, or `step-render.toml` in the
    /// working directory, falling back to defaults when neither exists.
    pub fn load() -> Result<Self, RenderError> {
        match resolve_config_path() {
            Some(path) => {
                log::info!("Loading settings from {}", path.display());
                Self::from_file(&path)
            }
            None => Ok(Self::default()),
        }
    }
}

fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(p) = std::env::var(CONFIG_ENV) {
        return Some(PathBuf::from(p));
    }

    let local = PathBuf::from(CONFIG_FILE);
    local.exists().then_some(local)
}
