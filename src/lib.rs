pub mod archive;
pub mod batch;
pub mod config;
pub mod error;
pub mod progress;
pub mod render;
pub mod software;
pub mod step_loader;
pub mod viewer;
pub mod views;
pub mod worker;

pub use archive::create_zip_from_dir;
pub use batch::{BatchConfig, BatchOrchestrator, BatchReport, FileOutcome, FileReport, Upload};
pub use config::{ARCHIVE_NAME, FailurePolicy, RenderSettings, Resolution};
pub use error::{ErrorKind, RenderError};
pub use progress::{LogProgress, ProgressSink, SharedProgress};
pub use render::{RenderJob, render_offscreen, view_file_name};
pub use software::{SoftwareBackend, SoftwareView};
pub use step_loader::{HeaderEntry, Parameter, StepFace, StepMetadata, StepScene, StepShell, load_step_file};
pub use viewer::{CadBackend, OffscreenView};
pub use views::{DEFAULT_VIEW_STEP, ViewDirection, spherical_views, view_count};
pub use worker::{BatchMessage, spawn_batch};
