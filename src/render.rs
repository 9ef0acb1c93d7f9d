//! Render one STEP file from every direction on the capture sphere.

use crate::config::Resolution;
use crate::error::RenderError;
use crate::progress::ProgressSink;
use crate::viewer::{CadBackend, OffscreenView, WHITE};
use crate::views::{DEFAULT_VIEW_STEP, spherical_views};
use std::ops::Range;
use std::path::{Path, PathBuf};

/// Inputs for rendering a single file.
#[derive(Clone, Debug)]
pub struct RenderJob {
    pub source: PathBuf,
    pub output_dir: PathBuf,
    pub resolution: Resolution,
    pub view_step: u32,
    /// Slice of overall progress this job covers.
    pub progress_range: Range<f64>,
}

impl RenderJob {
    pub fn new(source: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            output_dir: output_dir.into(),
            resolution: Resolution::default(),
            view_step: DEFAULT_VIEW_STEP,
            progress_range: 0.0..1.0,
        }
    }

    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_view_step(mut self, view_step: u32) -> Self {
        self.view_step = view_step;
        self
    }

    pub fn with_progress_range(mut self, range: Range<f64>) -> Self {
        self.progress_range = range;
        self
    }
}

/// File name of the capture at 0-based position `index`.
pub fn view_file_name(index: usize) -> String {
    format!("view_{}.png", index + 1)
}

/// Render `job.source` into `job.output_dir`, one PNG per view direction.
///
/// The file is read before anything is written, so a parse failure leaves the
/// output directory empty. Returns the written paths in capture order.
pub fn render_offscreen<B: CadBackend>(
    backend: &B,
    job: &RenderJob,
    mut progress: Option<&mut (dyn ProgressSink + '_)>,
) -> Result<Vec<PathBuf>, RenderError> {
    log::info!("Rendering {}", job.source.display());
    let views = spherical_views(job.view_step)?;

    std::fs::create_dir_all(&job.output_dir).map_err(|e| RenderError::io(&job.output_dir, e))?;

    let mut view = backend.create_view()?;
    view.set_background(WHITE);
    view.set_size(job.resolution);

    let shape = backend.read_step(&job.source)?;
    view.display_shaded(&shape);
    view.fit_all()?;

    let total = views.len();
    let Range { start, end } = job.progress_range;
    let mut written = Vec::with_capacity(total);

    for (i, direction) in views.into_iter().enumerate() {
        view.set_proj(direction);
        view.redraw()?;

        let path = job.output_dir.join(view_file_name(i));
        view.dump(&path)?;
        log::debug!("Captured {}", path.display());
        written.push(path);

        if let Some(sink) = progress.as_deref_mut() {
            sink.report(start + (i + 1) as f64 / total as f64 * (end - start));
        }
    }

    log::info!(
        "Wrote {} views of {} to {}",
        written.len(),
        file_label(&job.source),
        job.output_dir.display()
    );
    Ok(written)
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
pub(crate) mod mock {
    //! In-memory backend that records what the driver asks of it.

    use super::*;
    use crate::views::ViewDirection;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    pub struct Calls {
        pub background: Option<[f32; 3]>,
        pub size: Option<Resolution>,
        pub fits: usize,
        pub redraws: usize,
        pub projections: Vec<ViewDirection>,
    }

    /// Reads any file whose content starts with `ISO-10303-21`.
    #[derive(Default)]
    pub struct MockBackend {
        pub calls: Rc<RefCell<Calls>>,
        /// Fail `redraw` on this 0-based capture.
        pub fail_redraw_at: Option<usize>,
    }

    pub struct MockView {
        calls: Rc<RefCell<Calls>>,
        fail_redraw_at: Option<usize>,
        shown: bool,
    }

    impl CadBackend for MockBackend {
        type Shape = String;
        type View = MockView;

        fn read_step(&self, path: &Path) -> Result<String, RenderError> {
            let text = std::fs::read_to_string(path).map_err(|e| RenderError::parse(path, e.to_string()))?;
            if text.starts_with("ISO-10303-21") {
                Ok(text)
            } else {
                Err(RenderError::parse(path, "missing ISO-10303-21 header"))
            }
        }

        fn create_view(&self) -> Result<MockView, RenderError> {
            Ok(MockView {
                calls: Rc::clone(&self.calls),
                fail_redraw_at: self.fail_redraw_at,
                shown: false,
            })
        }
    }

    impl OffscreenView for MockView {
        type Shape = String;

        fn set_background(&mut self, rgb: [f32; 3]) {
            self.calls.borrow_mut().background = Some(rgb);
        }

        fn set_size(&mut self, resolution: Resolution) {
            self.calls.borrow_mut().size = Some(resolution);
        }

        fn display_shaded(&mut self, _shape: &String) {
            self.shown = true;
        }

        fn fit_all(&mut self) -> Result<(), RenderError> {
            assert!(self.shown, "fit before display");
            self.calls.borrow_mut().fits += 1;
            Ok(())
        }

        fn set_proj(&mut self, direction: ViewDirection) {
            self.calls.borrow_mut().projections.push(direction);
        }

        fn redraw(&mut self) -> Result<(), RenderError> {
            let mut calls = self.calls.borrow_mut();
            if Some(calls.redraws) == self.fail_redraw_at {
                return Err(RenderError::Render("out of memory".into()));
            }
            calls.redraws += 1;
            Ok(())
        }

        fn dump(&self, path: &Path) -> Result<(), RenderError> {
            std::fs::write(path, b"\x89PNG\r\n\x1a\n").map_err(|e| RenderError::io(path, e))
        }
    }

    pub fn write_fake_step(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, "ISO-10303-21;\nHEADER;\nENDSEC;\nDATA;\nENDSEC;\nEND-ISO-10303-21;\n")
            .unwrap();
        path
    }
}
