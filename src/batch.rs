//! Render many uploaded STEP files and pack the results into one archive.

use crate::archive::create_zip_from_dir;
use crate::config::{FailurePolicy, RenderSettings, Resolution};
use crate::error::RenderError;
use crate::progress::ProgressSink;
use crate::render::{RenderJob, render_offscreen};
use crate::viewer::CadBackend;
use crate::views::view_count;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

const STEP_EXTENSIONS: [&str; 2] = ["step", "stp"];

/// A file handed to the batch, named as the user knows it.
#[derive(Clone, Debug)]
pub struct Upload {
    pub name: String,
    pub data: Vec<u8>,
}

impl Upload {
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, RenderError> {
        let data = std::fs::read(path).map_err(|e| RenderError::io(path, e))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self { name, data })
    }

    /// Final path component of the name; directories in the name are dropped.
    pub fn file_name(&self) -> &str {
        self.name
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(&self.name)
    }

    /// File name without its extension.
    pub fn stem(&self) -> &str {
        let name = self.file_name();
        match name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => name,
        }
    }

    /// `.step` or `.stp`, any case. A bare `.step` is a hidden file, not an extension.
    fn has_step_extension(&self) -> bool {
        self.file_name().rsplit_once('.').is_some_and(|(stem, ext)| {
            !stem.is_empty() && STEP_EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e))
        })
    }

    fn check_extension(&self) -> Result<(), RenderError> {
        if self.has_step_extension() {
            Ok(())
        } else {
            Err(RenderError::Config(format!(
                "{}: expected a .step or .stp file",
                self.file_name()
            )))
        }
    }
}

/// Everything a batch needs to know, captured when the batch starts.
#[derive(Clone, Debug)]
pub struct BatchConfig {
    pub resolution: Resolution,
    pub view_step: u32,
    pub archive_path: PathBuf,
    pub on_failure: FailurePolicy,
}

impl BatchConfig {
    pub fn from_settings(settings: &RenderSettings) -> Result<Self, RenderError> {
        Ok(Self {
            resolution: settings.resolution()?,
            view_step: settings.view_step,
            archive_path: settings.archive_path(),
            on_failure: settings.on_failure,
        })
    }
}

/// How one uploaded file fared.
#[derive(Debug)]
pub enum FileOutcome {
    Rendered { images: usize },
    Skipped { error: RenderError },
}

#[derive(Debug)]
pub struct FileReport {
    pub name: String,
    /// Directory name of this file's images inside the archive.
    pub folder: String,
    pub outcome: FileOutcome,
}

#[derive(Debug)]
pub struct BatchReport {
    pub archive: PathBuf,
    pub files: Vec<FileReport>,
}

impl BatchReport {
    pub fn rendered(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f.outcome, FileOutcome::Rendered { .. }))
            .count()
    }
}

pub struct BatchOrchestrator<B> {
    backend: B,
    config: BatchConfig,
}

impl<B: CadBackend> BatchOrchestrator<B> {
    pub fn new(backend: B, config: BatchConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Render every upload in order, then archive all images.
    ///
    /// Progress runs from 0.0 to 1.0; file `i` of `n` owns `[i/n, (i+1)/n)`.
    /// The working directory is removed before this returns.
    pub fn run(
        &self,
        uploads: &[Upload],
        mut progress: Option<&mut (dyn ProgressSink + '_)>,
    ) -> Result<BatchReport, RenderError> {
        if uploads.is_empty() {
            return Err(RenderError::Config("no files to render".into()));
        }
        view_count(self.config.view_step)?;
        if self.config.on_failure == FailurePolicy::Abort {
            for upload in uploads {
                upload.check_extension()?;
            }
        }

        let work = tempfile::Builder::new()
            .prefix("step-render-")
            .tempdir()
            .map_err(|e| RenderError::io(&std::env::temp_dir(), e))?;
        let upload_root = work.path().join("uploads");
        let render_root = work.path().join("renders");
        for dir in [&upload_root, &render_root] {
            std::fs::create_dir_all(dir).map_err(|e| RenderError::io(dir, e))?;
        }

        if let Some(sink) = progress.as_deref_mut() {
            sink.report(0.0);
        }

        let total = uploads.len();
        let mut folders = HashSet::new();
        let mut files = Vec::with_capacity(total);

        for (idx, upload) in uploads.iter().enumerate() {
            let folder = unique_folder(&mut folders, upload.stem());
            let range = idx as f64 / total as f64..(idx + 1) as f64 / total as f64;
            log::info!("Processing {} ({}/{})", upload.file_name(), idx + 1, total);

            let result = self.render_upload(
                upload,
                &upload_root.join(format!("{idx}")),
                &render_root.join(&folder),
                range.clone(),
                progress.as_deref_mut(),
            );

            let outcome = match result {
                Ok(images) => FileOutcome::Rendered { images },
                Err(error) if self.config.on_failure == FailurePolicy::Skip => {
                    log::warn!("Skipping {}: {}", upload.file_name(), error);
                    // Partial output would look like a complete render in the archive.
                    let partial = render_root.join(&folder);
                    if partial.exists() {
                        std::fs::remove_dir_all(&partial)
                            .map_err(|e| RenderError::io(&partial, e))?;
                    }
                    if let Some(sink) = progress.as_deref_mut() {
                        sink.report(range.end);
                    }
                    FileOutcome::Skipped { error }
                }
                Err(error) => return Err(error),
            };

            files.push(FileReport {
                name: upload.file_name().to_string(),
                folder,
                outcome,
            });
        }

        if files.iter().all(|f| matches!(f.outcome, FileOutcome::Skipped { .. })) {
            if let FileOutcome::Skipped { error } = files.swap_remove(0).outcome {
                return Err(error);
            }
        }

        log::info!("Creating archive {}", self.config.archive_path.display());
        let archive = create_zip_from_dir(&render_root, &self.config.archive_path)?;

        if let Some(sink) = progress.as_deref_mut() {
            sink.report(1.0);
        }

        Ok(BatchReport { archive, files })
    }

    fn render_upload(
        &self,
        upload: &Upload,
        upload_dir: &Path,
        output_dir: &Path,
        range: std::ops::Range<f64>,
        progress: Option<&mut (dyn ProgressSink + '_)>,
    ) -> Result<usize, RenderError> {
        upload.check_extension()?;
        let source = upload_dir.join(upload.file_name());

        std::fs::create_dir_all(upload_dir).map_err(|e| RenderError::io(upload_dir, e))?;
        std::fs::write(&source, &upload.data).map_err(|e| RenderError::io(&source, e))?;

        let job = RenderJob::new(source, output_dir)
            .with_resolution(self.config.resolution)
            .with_view_step(self.config.view_step)
            .with_progress_range(range);
        let written = render_offscreen(&self.backend, &job, progress)?;
        Ok(written.len())
    }
}

/// `stem`, or `stem_2`, `stem_3`, ... when an earlier upload already took it.
fn unique_folder(taken: &mut HashSet<String>, stem: &str) -> String {
    let base = if stem.is_empty() || stem == "." || stem == ".." {
        "model"
    } else {
        stem
    };
    let mut candidate = base.to_string();
    let mut n = 2;
    while !taken.insert(candidate.clone()) {
        candidate = format!("{base}_{n}");
        n += 1;
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::render::mock::MockBackend;

    const FAKE_STEP: &[u8] = b"ISO-10303-21;\nHEADER;\nENDSEC;\nDATA;\nENDSEC;\nEND-ISO-10303-21;\n";

    fn config(dir: &Path, on_failure: FailurePolicy) -> BatchConfig {
        BatchConfig {
            resolution: Resolution::default(),
            view_step: 90,
            archive_path: dir.join("rendered_results.zip"),
            on_failure,
        }
    }

    fn archive_names(path: &Path) -> Vec<String> {
        let archive = zip::ZipArchive::new(std::fs::File::open(path).unwrap()).unwrap();
        let mut names: Vec<String> = archive.file_names().map(String::from).collect();
        names.sort();
        names
    }

    #[test]
    fn upload_names() {
        let u = Upload::new("C:\\models\\Bracket.v2.STP", vec![]);
        assert_eq!(u.file_name(), "Bracket.v2.STP");
        assert_eq!(u.stem(), "Bracket.v2");
        assert!(u.has_step_extension());

        let u = Upload::new("../../etc/passwd", vec![]);
        assert_eq!(u.file_name(), "passwd");
        assert!(!u.has_step_extension());

        let hidden = Upload::new(".step", vec![]);
        assert_eq!(hidden.stem(), ".step");
        assert!(!hidden.has_step_extension());
        assert!(!Upload::new("dir/.STP", vec![]).has_step_extension());
    }

    #[test]
    fn duplicate_stems_get_distinct_folders() {
        let mut taken = HashSet::new();
        assert_eq!(unique_folder(&mut taken, "part"), "part");
        assert_eq!(unique_folder(&mut taken, "part"), "part_2");
        assert_eq!(unique_folder(&mut taken, "part"), "part_3");
        assert_eq!(unique_folder(&mut taken, ""), "model");
    }

    #[test]
    fn three_files_progress_monotonically_to_one() {
        let dir = tempfile::tempdir().unwrap();
        let uploads: Vec<_> = ["a.step", "b.stp", "c.STEP"]
            .into_iter()
            .map(|n| Upload::new(n, FAKE_STEP.to_vec()))
            .collect();
        let orchestrator =
            BatchOrchestrator::new(MockBackend::default(), config(dir.path(), FailurePolicy::Abort));

        let mut seen = Vec::new();
        let mut sink = |f: f64| seen.push(f);
        let report = orchestrator.run(&uploads, Some(&mut sink)).unwrap();

        assert_eq!(seen.first(), Some(&0.0));
        assert_eq!(seen.last(), Some(&1.0));
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));

        // 12 captures per file at a 90° step, after the initial 0.0
        let per_file = view_count(90).unwrap();
        for k in 1..=3 {
            let after_file = seen[k * per_file];
            assert!(after_file >= k as f64 / 3.0 - 1e-12, "file {k}: {after_file}");
        }

        assert_eq!(report.rendered(), 3);
        assert_eq!(report.archive, dir.path().join("rendered_results.zip"));
        let names = archive_names(&report.archive);
        assert_eq!(names.len(), 3 * per_file);
        assert!(names.contains(&"a/view_1.png".to_string()));
        assert!(names.contains(&"b/view_12.png".to_string()));
        assert!(names.contains(&"c/view_5.png".to_string()));
        assert!(names.iter().all(|n| !n.ends_with(".step") && !n.ends_with(".stp")));
    }

    #[test]
    fn first_failure_aborts_without_archive() {
        let dir = tempfile::tempdir().unwrap();
        let uploads = vec![
            Upload::new("good.step", FAKE_STEP.to_vec()),
            Upload::new("broken.step", b"garbage".to_vec()),
            Upload::new("never.step", FAKE_STEP.to_vec()),
        ];
        let cfg = config(dir.path(), FailurePolicy::Abort);
        let archive = cfg.archive_path.clone();

        let err = BatchOrchestrator::new(MockBackend::default(), cfg)
            .run(&uploads, None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert!(!archive.exists());
    }

    #[test]
    fn bad_extension_aborts_before_rendering() {
        let dir = tempfile::tempdir().unwrap();
        let uploads = vec![
            Upload::new("a.step", FAKE_STEP.to_vec()),
            Upload::new("b.stp", FAKE_STEP.to_vec()),
            Upload::new("notes.txt", FAKE_STEP.to_vec()),
        ];
        let backend = MockBackend::default();
        let calls = backend.calls.clone();
        let cfg = config(dir.path(), FailurePolicy::Abort);
        let archive = cfg.archive_path.clone();

        let mut seen = Vec::new();
        let mut sink = |f: f64| seen.push(f);
        let err = BatchOrchestrator::new(backend, cfg)
            .run(&uploads, Some(&mut sink))
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(err.to_string().contains("notes.txt"));
        assert_eq!(calls.borrow().redraws, 0);
        assert!(calls.borrow().projections.is_empty());
        assert!(seen.is_empty());
        assert!(!archive.exists());
    }

    #[test]
    fn skip_policy_archives_what_rendered() {
        let dir = tempfile::tempdir().unwrap();
        let uploads = vec![
            Upload::new("good.step", FAKE_STEP.to_vec()),
            Upload::new("notes.txt", FAKE_STEP.to_vec()),
            Upload::new("broken.stp", b"garbage".to_vec()),
            Upload::new("also_good.stp", FAKE_STEP.to_vec()),
        ];
        let orchestrator =
            BatchOrchestrator::new(MockBackend::default(), config(dir.path(), FailurePolicy::Skip));

        let mut seen = Vec::new();
        let mut sink = |f: f64| seen.push(f);
        let report = orchestrator.run(&uploads, Some(&mut sink)).unwrap();

        assert_eq!(report.rendered(), 2);
        assert!(matches!(
            report.files[1].outcome,
            FileOutcome::Skipped { ref error } if error.kind() == ErrorKind::Config
        ));
        assert!(matches!(
            report.files[2].outcome,
            FileOutcome::Skipped { ref error } if error.kind() == ErrorKind::Parse
        ));
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(seen.last(), Some(&1.0));

        let names = archive_names(&report.archive);
        assert_eq!(names.len(), 2 * view_count(90).unwrap());
        assert!(names.iter().all(|n| n.starts_with("good/") || n.starts_with("also_good/")));
    }

    #[test]
    fn skip_policy_with_nothing_rendered_fails() {
        let dir = tempfile::tempdir().unwrap();
        let uploads = vec![Upload::new("broken.step", b"garbage".to_vec())];
        let err = BatchOrchestrator::new(MockBackend::default(), config(dir.path(), FailurePolicy::Skip))
            .run(&uploads, None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
    }

    #[test]
    fn empty_batch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = BatchOrchestrator::new(MockBackend::default(), config(dir.path(), FailurePolicy::Abort))
            .run(&[], None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn rerun_replaces_the_archive() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator =
            BatchOrchestrator::new(MockBackend::default(), config(dir.path(), FailurePolicy::Abort));

        let both = vec![
            Upload::new("a.step", FAKE_STEP.to_vec()),
            Upload::new("b.step", FAKE_STEP.to_vec()),
        ];
        let report = orchestrator.run(&both, None).unwrap();
        assert_eq!(archive_names(&report.archive).len(), 24);

        let report = orchestrator.run(&both[..1], None).unwrap();
        assert_eq!(archive_names(&report.archive).len(), 12);
    }
}
