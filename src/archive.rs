use crate::error::RenderError;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Zip every file below `root` into `dest`, keyed by its path relative to
/// `root`. An existing `dest` is replaced, never appended to.
///
/// The archive is written next to `dest` and moved into place only once it
/// is complete, so a failed call leaves any previous `dest` untouched.
pub fn create_zip_from_dir(root: &Path, dest: &Path) -> Result<PathBuf, RenderError> {
    let archive_err = |source| RenderError::Archive {
        path: dest.to_path_buf(),
        source,
    };

    let parent = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut partial = tempfile::Builder::new()
        .prefix(".archive-")
        .suffix(".zip.part")
        .tempfile_in(parent)
        .map_err(|e| RenderError::io(dest, e))?;

    // The archive may live under `root`; never pack it (or its old copy) into itself.
    let skip: Vec<PathBuf> = [partial.path(), dest]
        .into_iter()
        .filter_map(|p| std::fs::canonicalize(p).ok())
        .collect();

    let count = {
        let mut zip = ZipWriter::new(BufWriter::new(partial.as_file_mut()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        let mut count = 0;
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(root).to_path_buf();
                RenderError::Io {
                    path,
                    source: e.into(),
                }
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if std::fs::canonicalize(path).is_ok_and(|p| skip.contains(&p)) {
                continue;
            }

            let name = entry_name(root, path)?;
            zip.start_file(name, options).map_err(archive_err)?;
            let mut source = File::open(path).map_err(|e| RenderError::io(path, e))?;
            std::io::copy(&mut source, &mut zip).map_err(|e| RenderError::io(path, e))?;
            count += 1;
        }

        let mut writer = zip.finish().map_err(archive_err)?;
        writer.flush().map_err(|e| RenderError::io(dest, e))?;
        count
    };

    partial
        .persist(dest)
        .map_err(|e| RenderError::io(dest, e.error))?;
    log::info!("Archived {} files into {}", count, dest.display());
    Ok(dest.to_path_buf())
}

/// Relative path with `/` separators, as zip readers expect.
fn entry_name(root: &Path, path: &Path) -> Result<String, RenderError> {
    let relative = path
        .strip_prefix(root)
        .map_err(|_| RenderError::Config(format!("{} is outside {}", path.display(), root.display())))?;
    Ok(relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/"))
}
