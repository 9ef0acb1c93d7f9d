use crate::error::RenderError;
use anyhow::Context;
use rayon::prelude::*;
pub use ruststep::ast::Parameter;
use ruststep::parser::parse;
use std::path::Path;
use truck_meshalgo::prelude::*;
use truck_stepio::r#in::Table;

/// A named header entry from the STEP file.
#[derive(Clone, Debug)]
pub struct HeaderEntry {
    pub name: String,
    pub parameter: Parameter,
}

/// Metadata pulled from a STEP file header.
#[derive(Clone, Debug, Default)]
pub struct StepMetadata {
    pub headers: Vec<HeaderEntry>,
    pub entity_count: usize,
}

/// A single STEP face (surface) with its tessellated mesh.
#[derive(Clone, Debug)]
pub struct StepFace {
    pub id: usize,
    pub mesh: PolygonMesh,
}

/// A STEP shell containing multiple faces.
#[derive(Clone, Debug)]
pub struct StepShell {
    pub id: usize,
    pub faces: Vec<StepFace>,
}

impl StepMetadata {
    pub fn header(&self, name: &str) -> Option<&Parameter> {
        self.headers
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| &entry.parameter)
    }

    /// First string of the `FILE_NAME` record.
    pub fn file_name(&self) -> Option<&str> {
        self.header("FILE_NAME").and_then(first_string)
    }

    /// First schema named in `FILE_SCHEMA`, e.g. `CONFIG_CONTROL_DESIGN`.
    pub fn schema(&self) -> Option<&str> {
        self.header("FILE_SCHEMA").and_then(first_string)
    }
}

fn first_string(param: &Parameter) -> Option<&str> {
    match param {
        Parameter::String(s) if !s.is_empty() => Some(s.as_str()),
        Parameter::List(items) => items.iter().find_map(first_string),
        Parameter::Typed { parameter, .. } => first_string(parameter),
        _ => None,
    }
}

/// Full scene extracted from a STEP file.
#[derive(Clone, Debug)]
pub struct StepScene {
    pub metadata: StepMetadata,
    pub shells: Vec<StepShell>,
}

impl StepScene {
    pub fn meshes(&self) -> impl Iterator<Item = &PolygonMesh> {
        self.shells
            .iter()
            .flat_map(|shell| shell.faces.iter().map(|face| &face.mesh))
    }

    pub fn face_count(&self) -> usize {
        self.shells.iter().map(|s| s.faces.len()).sum()
    }
}

/// Load and tessellate a STEP file into polygon meshes.
///
/// `tolerance_factor` scales the tessellation tolerance by the bounding box
/// diameter of each shell (smaller = more triangles). Any failure to read,
/// parse or convert the file is reported as [`RenderError::Parse`].
pub fn load_step_file(path: &Path, tolerance_factor: f64) -> Result<StepScene, RenderError> {
    load_step_inner(path, tolerance_factor)
        .map_err(|e| RenderError::parse(path, format!("{e:#}")))
}

fn load_step_inner(path: &Path, tolerance_factor: f64) -> anyhow::Result<StepScene> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read STEP file {}", path.display()))?;

    let exchange = parse(&raw).context("Failed to parse STEP file")?;
    let table = Table::from_data_section(
        exchange
            .data
            .first()
            .context("STEP file has no data sections")?,
    );

    let metadata = StepMetadata {
        headers: exchange
            .header
            .iter()
            .map(|r| HeaderEntry {
                name: r.name.clone(),
                parameter: r.parameter.clone(),
            })
            .collect(),
        entity_count: exchange
            .data
            .iter()
            .map(|section| section.entities.len())
            .sum(),
    };

    let mut shell_entries: Vec<_> = table.shell.iter().collect();
    shell_entries.sort_by_key(|(id, _)| *id);
    log::debug!(
        "{}: {} entities, {} shells",
        path.display(),
        metadata.entity_count,
        shell_entries.len()
    );

    let shells: anyhow::Result<Vec<StepShell>> = shell_entries
        .into_par_iter()
        .enumerate()
        .map(|(local_idx, (_id, shell_holder))| {
            let compressed = table
                .to_compressed_shell(shell_holder)
                .map_err(|e| anyhow::anyhow!("Failed to convert STEP shell into topology: {e}"))?;

            // Coarse pass only measures the shell so the real tolerance tracks model size.
            let coarse = compressed.robust_triangulation(0.01).to_polygon();
            let mut tol = coarse.bounding_box().diameter() * tolerance_factor;
            if !tol.is_normal() {
                tol = 0.01;
            }

            let poly_shell = compressed.robust_triangulation(tol);
            let faces = poly_shell
                .faces
                .iter()
                .enumerate()
                .filter_map(|(face_idx, face)| {
                    face.surface.as_ref().map(|surface| StepFace {
                        id: face_idx,
                        mesh: match face.orientation {
                            true => surface.clone(),
                            false => surface.inverse(),
                        },
                    })
                })
                .collect();

            Ok(StepShell {
                id: local_idx,
                faces,
            })
        })
        .collect();

    let mut shells = shells?;
    shells.sort_by_key(|s| s.id);

    if shells.is_empty() {
        anyhow::bail!("No shells found in STEP file");
    }

    let scene = StepScene { metadata, shells };
    log::info!(
        "Loaded {}: {} shells, {} faces, schema {}",
        path.display(),
        scene.shells.len(),
        scene.face_count(),
        scene.metadata.schema().unwrap_or("unknown")
    );
    if let Some(name) = scene.metadata.file_name() {
        log::debug!("{}: exported as {}", path.display(), name);
    }
    Ok(scene)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn entry(name: &str, parameter: Parameter) -> HeaderEntry {
        HeaderEntry {
            name: name.to_string(),
            parameter,
        }
    }

    #[test]
    fn header_lookup() {
        let meta = StepMetadata {
            headers: vec![
                entry(
                    "FILE_DESCRIPTION",
                    Parameter::List(vec![Parameter::List(vec![]), Parameter::String("2;1".into())]),
                ),
                entry(
                    "FILE_NAME",
                    Parameter::List(vec![
                        Parameter::String("bracket.stp".into()),
                        Parameter::String("2024-01-01T00:00:00".into()),
                    ]),
                ),
                entry(
                    "FILE_SCHEMA",
                    Parameter::List(vec![Parameter::List(vec![Parameter::String(
                        "AUTOMOTIVE_DESIGN".into(),
                    )])]),
                ),
            ],
            entity_count: 42,
        };
        assert_eq!(meta.file_name(), Some("bracket.stp"));
        assert_eq!(meta.schema(), Some("AUTOMOTIVE_DESIGN"));
        assert!(meta.header("FILE_DESCRIPTION").is_some());
        assert!(meta.header("NOPE").is_none());
        assert_eq!(StepMetadata::default().schema(), None);
    }

    #[test]
    fn missing_file_is_a_parse_error() {
        let err = load_step_file(Path::new("does/not/exist.step"), 0.005).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.step");
        std::fs::write(&path, "this is not an ISO-10303-21 file").unwrap();
        let err = load_step_file(&path, 0.005).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
    }
}
