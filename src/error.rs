use std::path::{Path, PathBuf};

/// Coarse classification of a [`RenderError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// The input is not a readable STEP model.
    Parse,
    /// The offscreen view failed while producing a frame.
    Render,
    /// Filesystem, image encoding or archive failures.
    Io,
    /// Invalid settings or arguments.
    Config,
}

/// Errors raised while rendering a batch.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("failed to read STEP file {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("render failed: {0}")]
    Render(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write image {}: {source}", path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to write archive {}: {source}", path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl RenderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RenderError::Parse { .. } => ErrorKind::Parse,
            RenderError::Render(_) => ErrorKind::Render,
            RenderError::Io { .. } | RenderError::Image { .. } | RenderError::Archive { .. } => {
                ErrorKind::Io
            }
            RenderError::Config(_) => ErrorKind::Config,
        }
    }

    pub(crate) fn parse(path: &Path, message: impl Into<String>) -> Self {
        RenderError::Parse {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }

    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        RenderError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        let p = Path::new("part.step");
        assert_eq!(RenderError::parse(p, "bad").kind(), ErrorKind::Parse);
        assert_eq!(RenderError::Render("x".into()).kind(), ErrorKind::Render);
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(RenderError::io(p, io).kind(), ErrorKind::Io);
        assert_eq!(RenderError::Config("x".into()).kind(), ErrorKind::Config);
    }

    #[test]
    fn parse_message_names_the_file() {
        let err = RenderError::parse(Path::new("bracket.stp"), "no shells");
        assert!(err.to_string().contains("bracket.stp"));
        assert!(err.to_string().contains("no shells"));
    }
}
