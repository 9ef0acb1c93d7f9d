//! The seam between the render driver and whatever reads and draws CAD data.

use crate::config::Resolution;
use crate::error::RenderError;
use crate::views::ViewDirection;
use std::path::Path;

pub const WHITE: [f32; 3] = [1.0, 1.0, 1.0];

/// Reads CAD files and hands out offscreen views that can display them.
/// Implemented by [`SoftwareBackend`](crate::SoftwareBackend).
pub trait CadBackend {
    /// Displayable shape produced by [`CadBackend::read_step`].
    type Shape;
    type View: OffscreenView<Shape = Self::Shape>;

    /// Parse a STEP file into a displayable shape.
    fn read_step(&self, path: &Path) -> Result<Self::Shape, RenderError>;

    /// A fresh view with nothing displayed.
    fn create_view(&self) -> Result<Self::View, RenderError>;
}

/// A 3D view rendered into memory rather than a window.
pub trait OffscreenView {
    type Shape;

    fn set_background(&mut self, rgb: [f32; 3]);

    fn set_size(&mut self, resolution: Resolution);

    /// Show `shape` with lit, solid surfaces.
    fn display_shaded(&mut self, shape: &Self::Shape);

    /// Frame everything displayed. Later projection changes keep this scale.
    fn fit_all(&mut self) -> Result<(), RenderError>;

    /// Look at the model from `direction` (scene toward eye).
    fn set_proj(&mut self, direction: ViewDirection);

    fn redraw(&mut self) -> Result<(), RenderError>;

    /// Write the current frame as a PNG.
    fn dump(&self, path: &Path) -> Result<(), RenderError>;
}
