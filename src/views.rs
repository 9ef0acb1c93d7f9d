//! Camera directions sampled over a sphere.

use crate::error::RenderError;

/// Angular step used for the capture grid unless configured otherwise.
pub const DEFAULT_VIEW_STEP: u32 = 25;

/// Unit vector pointing from the scene toward the camera.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewDirection {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl ViewDirection {
    pub fn as_array(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    pub fn length(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

fn check_step(step: u32) -> Result<(), RenderError> {
    if (1..=180).contains(&step) {
        Ok(())
    } else {
        Err(RenderError::Config(format!(
            "view step must be between 1 and 180 degrees, got {step}"
        )))
    }
}

/// Number of directions [`spherical_views`] yields for `step`.
pub fn view_count(step: u32) -> Result<usize, RenderError> {
    check_step(step)?;
    let elevations = 180 / step as usize + 1;
    let azimuths = 360_usize.div_ceil(step as usize);
    Ok(elevations * azimuths)
}

/// Generate view directions by walking elevation from -90° to +90° (inclusive)
/// and, for each elevation, azimuth from 0° up to but excluding 360°.
///
/// The order is the capture order. Elevation only reaches +90° when `step`
/// divides 180; every azimuth of a pole ring is emitted even though those
/// samples coincide.
pub fn spherical_views(step: u32) -> Result<Vec<ViewDirection>, RenderError> {
    let mut views = Vec::with_capacity(view_count(step)?);
    let step = step as usize;

    for elevation in (-90_i32..=90).step_by(step) {
        let el = f64::from(elevation).to_radians();
        for azimuth in (0_i32..360).step_by(step) {
            let az = f64::from(azimuth).to_radians();
            views.push(ViewDirection {
                x: el.cos() * az.cos(),
                y: el.cos() * az.sin(),
                z: el.sin(),
            });
        }
    }

    Ok(views)
}
