//! CPU rasterizer standing in for a native offscreen viewer.
//!
//! Projection is orthographic. [`SoftwareView::fit_all`] measures the bounding
//! sphere of everything displayed, so the model keeps the same scale from
//! every direction on the capture sphere.

use crate::config::{RenderSettings, Resolution};
use crate::error::RenderError;
use crate::step_loader::{StepScene, load_step_file};
use crate::viewer::{CadBackend, OffscreenView, WHITE};
use crate::views::ViewDirection;
use image::{ImageFormat, Rgb, RgbImage};
use std::path::Path;
use truck_meshalgo::prelude::*;

const FIT_MARGIN: f64 = 1.05;
const AMBIENT: f32 = 0.25;
const DIFFUSE: f32 = 0.75;

/// Reads STEP files with the truck stack and draws them in software.
#[derive(Clone, Debug)]
pub struct SoftwareBackend {
    pub tolerance_factor: f64,
    pub model_color: [f32; 3],
}

impl Default for SoftwareBackend {
    fn default() -> Self {
        Self::from_settings(&RenderSettings::default())
    }
}

impl SoftwareBackend {
    pub fn from_settings(settings: &RenderSettings) -> Self {
        Self {
            tolerance_factor: settings.tessellation_factor,
            model_color: settings.model_color,
        }
    }
}

impl CadBackend for SoftwareBackend {
    type Shape = StepScene;
    type View = SoftwareView;

    fn read_step(&self, path: &Path) -> Result<StepScene, RenderError> {
        load_step_file(path, self.tolerance_factor)
    }

    fn create_view(&self) -> Result<SoftwareView, RenderError> {
        Ok(SoftwareView::new(self.model_color))
    }
}

#[derive(Clone, Copy, Debug)]
struct Vertex {
    pos: [f64; 3],
    normal: Option<[f64; 3]>,
}

type Triangle = [Vertex; 3];

#[derive(Clone, Copy, Debug)]
struct Fit {
    center: [f64; 3],
    radius: f64,
}

/// Orthonormal camera frame. `back` points from the scene toward the eye.
#[derive(Clone, Copy, Debug)]
struct Camera {
    right: [f64; 3],
    up: [f64; 3],
    back: [f64; 3],
}

impl Camera {
    fn looking_from(direction: ViewDirection) -> Self {
        let back = normalize(direction.as_array());
        // +Z is up except when looking straight along it
        let world_up = if back[2].abs() > 0.999 {
            [0.0, 1.0, 0.0]
        } else {
            [0.0, 0.0, 1.0]
        };
        let right = normalize(cross(world_up, back));
        let up = cross(back, right);
        Self { right, up, back }
    }

    /// Key light slightly above and left of the eye.
    fn light(&self) -> [f64; 3] {
        normalize(add(
            self.back,
            add(scale(self.up, 0.5), scale(self.right, -0.3)),
        ))
    }
}

pub struct SoftwareView {
    background: [f32; 3],
    model_color: [f32; 3],
    resolution: Resolution,
    triangles: Vec<Triangle>,
    fit: Option<Fit>,
    camera: Camera,
    frame: Option<RgbImage>,
}

impl SoftwareView {
    pub fn new(model_color: [f32; 3]) -> Self {
        Self {
            background: WHITE,
            model_color,
            resolution: Resolution::default(),
            triangles: Vec::new(),
            fit: None,
            camera: Camera::looking_from(ViewDirection {
                x: 0.0,
                y: 0.0,
                z: 1.0,
            }),
            frame: None,
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// Last frame produced by [`OffscreenView::redraw`].
    pub fn frame(&self) -> Option<&RgbImage> {
        self.frame.as_ref()
    }

    fn display_mesh(&mut self, mesh: &PolygonMesh) {
        let positions = mesh.positions();
        let normals = mesh.normals();
        let vertex = |pos: usize, nor: Option<usize>| Vertex {
            pos: [positions[pos].x, positions[pos].y, positions[pos].z],
            normal: nor
                .and_then(|n| normals.get(n))
                .map(|n| [n.x, n.y, n.z]),
        };

        for tri in mesh.tri_faces() {
            self.triangles.push([
                vertex(tri[0].pos, tri[0].nor),
                vertex(tri[1].pos, tri[1].nor),
                vertex(tri[2].pos, tri[2].nor),
            ]);
        }

        for quad in mesh.quad_faces() {
            let q = [
                vertex(quad[0].pos, quad[0].nor),
                vertex(quad[1].pos, quad[1].nor),
                vertex(quad[2].pos, quad[2].nor),
                vertex(quad[3].pos, quad[3].nor),
            ];
            self.triangles.push([q[0], q[1], q[2]]);
            self.triangles.push([q[0], q[2], q[3]]);
        }

        for face in mesh.other_faces() {
            if face.len() < 3 {
                continue;
            }
            let first = vertex(face[0].pos, face[0].nor);
            face.windows(2).skip(1).for_each(|w| {
                self.triangles
                    .push([first, vertex(w[0].pos, w[0].nor), vertex(w[1].pos, w[1].nor)]);
            });
        }
    }

    fn shade(&self, tri: &Triangle, weights: [f64; 3], light: [f64; 3]) -> Rgb<u8> {
        let normal = match (tri[0].normal, tri[1].normal, tri[2].normal) {
            (Some(a), Some(b), Some(c)) => normalize(add(
                scale(a, weights[0]),
                add(scale(b, weights[1]), scale(c, weights[2])),
            )),
            _ => face_normal(tri),
        };
        // Two-sided: open shells and flipped faces still read as lit surfaces.
        let lambert = dot(normal, light).abs() as f32;
        let intensity = AMBIENT + DIFFUSE * lambert.min(1.0);
        Rgb(self.model_color.map(|c| to_byte(c * intensity)))
    }
}

impl OffscreenView for SoftwareView {
    type Shape = StepScene;

    fn set_background(&mut self, rgb: [f32; 3]) {
        self.background = rgb;
    }

    fn set_size(&mut self, resolution: Resolution) {
        self.resolution = resolution;
        self.frame = None;
    }

    fn display_shaded(&mut self, shape: &StepScene) {
        for mesh in shape.meshes() {
            self.display_mesh(mesh);
        }
        log::debug!("Displaying {} triangles", self.triangles.len());
    }

    fn fit_all(&mut self) -> Result<(), RenderError> {
        if self.triangles.is_empty() {
            return Err(RenderError::Render("nothing displayed to fit".into()));
        }

        let mut min = [f64::MAX; 3];
        let mut max = [f64::MIN; 3];
        for v in self.triangles.iter().flatten() {
            for i in 0..3 {
                min[i] = min[i].min(v.pos[i]);
                max[i] = max[i].max(v.pos[i]);
            }
        }

        let center = scale(add(min, max), 0.5);
        let radius = self
            .triangles
            .iter()
            .flatten()
            .map(|v| length(sub(v.pos, center)))
            .fold(0.0_f64, f64::max);
        let radius = if radius.is_normal() { radius } else { 1.0 };

        log::debug!(
            "Fit: center=({:.3}, {:.3}, {:.3}), radius={:.3}",
            center[0],
            center[1],
            center[2],
            radius
        );
        self.fit = Some(Fit { center, radius });
        Ok(())
    }

    fn set_proj(&mut self, direction: ViewDirection) {
        self.camera = Camera::looking_from(direction);
    }

    fn redraw(&mut self) -> Result<(), RenderError> {
        let fit = self
            .fit
            .ok_or_else(|| RenderError::Render("redraw before fit_all".into()))?;

        let width = self.resolution.width();
        let height = self.resolution.height();
        let (w, h) = (f64::from(width), f64::from(height));
        let half = fit.radius * FIT_MARGIN;
        let (half_w, half_h) = if w >= h {
            (half * w / h, half)
        } else {
            (half, half * h / w)
        };

        let background = Rgb(self.background.map(to_byte));
        let mut frame = RgbImage::from_pixel(width, height, background);
        let mut depth = vec![f64::NEG_INFINITY; (width * height) as usize];
        let camera = self.camera;
        let light = camera.light();

        // Screen space: x right, y down, z toward the eye.
        let project = |p: [f64; 3]| {
            let rel = sub(p, fit.center);
            [
                (dot(rel, camera.right) / half_w + 1.0) * 0.5 * w,
                (1.0 - dot(rel, camera.up) / half_h) * 0.5 * h,
                dot(rel, camera.back),
            ]
        };

        for tri in &self.triangles {
            let s = tri.map(|v| project(v.pos));
            let area = edge(s[0], s[1], s[2]);
            if area.abs() < 1e-12 {
                continue;
            }

            let x0 = s.iter().map(|p| p[0]).fold(f64::MAX, f64::min).floor().max(0.0) as u32;
            let x1 = s.iter().map(|p| p[0]).fold(f64::MIN, f64::max).ceil().min(w) as u32;
            let y0 = s.iter().map(|p| p[1]).fold(f64::MAX, f64::min).floor().max(0.0) as u32;
            let y1 = s.iter().map(|p| p[1]).fold(f64::MIN, f64::max).ceil().min(h) as u32;

            for y in y0..y1 {
                for x in x0..x1 {
                    let p = [f64::from(x) + 0.5, f64::from(y) + 0.5, 0.0];
                    let weights = [
                        edge(s[1], s[2], p) / area,
                        edge(s[2], s[0], p) / area,
                        edge(s[0], s[1], p) / area,
                    ];
                    if weights.iter().any(|&b| b < 0.0) {
                        continue;
                    }
                    let z = weights[0] * s[0][2] + weights[1] * s[1][2] + weights[2] * s[2][2];
                    let idx = (y * width + x) as usize;
                    if z > depth[idx] {
                        depth[idx] = z;
                        frame.put_pixel(x, y, self.shade(tri, weights, light));
                    }
                }
            }
        }

        self.frame = Some(frame);
        Ok(())
    }

    fn dump(&self, path: &Path) -> Result<(), RenderError> {
        let frame = self
            .frame
            .as_ref()
            .ok_or_else(|| RenderError::Render("dump before redraw".into()))?;
        frame
            .save_with_format(path, ImageFormat::Png)
            .map_err(|source| RenderError::Image {
                path: path.to_path_buf(),
                source,
            })
    }
}

fn to_byte(c: f32) -> u8 {
    (c.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn edge(a: [f64; 3], b: [f64; 3], p: [f64; 3]) -> f64 {
    (b[0] - a[0]) * (p[1] - a[1]) - (b[1] - a[1]) * (p[0] - a[0])
}

fn face_normal(tri: &Triangle) -> [f64; 3] {
    normalize(cross(
        sub(tri[1].pos, tri[0].pos),
        sub(tri[2].pos, tri[0].pos),
    ))
}

fn add(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

fn sub(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn scale(a: [f64; 3], s: f64) -> [f64; 3] {
    [a[0] * s, a[1] * s, a[2] * s]
}

fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn length(a: [f64; 3]) -> f64 {
    dot(a, a).sqrt()
}

fn normalize(v: [f64; 3]) -> [f64; 3] {
    let len = length(v);
    if len < 1e-10 {
        [0.0, 0.0, 1.0]
    } else {
        scale(v, 1.0 / len)
    }
}

fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}
