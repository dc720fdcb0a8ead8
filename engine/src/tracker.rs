//! Head-direction grid localization.
//!
//! A depth camera reports the user's head pose as a ray (direction plus
//! head center). Two calibrated planes anchor that ray in the shared
//! workspace: the tabletop, divided into the 6x3 grid, and the agent's
//! monitor, which maps to the person pseudo-cell. Each plane carries a
//! homography, solved from four sighted corners, that corrects the
//! systematic offset between where heads point and where eyes look.

use nalgebra::{DMatrix, DVector, Matrix3, Matrix4, Vector2, Vector3, Vector4};
use thiserror::Error;
use tracing::info;

use crate::grid::{NO_GAZE, PERSON_CELL};

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("malformed head ray line: {0:?}")]
    MalformedRay(String),
    #[error("calibration needs {expected} rays, got {actual}")]
    NotEnoughRays { expected: usize, actual: usize },
    #[error("calibration file needs at least 8 lines, got {0}")]
    ShortCalibrationFile(usize),
    #[error("homography solve failed: {0}")]
    Homography(String),
}

// ── Head ray ────────────────────────────────────────────────

/// A head-pose ray in camera coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeadRay {
    pub origin: Vector3<f64>,
    pub direction: Vector3<f64>,
}

impl HeadRay {
    pub fn new(origin: Vector3<f64>, direction: Vector3<f64>) -> Self {
        Self {
            origin,
            direction: direction.normalize(),
        }
    }

    pub fn point_at(&self, t: f64) -> Vector3<f64> {
        self.origin + self.direction * t
    }

    /// Parse a tracker line `dx,dy,dz;ox,oy,oz` (direction first, as the
    /// camera process writes it).
    pub fn parse(line: &str) -> Result<Self, TrackerError> {
        let malformed = || TrackerError::MalformedRay(line.to_string());
        let mut halves = line.trim().split(';');
        let dir = parse_triple(halves.next().ok_or_else(malformed)?).ok_or_else(malformed)?;
        let origin = parse_triple(halves.next().ok_or_else(malformed)?).ok_or_else(malformed)?;
        if dir.norm() == 0.0 {
            return Err(malformed());
        }
        Ok(Self::new(origin, dir))
    }

    /// Serialize back into the tracker's line format.
    pub fn to_line(&self) -> String {
        format!(
            "{},{},{};{},{},{}",
            self.direction.x,
            self.direction.y,
            self.direction.z,
            self.origin.x,
            self.origin.y,
            self.origin.z
        )
    }
}

fn parse_triple(s: &str) -> Option<Vector3<f64>> {
    let mut parts = s.split(',');
    let x = parts.next()?.trim().parse().ok()?;
    let y = parts.next()?.trim().parse().ok()?;
    let z = parts.next()?.trim().parse().ok()?;
    Some(Vector3::new(x, y, z))
}

// ── Calibrated plane ────────────────────────────────────────

/// A bounded physical plane with a head-to-gaze homography.
#[derive(Debug, Clone)]
pub struct CalibratedPlane {
    corners: [Vector3<f64>; 4],
    normal: Vector3<f64>,
    offset: f64,
    width: f64,
    height: f64,
    /// Slack beyond the plane bounds before a hit counts as "off".
    pub error_buffer: f64,
    world_to_plane: Matrix4<f64>,
    homography: Matrix3<f64>,
}

impl CalibratedPlane {
    /// Build from the upper-left, upper-right, and lower-left corners;
    /// the fourth corner is implied.
    pub fn from_corners(p0: Vector3<f64>, p1: Vector3<f64>, p2: Vector3<f64>) -> Self {
        let p3 = p2 + (p1 - p0);
        let width_dir = (p1 - p0).normalize();
        let height_dir = (p2 - p0).normalize();
        let normal = (p1 - p0).cross(&(p2 - p0)).normalize();
        let offset = -normal.dot(&p0);
        let width = height_dir.cross(&(p1 - p0)).norm();
        let height = width_dir.cross(&(p2 - p0)).norm();

        let plane_to_world = Matrix4::new(
            width_dir.x, normal.x, height_dir.x, p0.x,
            width_dir.y, normal.y, height_dir.y, p0.y,
            width_dir.z, normal.z, height_dir.z, p0.z,
            0.0, 0.0, 0.0, 1.0,
        );
        let world_to_plane = plane_to_world
            .try_inverse()
            .unwrap_or_else(Matrix4::identity);

        Self {
            corners: [p0, p1, p2, p3],
            normal,
            offset,
            width,
            height,
            error_buffer: 0.1,
            world_to_plane,
            homography: Matrix3::identity(),
        }
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    /// Distance along the ray to the plane, 0 when the ray is parallel
    /// or the plane lies behind it.
    pub fn raycast(&self, ray: &HeadRay) -> f64 {
        let denom = self.normal.dot(&ray.direction);
        if denom.abs() < 1e-12 {
            return 0.0;
        }
        let t = -(self.normal.dot(&ray.origin) + self.offset) / denom;
        if t < 0.0 {
            0.0
        } else {
            t
        }
    }

    /// Project a world point into the plane's 2-D frame (origin at the
    /// upper-left corner, x across, y down).
    fn to_plane_coords(&self, p: &Vector3<f64>) -> Vector2<f64> {
        let h = self.world_to_plane * Vector4::new(p.x, p.y, p.z, 1.0);
        // The plane's own normal axis lands in the second component.
        Vector2::new(h.x, h.z)
    }

    fn apply_homography(&self, p: Vector2<f64>) -> Vector2<f64> {
        let h = self.homography * Vector3::new(p.x, p.y, 1.0);
        Vector2::new(h.x, h.y)
    }

    /// Corrected planar coordinates of a ray's hit point.
    pub fn hit_coords(&self, ray: &HeadRay) -> Vector2<f64> {
        let p = ray.point_at(self.raycast(ray));
        self.apply_homography(self.to_plane_coords(&p))
    }

    /// Whether the ray hits the plane within its (buffered) bounds.
    pub fn contains(&self, ray: &HeadRay) -> bool {
        let c = self.hit_coords(ray);
        c.x >= -self.error_buffer
            && c.x <= self.width + self.error_buffer
            && c.y >= -self.error_buffer
            && c.y <= self.height + self.error_buffer
    }

    /// Solve the head-to-gaze homography from four rays sighted at the
    /// plane's corners, in corner order. Least squares over the 12x8
    /// system for H = [a b c; d e f; g h 1].
    pub fn calibrate_homography(&mut self, rays: &[HeadRay]) -> Result<(), TrackerError> {
        if rays.len() < 4 {
            return Err(TrackerError::NotEnoughRays {
                expected: 4,
                actual: rays.len(),
            });
        }

        let mut observed = [Vector2::zeros(); 4];
        for i in 0..4 {
            let p = rays[i].point_at(self.raycast(&rays[i]));
            observed[i] = self.to_plane_coords(&p);
        }
        let canonical: Vec<Vector2<f64>> = self
            .corners
            .iter()
            .map(|c| self.to_plane_coords(c))
            .collect();

        let mut a = DMatrix::<f64>::zeros(12, 8);
        let mut b = DVector::<f64>::zeros(12);
        for i in 0..4 {
            a[(i * 3, 0)] = observed[i].x;
            a[(i * 3, 1)] = observed[i].y;
            a[(i * 3, 2)] = 1.0;

            a[(i * 3 + 1, 3)] = observed[i].x;
            a[(i * 3 + 1, 4)] = observed[i].y;
            a[(i * 3 + 1, 5)] = 1.0;

            a[(i * 3 + 2, 6)] = observed[i].x;
            a[(i * 3 + 2, 7)] = observed[i].y;

            b[i * 3] = canonical[i].x;
            b[i * 3 + 1] = canonical[i].y;
        }

        let svd = a.svd(true, true);
        let h = svd
            .solve(&b, 1e-12)
            .map_err(|e| TrackerError::Homography(e.to_string()))?;

        self.homography = Matrix3::new(
            h[0], h[1], h[2],
            h[3], h[4], h[5],
            h[6], h[7], 1.0,
        );
        Ok(())
    }

    /// Map a ray hit to a grid cell for a 6-column x 3-row surface.
    /// Planar y runs top-to-bottom while the grid counts rows
    /// bottom-to-top.
    pub fn grid_cell(&self, ray: &HeadRay) -> u8 {
        if !self.contains(ray) {
            return NO_GAZE;
        }
        let c = self.hit_coords(ray);
        let cell_w = self.width / 6.0;
        let cell_h = self.height / 3.0;

        let mut row = 0u8;
        for i in 1..3u8 {
            if c.y < f64::from(i) * cell_h {
                row = 3 - i;
                break;
            }
        }
        let mut col = 5u8;
        for i in 0..5u8 {
            if c.x < f64::from(i + 1) * cell_w {
                col = i;
                break;
            }
        }
        row * 6 + col + 1
    }
}

// ── Physical geometry ───────────────────────────────────────

/// Approximate placement of the camera relative to the table and the
/// agent's monitor, in meters and degrees.
#[derive(Debug, Clone)]
pub struct TrackerGeometry {
    pub distance_to_table_edge: f64,
    pub height_off_table: f64,
    pub camera_angle_deg: f64,
    pub monitor_width: f64,
    pub monitor_height: f64,
    pub horizontal_distance_to_monitor: f64,
    pub vertical_distance_to_monitor: f64,
}

impl Default for TrackerGeometry {
    fn default() -> Self {
        Self {
            distance_to_table_edge: 0.4,
            height_off_table: 0.3,
            camera_angle_deg: 20.0,
            monitor_width: 0.52,
            monitor_height: 0.32,
            horizontal_distance_to_monitor: 0.5,
            vertical_distance_to_monitor: 0.15,
        }
    }
}

/// The 1.2m x 0.6m tabletop plane implied by the camera placement.
pub fn table_plane(distance: f64, height: f64, angle_rad: f64) -> CalibratedPlane {
    let a = -angle_rad;
    let p0 = Vector3::new(-0.6, distance * a.sin() - height * a.cos(), distance * a.cos() + height * a.sin());
    let p1 = Vector3::new(0.6, distance * a.sin() - height * a.cos(), distance * a.cos() + height * a.sin());
    let p2 = Vector3::new(
        -0.6,
        (distance + 0.6) * a.sin() - height * a.cos(),
        (distance + 0.6) * a.cos() + height * a.sin(),
    );
    CalibratedPlane::from_corners(p0, p1, p2)
}

/// The monitor plane implied by the camera placement.
pub fn monitor_plane(
    distance: f64,
    height: f64,
    angle_rad: f64,
    width: f64,
    monitor_height: f64,
) -> CalibratedPlane {
    let a = -angle_rad;
    let halfwidth = width / 2.0;
    let top_y = -distance * a.sin() + (height + monitor_height) * a.cos();
    let top_z = -distance * a.cos() - (height + monitor_height) * a.sin();
    let bottom_y = -distance * a.sin() + height * a.cos();
    let bottom_z = -distance * a.cos() - height * a.sin();
    let p0 = Vector3::new(-halfwidth, top_y, top_z);
    let p1 = Vector3::new(halfwidth, top_y, top_z);
    let p2 = Vector3::new(-halfwidth, bottom_y, bottom_z);
    CalibratedPlane::from_corners(p0, p1, p2)
}

// ── Tracker ─────────────────────────────────────────────────

/// Localizes head-pose rays onto the grid: monitor hits read as gaze at
/// the agent, table hits as the underlying cell, everything else as no
/// gaze. Reports nothing until calibrated.
#[derive(Debug, Clone)]
pub struct HeadGazeTracker {
    table: CalibratedPlane,
    monitor: CalibratedPlane,
    calibrated: bool,
}

impl HeadGazeTracker {
    pub fn new(geometry: &TrackerGeometry) -> Self {
        let angle = geometry.camera_angle_deg.to_radians();
        Self {
            table: table_plane(
                geometry.distance_to_table_edge,
                geometry.height_off_table,
                angle,
            ),
            monitor: monitor_plane(
                geometry.horizontal_distance_to_monitor,
                geometry.vertical_distance_to_monitor,
                angle,
                geometry.monitor_width,
                geometry.monitor_height,
            ),
            calibrated: false,
        }
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibrated
    }

    /// Calibrate both homographies from four corner rays per surface.
    pub fn calibrate(
        &mut self,
        table_rays: &[HeadRay],
        monitor_rays: &[HeadRay],
    ) -> Result<(), TrackerError> {
        self.table.calibrate_homography(table_rays)?;
        self.monitor.calibrate_homography(monitor_rays)?;
        self.calibrated = true;
        info!("head tracker calibrated");
        Ok(())
    }

    /// Load a saved calibration: eight `dx,dy,dz;ox,oy,oz` lines, table
    /// corners first, then monitor corners.
    pub fn load_calibration(&mut self, text: &str) -> Result<(), TrackerError> {
        let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
        if lines.len() < 8 {
            return Err(TrackerError::ShortCalibrationFile(lines.len()));
        }
        let mut rays = Vec::with_capacity(8);
        for line in &lines[..8] {
            rays.push(HeadRay::parse(line)?);
        }
        self.calibrate(&rays[..4], &rays[4..8])
    }

    /// Serialize a calibration in the loadable line format.
    pub fn calibration_text(table_rays: &[HeadRay], monitor_rays: &[HeadRay]) -> String {
        table_rays
            .iter()
            .chain(monitor_rays.iter())
            .map(HeadRay::to_line)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Grid location the head ray points at.
    pub fn grid_location(&self, ray: &HeadRay) -> u8 {
        if !self.calibrated {
            return NO_GAZE;
        }
        if self.monitor.contains(ray) {
            return PERSON_CELL;
        }
        self.table.grid_cell(ray)
    }
}

// ── Tests ───────────────────────────────────────────────────
