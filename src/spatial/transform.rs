//! # Globe-to-Grid Transform
//!
//! Projects geographic points into the unit square and on into depth-4
//! Hilbert cells, and rasterizes disks and rectangles into cell sets.
//!
//! ## Forward path
//!
//! ```text
//! (lat, lon)
//!    │  longitude quadrant + meridian shift      (4 sectors of 90°)
//!    ▼
//! ray on the unit sphere
//!    │  intersect the plane X+Y+Z = 1            (positive octant)
//!    ▼
//! tangent-plane point
//!    │  one of 8 hemisphere/quadrant affine maps
//!    ▼
//! (x, y) ∈ [0,1]²
//!    │  16-way split at each of 4 levels, Hilbert index per level
//!    ▼
//! cell = 4 indices + depth
//! ```
//!
//! The inverse path exists for diagnostics and reverses each stage.
//!
//! ## Rasterization
//!
//! Disk and rectangle queries walk their boundary as a polyline in the
//! projected square, plot it with a Bresenham contour at 4x grid
//! resolution (so diagonal steps cannot leave holes), then scanline-fill
//! the interior at grid resolution 65,536. Boundaries that cross the
//! equator are split into per-hemisphere polygons closed along the
//! projected equator; quadrant crossings inside one hemisphere only insert
//! a midpoint, matching the projection's accuracy there.

use std::collections::BTreeSet;

use eyre::{ensure, Result};
use tracing::trace;

use crate::spatial::cell::{SpatialCell, GRID_HIGH, MAX_DEPTH};
use crate::spatial::hilbert;

pub const EARTH_RADIUS: f64 = 6_371_000.0;
pub const EARTH_MAJOR_RADIUS: f64 = 6_378_137.0;
pub const EARTH_MINOR_RADIUS: f64 = 6_356_752.314245;

const DEG_TO_RAD: f64 = 0.017453292519943296;
const RAD_TO_DEG: f64 = 57.295779513082321;
const FEPSILON: f64 = 1e-12;

/// Earth radius model for distances and destinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RadiusModel {
    /// Mean radius, 6 371 000 m everywhere.
    #[default]
    Mean,
    /// WGS-84 ellipsoid, interpolated between equator and pole by
    /// |latitude| / 90.
    Wgs84,
}

pub fn earth_radius(latitude: f64, model: RadiusModel) -> f64 {
    match model {
        RadiusModel::Mean => EARTH_RADIUS,
        RadiusModel::Wgs84 => {
            let t = (latitude.abs() / 90.0).min(1.0);
            EARTH_MAJOR_RADIUS - (EARTH_MAJOR_RADIUS - EARTH_MINOR_RADIUS) * t
        }
    }
}

/// Geographic point in degrees; latitude in [-90, 90], longitude in
/// [-180, 180].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl SpatialPoint {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        ensure!(
            Self::valid_latitude(latitude),
            "latitude {} outside [-90, 90]",
            latitude
        );
        ensure!(
            Self::valid_longitude(longitude),
            "longitude {} outside [-180, 180]",
            longitude
        );
        Ok(Self {
            latitude,
            longitude,
        })
    }

    pub fn valid_latitude(d: f64) -> bool {
        (-90.0..=90.0).contains(&d)
    }

    pub fn valid_longitude(d: f64) -> bool {
        (-180.0..=180.0).contains(&d)
    }

    pub fn is_pole(&self) -> bool {
        (self.latitude.abs() - 90.0).abs() <= FEPSILON
    }

    /// Wraps any longitude onto (-180, 180] (±180 preserved).
    pub fn norm_longitude(mut x: f64) -> f64 {
        while x > 180.0 {
            x -= 360.0;
        }
        while x < -180.0 {
            x += 360.0;
        }
        x
    }

    /// Wraps any latitude onto [-90, 90], reflecting across the poles.
    pub fn norm_latitude(mut x: f64) -> f64 {
        while x > 180.0 {
            x -= 360.0;
        }
        while x < -180.0 {
            x += 360.0;
        }
        if x > 90.0 {
            180.0 - x
        } else if x < -90.0 {
            -180.0 - x
        } else {
            x
        }
    }
}

impl std::fmt::Display for SpatialPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.latitude, self.longitude)
    }
}

/// Geographic rectangle; longitudes may wrap across ±180.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialRect {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl SpatialRect {
    pub fn new(min_lat: f64, min_lon: f64, max_lat: f64, max_lon: f64) -> Result<Self> {
        ensure!(
            SpatialPoint::valid_latitude(min_lat) && SpatialPoint::valid_latitude(max_lat),
            "rectangle latitude outside [-90, 90]"
        );
        ensure!(
            SpatialPoint::valid_longitude(min_lon) && SpatialPoint::valid_longitude(max_lon),
            "rectangle longitude outside [-180, 180]"
        );
        ensure!(min_lat <= max_lat, "min_lat {} above max_lat {}", min_lat, max_lat);
        Ok(Self {
            min_lat,
            min_lon,
            max_lat,
            max_lon,
        })
    }

    pub fn cross_equator(&self) -> bool {
        self.min_lat < 0.0 && self.max_lat > 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Point3D {
    x: f64,
    y: f64,
    z: f64,
}

impl Point3D {
    fn dot(self, o: Point3D) -> f64 {
        self.x * o.x + self.y * o.y + self.z * o.z
    }

    fn scale(self, d: f64) -> Point3D {
        Point3D {
            x: self.x * d,
            y: self.y * d,
            z: self.z * d,
        }
    }

    fn sub(self, o: Point3D) -> Point3D {
        Point3D {
            x: self.x - o.x,
            y: self.y - o.y,
            z: self.z - o.z,
        }
    }

    fn add(self, o: Point3D) -> Point3D {
        Point3D {
            x: self.x + o.x,
            y: self.y + o.y,
            z: self.z + o.z,
        }
    }

    fn length(self) -> f64 {
        self.dot(self).sqrt()
    }

    fn normalize(self) -> Point3D {
        self.scale(1.0 / self.length())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hemisphere {
    North,
    South,
}

fn latitude_hemisphere(lat: f64) -> Hemisphere {
    if lat >= 0.0 {
        Hemisphere::North
    } else {
        Hemisphere::South
    }
}

/// Longitude sector, one of four 90° spans centered on ±45 and ±135.
fn longitude_quadrant(x: f64) -> usize {
    if x >= 0.0 {
        if x < 45.0 {
            return 0;
        }
        if x < 135.0 {
            return 1;
        }
    } else {
        if x >= -45.0 {
            return 0;
        }
        if x >= -135.0 {
            return 3;
        }
    }
    2
}

/// Shifts a longitude into its quadrant's [0, 90] meridian range.
fn longitude_meridian(x: f64, q: usize) -> f64 {
    if x >= 0.0 {
        match q {
            0 => x + 45.0,
            1 => x - 45.0,
            _ => x - 135.0,
        }
    } else {
        match q {
            0 => x + 45.0,
            3 => x + 135.0,
            _ => x + 180.0 + 45.0,
        }
    }
}

fn reverse_longitude_meridian(x: f64, q: usize) -> f64 {
    match q {
        0 => x - 45.0,
        1 => x + 45.0,
        2 => {
            if x <= 45.0 {
                x + 135.0
            } else {
                x - 180.0 - 45.0
            }
        }
        _ => x - 135.0,
    }
}

fn cartesian(lat: f64, lon: f64) -> Point3D {
    let l = (lat * DEG_TO_RAD).cos();
    Point3D {
        x: l * (lon * DEG_TO_RAD).cos(),
        y: l * (lon * DEG_TO_RAD).sin(),
        z: (lat * DEG_TO_RAD).sin(),
    }
}

fn reverse_cartesian(p: Point3D) -> SpatialPoint {
    let latitude = if p.z >= 1.0 - FEPSILON {
        90.0
    } else if p.z <= -1.0 + FEPSILON {
        -90.0
    } else {
        p.z.asin() * RAD_TO_DEG
    };
    SpatialPoint {
        latitude,
        longitude: p.y.atan2(p.x) * RAD_TO_DEG,
    }
}

/// Intersects the globe ray for `(lat, lon)` (both in [0, 90]) with the
/// plane `X + Y + Z = 1` restricted to the positive octant.
fn line_plane_intersect(lat: f64, lon: f64) -> Point3D {
    debug_assert!((0.0..=90.0).contains(&lat));
    debug_assert!((0.0..=90.0).contains(&lon));
    let n = Point3D {
        x: 1.0,
        y: 1.0,
        z: 1.0,
    }
    .normalize();
    let ray = cartesian(lat, lon);
    let n_u = ray.dot(n);
    debug_assert!(n_u > 0.0);
    ray.scale(n.x / n_u)
}

fn reverse_line_plane_intersect(p: Point3D) -> SpatialPoint {
    reverse_cartesian(p.normalize())
}

const E1: Point3D = Point3D {
    x: 1.0,
    y: 0.0,
    z: 0.0,
};

fn tangent_axes() -> (Point3D, Point3D, f64, f64) {
    let e2 = Point3D {
        x: 0.0,
        y: 1.0,
        z: 0.0,
    };
    let e3 = Point3D {
        x: 0.0,
        y: 0.0,
        z: 1.0,
    };
    let mid = Point3D {
        x: 0.5,
        y: 0.5,
        z: 0.0,
    };
    let px = e2.sub(E1).normalize();
    let py = e3.sub(mid).normalize();
    let lx = e2.sub(E1).length();
    let ly = e3.sub(mid).length();
    (px, py, lx, ly)
}

/// Maps the tangent-plane point into the unit square; one of eight affine
/// cases by hemisphere and quadrant.
fn scale_plane_intersect(p3: Point3D, quad: usize, north: bool) -> Point2D {
    let (px, py, lx, ly) = tangent_axes();
    let v3 = p3.sub(E1);
    let mut p = Point2D {
        x: v3.dot(px),
        y: v3.dot(py),
    };

    if quad % 2 == 1 {
        p.x *= 1.0 / lx;
        p.y *= 0.25 / ly;
    } else {
        p.x *= 0.5 / lx;
        p.y *= 0.5 / ly;
    }

    if north {
        match quad {
            0 => Point2D {
                x: 1.0 - p.y,
                y: 0.5 + p.x,
            },
            1 => Point2D {
                x: 1.0 - p.x,
                y: 1.0 - p.y,
            },
            2 => Point2D {
                x: p.y,
                y: 1.0 - p.x,
            },
            _ => Point2D {
                x: p.x,
                y: 0.5 + p.y,
            },
        }
    } else {
        match quad {
            0 => Point2D {
                x: 1.0 - p.y,
                y: 0.5 - p.x,
            },
            1 => Point2D {
                x: 1.0 - p.x,
                y: p.y,
            },
            2 => Point2D { x: p.y, y: p.x },
            _ => Point2D {
                x: p.x,
                y: 0.5 - p.y,
            },
        }
    }
}

fn reverse_scale_plane_intersect(ret: Point2D, quad: usize, north: bool) -> Point3D {
    let (px, py, lx, ly) = tangent_axes();
    let mut p = if north {
        match quad {
            0 => Point2D {
                y: 1.0 - ret.x,
                x: ret.y - 0.5,
            },
            1 => Point2D {
                x: 1.0 - ret.x,
                y: 1.0 - ret.y,
            },
            2 => Point2D {
                y: ret.x,
                x: 1.0 - ret.y,
            },
            _ => Point2D {
                x: ret.x,
                y: ret.y - 0.5,
            },
        }
    } else {
        match quad {
            0 => Point2D {
                y: 1.0 - ret.x,
                x: 0.5 - ret.y,
            },
            1 => Point2D {
                x: 1.0 - ret.x,
                y: ret.y,
            },
            2 => Point2D {
                y: ret.x,
                x: ret.y,
            },
            _ => Point2D {
                x: ret.x,
                y: 0.5 - ret.y,
            },
        }
    };
    if quad % 2 == 1 {
        p.x /= 1.0 / lx;
        p.y /= 0.25 / ly;
    } else {
        p.x /= 0.5 / lx;
        p.y /= 0.5 / ly;
    }
    E1.add(px.scale(p.x)).add(py.scale(p.y))
}

fn point_hemisphere(p: Point2D) -> Hemisphere {
    if p.y >= 0.5 {
        Hemisphere::North
    } else {
        Hemisphere::South
    }
}

/// Quadrant of a projected point, classified by polar angle around the
/// hemisphere's pole image.
fn point_quadrant(p: Point2D) -> usize {
    let is_north = p.y >= 0.5;
    let pole = Point2D {
        x: 0.5,
        y: if is_north { 0.75 } else { 0.25 },
    };
    let mut arg = (p.y - pole.y).atan2(p.x - pole.x);
    if !is_north {
        arg = -arg;
    }
    let atan_1_2 = 0.5f64.atan();
    if arg >= 0.0 {
        if arg <= atan_1_2 {
            return 0;
        }
        if arg <= std::f64::consts::PI - atan_1_2 {
            return 1;
        }
    } else {
        if arg >= -atan_1_2 {
            return 0;
        }
        if arg >= atan_1_2 - std::f64::consts::PI {
            return 3;
        }
    }
    2
}

fn project_globe_hemi(s: SpatialPoint, h: Hemisphere) -> Point2D {
    let quad = longitude_quadrant(s.longitude);
    let meridian = longitude_meridian(s.longitude, quad);
    let lat = match h {
        Hemisphere::North => s.latitude,
        Hemisphere::South => -s.latitude,
    };
    let p3 = line_plane_intersect(lat, meridian);
    scale_plane_intersect(p3, quad, h == Hemisphere::North)
}

/// Projects a point to the unit square.
pub fn project_globe(s: SpatialPoint) -> Point2D {
    project_globe_hemi(s, latitude_hemisphere(s.latitude))
}

/// Inverse of [`project_globe`], used for diagnostics.
pub fn reverse_project_globe(p: Point2D) -> SpatialPoint {
    let quad = point_quadrant(p);
    let is_north = point_hemisphere(p) == Hemisphere::North;
    let p3 = reverse_scale_plane_intersect(p, quad, is_north);
    let mut ret = reverse_line_plane_intersect(p3);
    if !is_north {
        ret.latitude = -ret.latitude;
    }
    if (ret.latitude.abs() - 90.0).abs() <= FEPSILON {
        ret.longitude = 0.0;
    } else {
        ret.longitude = reverse_longitude_meridian(ret.longitude, quad);
    }
    ret
}

fn min_max(v: f64, max: i32) -> i32 {
    (v as i32).clamp(0, max)
}

/// Unit-square point to depth-4 cell by 16-way splits.
fn globe_to_cell(globe: Point2D) -> SpatialCell {
    let mut id = [0u8; 4];
    let mut pos = globe;
    for level in id.iter_mut() {
        let hx = min_max(16.0 * pos.x, 15);
        let hy = min_max(16.0 * pos.y, 15);
        *level = hilbert::xy_to_dist(hx as u32, hy as u32);
        pos = Point2D {
            x: 16.0 * pos.x - hx as f64,
            y: 16.0 * pos.y - hy as f64,
        };
    }
    SpatialCell::new(id, MAX_DEPTH)
}

/// Depth-4-resolution grid coordinates to a cell, by div/mod cascade.
fn make_cell_xy(x: i32, y: i32) -> SpatialCell {
    debug_assert!((0..GRID_HIGH).contains(&x) && (0..GRID_HIGH).contains(&y));
    let (s0, s1, s2) = (16, 256, 4096);
    let (h0x, h0y) = (x / s2, y / s2);
    let (p1x, p1y) = (x % s2, y % s2);
    let (h1x, h1y) = (p1x / s1, p1y / s1);
    let (p2x, p2y) = (p1x % s1, p1y % s1);
    let (h2x, h2y) = (p2x / s0, p2y / s0);
    let (h3x, h3y) = (p2x % s0, p2y % s0);
    SpatialCell::new(
        [
            hilbert::xy_to_dist(h0x as u32, h0y as u32),
            hilbert::xy_to_dist(h1x as u32, h1y as u32),
            hilbert::xy_to_dist(h2x as u32, h2y as u32),
            hilbert::xy_to_dist(h3x as u32, h3y as u32),
        ],
        MAX_DEPTH,
    )
}

/// Geographic point to its depth-4 cell.
pub fn point_to_cell(p: SpatialPoint) -> SpatialCell {
    globe_to_cell(project_globe(p))
}

/// Lower-left corner of a cell in the unit square.
pub fn cell_to_point(cell: &SpatialCell) -> Point2D {
    let mut pos = Point2D { x: 0.0, y: 0.0 };
    let mut f = 1.0 / 16.0;
    for level in 0..cell.depth as usize {
        let (x, y) = hilbert::dist_to_xy(cell.id[level]);
        pos.x += x as f64 * f;
        pos.y += y as f64 * f;
        f /= 16.0;
    }
    pos
}

/// Geographic location of a cell's corner; diagnostic inverse of
/// [`point_to_cell`].
pub fn cell_to_latlon(cell: &SpatialCell) -> SpatialPoint {
    reverse_project_globe(cell_to_point(cell))
}

/// Great-circle distance in the units of `radius`.
pub fn haversine(p1: SpatialPoint, p2: SpatialPoint, radius: f64) -> f64 {
    let dlon = DEG_TO_RAD * (p2.longitude - p1.longitude);
    let dlat = DEG_TO_RAD * (p2.latitude - p1.latitude);
    let sin_lat = (dlat / 2.0).sin();
    let sin_lon = (dlon / 2.0).sin();
    let a = sin_lat * sin_lat
        + (DEG_TO_RAD * p1.latitude).cos() * (DEG_TO_RAD * p2.latitude).cos() * sin_lon * sin_lon;
    2.0 * a.sqrt().min(1.0).asin() * radius
}

/// Great-circle distance in meters under the chosen radius model.
pub fn distance(p1: SpatialPoint, p2: SpatialPoint, model: RadiusModel) -> f64 {
    haversine(
        p1,
        p2,
        earth_radius((p1.latitude + p2.latitude) / 2.0, model),
    )
}

fn latitude_pole(lat: f64) -> bool {
    (lat.abs() - 90.0).abs() <= FEPSILON
}

/// Destination point by spherical direct formula. Bearing is clockwise
/// from north in degrees; from a pole every bearing is a meridian, so the
/// destination longitude is the bearing itself.
pub fn destination(
    p: SpatialPoint,
    distance_m: f64,
    bearing_deg: f64,
    model: RadiusModel,
) -> SpatialPoint {
    if distance_m <= 0.0 {
        return p;
    }
    let radius = earth_radius(p.latitude, model);
    let dist = distance_m / radius;
    let brng = bearing_deg * DEG_TO_RAD;
    let lat1 = p.latitude * DEG_TO_RAD;
    let lon1 = p.longitude * DEG_TO_RAD;
    let lat2 = (lat1.sin() * dist.cos() + lat1.cos() * dist.sin() * brng.cos()).asin();
    let x = dist.cos() - lat1.sin() * lat2.sin();
    let y = brng.sin() * dist.sin() * lat1.cos();
    let lon2 = lon1 + y.atan2(x);
    SpatialPoint {
        latitude: SpatialPoint::norm_latitude(lat2 * RAD_TO_DEG),
        longitude: if latitude_pole(p.latitude) {
            SpatialPoint::norm_longitude(bearing_deg)
        } else {
            SpatialPoint::norm_longitude(lon2 * RAD_TO_DEG)
        },
    }
}

fn add_latitude(a: f64, b: f64) -> f64 {
    SpatialPoint::norm_latitude(a + b)
}

fn add_longitude(a: f64, b: f64) -> f64 {
    SpatialPoint::norm_longitude(a + b)
}

/// Bounding rectangle of a disk. `None` when the disk wraps a pole.
pub fn destination_rect(
    center: SpatialPoint,
    radius_m: f64,
    model: RadiusModel,
) -> Option<SpatialRect> {
    let degree = RAD_TO_DEG * radius_m / earth_radius(center.latitude, model);
    let min_lat = add_latitude(center.latitude, -degree);
    let max_lat = add_latitude(center.latitude, degree);
    if max_lat != center.latitude + degree || min_lat != center.latitude - degree {
        return None;
    }
    Some(SpatialRect {
        min_lat,
        max_lat,
        min_lon: destination(center, radius_m, 270.0, model).longitude,
        max_lon: destination(center, radius_m, 90.0, model).longitude,
    })
}

/// Whether the meridian `mid` lies strictly between `left` and `right`
/// going eastward.
fn cross_longitude(mid: f64, left: f64, right: f64) -> bool {
    let wrap = |x: f64| if x < 0.0 { x + 360.0 } else { x };
    let (mid, left, right) = (wrap(mid), wrap(left), wrap(right));
    if left <= right {
        left < mid && mid < right
    } else {
        left < mid || mid < right
    }
}

/// Eastward span from `left` to `right` in degrees, in [0, 360).
fn longitude_distance(left: f64, right: f64) -> f64 {
    let wrap = |x: f64| if x < 0.0 { x + 360.0 } else { x };
    let (left, right) = (wrap(left), wrap(right));
    if left <= right {
        right - left
    } else {
        360.0 - (left - right)
    }
}

/// Sorted quadrant boundary meridians.
const SORTED_QUADRANT: [f64; 4] = [-135.0, -45.0, 45.0, 135.0];

/// Ordered set of depth-4 cells produced by rasterization.
#[derive(Debug, Default, Clone)]
pub struct CellSet {
    cells: BTreeSet<[u8; 4]>,
}

impl CellSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, cell: SpatialCell) -> bool {
        debug_assert_eq!(cell.depth, MAX_DEPTH);
        self.cells.insert(cell.id)
    }

    pub fn contains(&self, cell: &SpatialCell) -> bool {
        self.cells.contains(&cell.id)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Cells in lexicographic (cell) order.
    pub fn iter(&self) -> impl Iterator<Item = SpatialCell> + '_ {
        self.cells.iter().map(|id| SpatialCell::new(*id, MAX_DEPTH))
    }
}

/// Plots the closed polyline with Bresenham at 4x grid resolution and
/// inserts every boundary cell; returns the deduplicated grid vertices for
/// the interior fill.
fn plot_contour(out: &mut CellSet, verts: &[Point2D]) -> Vec<(i32, i32)> {
    const SCALE_ID: i32 = 4;
    let max_id = GRID_HIGH * SCALE_ID;
    let mut plotted: Vec<(i32, i32)> = Vec::new();
    let mut old = (-1i32, -1i32);
    let n = verts.len();
    let mut j = n - 1;
    for i in 0..n {
        let p1 = verts[j];
        let p2 = verts[i];
        j = i;

        let mut x0 = min_max(max_id as f64 * p1.x, max_id - 1);
        let mut y0 = min_max(max_id as f64 * p1.y, max_id - 1);
        let x1 = min_max(max_id as f64 * p2.x, max_id - 1);
        let y1 = min_max(max_id as f64 * p2.y, max_id - 1);
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;

        loop {
            let point = (x0 / SCALE_ID, y0 / SCALE_ID);
            if point != old {
                plotted.push(point);
                out.insert(make_cell_xy(point.0, point.1));
                old = point;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                if x0 == x1 {
                    break;
                }
                err += dy;
                x0 += sx;
            }
            if e2 <= dx {
                if y0 == y1 {
                    break;
                }
                err += dx;
                y0 += sy;
            }
        }
    }
    plotted
}

/// Scanline fill of the area strictly inside the plotted contour.
fn fill_internal_area(out: &mut CellSet, verts: &[(i32, i32)]) {
    if verts.is_empty() {
        return;
    }
    let min_y = verts.iter().map(|p| p.1).min().unwrap();
    let max_y = verts.iter().map(|p| p.1).max().unwrap();
    let n = verts.len();
    let mut node_x: Vec<i32> = Vec::with_capacity(16);

    for pixel_y in min_y..=max_y {
        node_x.clear();
        let mut j = n - 1;
        for i in 0..n {
            let p1 = verts[j];
            let p2 = verts[i];
            j = i;
            if (p1.1 > pixel_y) != (p2.1 > pixel_y) {
                let x = p2.0 as f64
                    + (pixel_y - p2.1) as f64 * (p1.0 - p2.0) as f64 / (p1.1 - p2.1) as f64;
                node_x.push(x as i32);
            }
        }
        node_x.sort_unstable();
        let mut k = 0;
        while k + 1 < node_x.len() {
            let (x1, x2) = (node_x[k], node_x[k + 1]);
            k += 2;
            for pixel_x in x1 + 1..x2 {
                out.insert(make_cell_xy(pixel_x, pixel_y));
            }
        }
    }
}

fn fill_poly(out: &mut CellSet, verts: &[Point2D]) {
    if verts.is_empty() {
        return;
    }
    let contour = plot_contour(out, verts);
    fill_internal_area(out, &contour);
}

/// Samples the parallel at `lat` from `lon1` to `lon2` (reversed when
/// `reverse`), projected with hemisphere `h`, including both endpoints.
/// One sample per ~100 km, odd count, at least 3.
fn poly_latitude(dest: &mut Vec<Point2D>, lat: f64, lon1: f64, lon2: f64, h: Hemisphere, reverse: bool) {
    let (start, end) = if reverse { (lon2, lon1) } else { (lon1, lon2) };
    let span = longitude_distance(lon1, lon2);
    let step_span = if reverse { -span } else { span };
    let p1 = SpatialPoint {
        latitude: lat,
        longitude: start,
    };
    let p2 = SpatialPoint {
        latitude: lat,
        longitude: end,
    };
    let meters = haversine(p1, p2, EARTH_RADIUS);
    let num = 3 + (meters / 100_000.0) as usize * 2;
    let step = step_span / (num + 1) as f64;
    dest.push(project_globe_hemi(p1, h));
    for i in 1..=num {
        let mid = SpatialPoint {
            latitude: lat,
            longitude: add_longitude(start, step * i as f64),
        };
        dest.push(project_globe_hemi(mid, h));
    }
    dest.push(project_globe_hemi(p2, h));
}

/// Rectangle outline as the two sampled parallels (out along the bottom,
/// back along the top).
fn poly_rect(dest: &mut Vec<Point2D>, rc: &SpatialRect, h: Hemisphere) {
    poly_latitude(dest, rc.min_lat, rc.min_lon, rc.max_lon, h, false);
    poly_latitude(dest, rc.max_lat, rc.min_lon, rc.max_lon, h, true);
}

/// Fills one sector rectangle: entirely inside one hemisphere and one
/// quadrant span.
fn select_sector(out: &mut CellSet, rc: &SpatialRect) {
    let h = latitude_hemisphere((rc.min_lat + rc.max_lat) / 2.0);
    let mut verts = Vec::new();
    poly_rect(&mut verts, rc, h);
    fill_poly(out, &verts);
}

/// Splits a single-hemisphere rectangle at the quadrant meridians and
/// fills each sector.
fn select_hemisphere(out: &mut CellSet, rc: &SpatialRect) {
    let mut sector = *rc;
    for d in SORTED_QUADRANT {
        if cross_longitude(d, sector.min_lon, sector.max_lon) {
            sector.max_lon = d;
            select_sector(out, &sector);
            sector.min_lon = d;
            sector.max_lon = rc.max_lon;
        }
    }
    select_sector(out, &sector);
}

/// Rasterizes a geographic rectangle into depth-4 cells.
pub fn cell_rect(rc: &SpatialRect, out: &mut CellSet) {
    trace!(min_lat = rc.min_lat, max_lat = rc.max_lat, "cell_rect");
    if rc.cross_equator() {
        let south = SpatialRect {
            max_lat: 0.0,
            ..*rc
        };
        let north = SpatialRect {
            min_lat: 0.0,
            ..*rc
        };
        select_hemisphere(out, &south);
        select_hemisphere(out, &north);
    } else {
        select_hemisphere(out, rc);
    }
}

fn roundup(x: f64, multiple: usize) -> usize {
    let n = (x.ceil().max(1.0)) as usize;
    n.div_ceil(multiple) * multiple
}

/// Rasterizes the disk of `radius_m` meters around `center` into depth-4
/// cells: perimeter by destination points, boundary by Bresenham, interior
/// by scanline fill. Boundaries crossing the equator are split into
/// per-hemisphere polygons closed along the projected equator.
pub fn cell_range(center: SpatialPoint, radius_m: f64, model: RadiusModel, out: &mut CellSet) {
    if radius_m <= 0.0 {
        out.insert(point_to_cell(center));
        return;
    }
    let degree = RAD_TO_DEG * radius_m / earth_radius(center.latitude, model);
    let num = roundup(degree * 32.0, 32);
    let bx = 360.0 / num as f64;
    trace!(radius_m, num, "cell_range perimeter");

    let ring: Vec<SpatialPoint> = (0..num)
        .map(|i| destination(center, radius_m, bx * i as f64, model))
        .collect();

    let north_any = ring.iter().any(|p| p.latitude >= 0.0);
    let south_any = ring.iter().any(|p| p.latitude < 0.0);

    if !(north_any && south_any) {
        let mut verts = Vec::with_capacity(ring.len() * 2);
        for (i, p) in ring.iter().enumerate() {
            if i > 0 {
                let prev = &ring[i - 1];
                let quad_changed =
                    longitude_quadrant(prev.longitude) != longitude_quadrant(p.longitude);
                if quad_changed {
                    // Half a step back sharpens the corner at the seam.
                    let mid = destination(center, radius_m, bx * (i as f64 - 0.5), model);
                    verts.push(project_globe(mid));
                }
            }
            verts.push(project_globe(*p));
        }
        fill_poly(out, &verts);
        return;
    }

    for h in [Hemisphere::North, Hemisphere::South] {
        fill_hemisphere_run(center, radius_m, model, &ring, bx, h, out);
    }
}

/// Fills the part of the circle lying in hemisphere `h`: the run of
/// perimeter points on that side, entered and left at interpolated equator
/// points, closed along the projected equator through the circle's
/// interior.
fn fill_hemisphere_run(
    center: SpatialPoint,
    radius_m: f64,
    model: RadiusModel,
    ring: &[SpatialPoint],
    bx: f64,
    h: Hemisphere,
    out: &mut CellSet,
) {
    let n = ring.len();
    let in_h = |p: &SpatialPoint| latitude_hemisphere(p.latitude) == h;

    // First index entering the hemisphere.
    let Some(start) = (0..n).find(|&i| in_h(&ring[i]) && !in_h(&ring[(i + n - 1) % n])) else {
        return;
    };
    let mut run = Vec::new();
    let mut i = start;
    while in_h(&ring[i]) {
        run.push(i);
        i = (i + 1) % n;
        if i == start {
            break;
        }
    }
    let end = *run.last().expect("run contains start");

    // Equator entry/exit at half-step bearings, latitude clamped to 0.
    let entry_bearing = bx * (start as f64 - 0.5);
    let exit_bearing = bx * (end as f64 + 0.5);
    let mut entry = destination(center, radius_m, entry_bearing, model);
    let mut exit = destination(center, radius_m, exit_bearing, model);
    entry.latitude = 0.0;
    exit.latitude = 0.0;

    let mut verts = Vec::with_capacity(run.len() + 8);
    verts.push(project_globe_hemi(entry, h));
    for &ix in &run {
        verts.push(project_globe_hemi(ring[ix], h));
    }
    verts.push(project_globe_hemi(exit, h));

    // Close along the equator from exit back to entry, walking the side
    // that passes under the circle's center.
    let eastward = cross_longitude(center.longitude, exit.longitude, entry.longitude)
        || exit.longitude == center.longitude
        || entry.longitude == center.longitude;
    let span = if eastward {
        longitude_distance(exit.longitude, entry.longitude)
    } else {
        -longitude_distance(entry.longitude, exit.longitude)
    };
    let meters = haversine(exit, entry, EARTH_RADIUS);
    let num = 3 + (meters / 100_000.0) as usize * 2;
    let step = span / (num + 1) as f64;
    for k in 1..=num {
        let mid = SpatialPoint {
            latitude: 0.0,
            longitude: add_longitude(exit.longitude, step * k as f64),
        };
        verts.push(project_globe_hemi(mid, h));
    }
    fill_poly(out, &verts);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(lat: f64, lon: f64) -> SpatialPoint {
        SpatialPoint::new(lat, lon).unwrap()
    }

    #[test]
    fn cartesian_axes() {
        let p = cartesian(0.0, 0.0);
        assert!((p.x - 1.0).abs() < FEPSILON && p.y.abs() < FEPSILON && p.z.abs() < FEPSILON);
        let p = cartesian(0.0, 90.0);
        assert!(p.x.abs() < FEPSILON && (p.y - 1.0).abs() < FEPSILON);
        let p = cartesian(90.0, 0.0);
        assert!((p.z - 1.0).abs() < FEPSILON);
    }

    #[test]
    fn longitude_quadrants() {
        assert_eq!(longitude_quadrant(0.0), 0);
        assert_eq!(longitude_quadrant(45.0), 1);
        assert_eq!(longitude_quadrant(90.0), 1);
        assert_eq!(longitude_quadrant(135.0), 2);
        assert_eq!(longitude_quadrant(180.0), 2);
        assert_eq!(longitude_quadrant(-45.0), 0);
        assert_eq!(longitude_quadrant(-90.0), 3);
        assert_eq!(longitude_quadrant(-135.0), 3);
        assert_eq!(longitude_quadrant(-180.0), 2);
    }

    #[test]
    fn norm_wraps() {
        assert_eq!(SpatialPoint::norm_longitude(270.0), -90.0);
        assert_eq!(SpatialPoint::norm_longitude(-270.0), 90.0);
        assert_eq!(SpatialPoint::norm_longitude(180.0), 180.0);
        assert_eq!(SpatialPoint::norm_latitude(100.0), 80.0);
        assert_eq!(SpatialPoint::norm_latitude(-100.0), -80.0);
        assert_eq!(SpatialPoint::norm_latitude(460.0), 80.0);
    }

    #[test]
    fn point_quadrant_matches_reference_cases() {
        assert_eq!(point_quadrant(Point2D { x: 0.0, y: 0.0 }), 1);
        assert_eq!(point_quadrant(Point2D { x: 0.0, y: 0.25 }), 2);
        assert_eq!(point_quadrant(Point2D { x: 0.5, y: 0.375 }), 3);
        assert_eq!(point_quadrant(Point2D { x: 0.5, y: 0.5 }), 3);
        assert_eq!(point_quadrant(Point2D { x: 1.0, y: 0.25 }), 0);
        assert_eq!(point_quadrant(Point2D { x: 1.0, y: 0.75 }), 0);
        assert_eq!(point_quadrant(Point2D { x: 1.0, y: 1.0 }), 0);
        assert_eq!(point_quadrant(Point2D { x: 0.5, y: 1.0 }), 1);
        assert_eq!(point_quadrant(Point2D { x: 0.0, y: 0.75 }), 2);
    }

    #[test]
    fn known_city_cell() {
        // Kazan, a reference point with a known cell image.
        let cell = point_to_cell(pt(55.7975, 49.2194));
        assert_eq!(cell.to_bytes(), [157, 178, 149, 55, 4]);
    }

    #[test]
    fn more_reference_cells() {
        for (lat, lon, expect) in [
            (48.7139, 44.4984, [156u8, 163, 67, 177]),
            (47.2629, 39.7111, [163, 78, 72, 221]),
            (47.261, 39.7068, [163, 78, 72, 223]),
            (55.7831, 37.3567, [156, 38, 25, 118]),
            (0.0, -86.0, [128, 234, 255, 15]),
        ] {
            let cell = point_to_cell(pt(lat, lon));
            assert_eq!(cell.id, expect, "cell for ({}, {})", lat, lon);
        }
    }

    #[test]
    fn sector_boundary_cell_is_one_of_the_references() {
        // (45, 0) sits on a sector boundary; either image is valid.
        let cell = point_to_cell(pt(45.0, 0.0));
        let a = [160u8, 236, 255, 239];
        let b = [181u8, 153, 170, 154];
        assert!(cell.id == a || cell.id == b, "got {}", cell);
    }

    #[test]
    fn forward_reverse_round_trip_within_an_arc_second() {
        for lat in [-75.0, -30.0, -1.0, 0.5, 12.0, 44.0, 61.0, 89.0] {
            for lon in [-170.0, -91.0, -44.0, 0.25, 30.0, 90.5, 133.0, 179.0] {
                let p = pt(lat, lon);
                let back = reverse_project_globe(project_globe(p));
                let tolerance = 1.0 / 3600.0;
                assert!(
                    (back.latitude - lat).abs() < tolerance
                        && (back.longitude - lon).abs() < tolerance,
                    "({}, {}) came back as {}",
                    lat,
                    lon,
                    back
                );
            }
        }
    }

    #[test]
    fn haversine_reference_distances() {
        assert_eq!(haversine(pt(0.0, 0.0), pt(0.0, 0.0), EARTH_RADIUS), 0.0);
        // Quarter circumference.
        let quarter = haversine(pt(0.0, 0.0), pt(0.0, 90.0), EARTH_RADIUS);
        assert!((quarter - 10_007_543.0).abs() < 1.0, "got {}", quarter);
    }

    #[test]
    fn destination_round_trip_within_a_meter() {
        let from = pt(10.0, 20.0);
        for d in [1_000.0, 100_000.0, 2_000_000.0, 10_000_000.0] {
            for bearing in [0.0, 33.0, 90.0, 200.5, 359.0] {
                let to = destination(from, d, bearing, RadiusModel::Mean);
                let measured = haversine(from, to, EARTH_RADIUS);
                assert!(
                    (measured - d).abs() < 1.0,
                    "distance {} bearing {} came back {}",
                    d,
                    bearing,
                    measured
                );
            }
        }
    }

    #[test]
    fn destination_quarter_circle_east_and_north() {
        // Quarter-circle destinations along the axes.
        let quarter = EARTH_RADIUS * std::f64::consts::FRAC_PI_2;
        let east = destination(pt(0.0, 0.0), quarter, 90.0, RadiusModel::Mean);
        assert!(east.latitude.abs() < 1e-6);
        assert!((east.longitude - 90.0).abs() < 1e-6);
        let north = destination(pt(0.0, 0.0), quarter, 0.0, RadiusModel::Mean);
        assert!((north.latitude - 90.0).abs() < 1e-6);
    }

    #[test]
    fn destination_from_a_pole_takes_the_bearing_meridian() {
        let quarter = EARTH_RADIUS * std::f64::consts::FRAC_PI_2;
        let p = destination(pt(90.0, 0.0), quarter / 2.0, 30.0, RadiusModel::Mean);
        assert!((p.latitude - 45.0).abs() < 1e-6);
        assert!((p.longitude - 30.0).abs() < 1e-6);
    }

    #[test]
    fn ellipsoid_radius_endpoints() {
        assert_eq!(earth_radius(0.0, RadiusModel::Wgs84), EARTH_MAJOR_RADIUS);
        assert_eq!(earth_radius(90.0, RadiusModel::Wgs84), EARTH_MINOR_RADIUS);
        assert_eq!(earth_radius(45.0, RadiusModel::Mean), EARTH_RADIUS);
    }

    #[test]
    fn destination_rect_brackets_the_center() {
        let rc = destination_rect(pt(40.0, 30.0), 100_000.0, RadiusModel::Mean).unwrap();
        assert!(rc.min_lat < 40.0 && 40.0 < rc.max_lat);
        assert!(rc.min_lon < 30.0 && 30.0 < rc.max_lon);
        assert!(destination_rect(pt(89.9, 0.0), 100_000.0, RadiusModel::Mean).is_none());
    }

    #[test]
    fn cross_longitude_handles_wrap() {
        assert!(cross_longitude(0.0, -10.0, 10.0));
        assert!(!cross_longitude(20.0, -10.0, 10.0));
        assert!(cross_longitude(180.0, 170.0, -170.0));
        assert!(cross_longitude(-179.0, 170.0, -170.0));
    }

    #[test]
    fn zero_radius_disk_is_the_single_point_cell() {
        let mut out = CellSet::new();
        cell_range(pt(55.7975, 49.2194), 0.0, RadiusModel::Mean, &mut out);
        assert_eq!(out.len(), 1);
        assert!(out.contains(&point_to_cell(pt(55.7975, 49.2194))));
    }

    #[test]
    fn disk_contains_its_center_and_interior() {
        let center = pt(55.7975, 49.2194);
        let mut out = CellSet::new();
        cell_range(center, 50_000.0, RadiusModel::Mean, &mut out);
        assert!(out.len() > 4, "only {} cells", out.len());
        assert!(out.contains(&point_to_cell(center)));
        // A point well inside the radius rasterizes into the set.
        let inside = destination(center, 20_000.0, 45.0, RadiusModel::Mean);
        assert!(out.contains(&point_to_cell(inside)));
        // A point far outside does not.
        let outside = destination(center, 500_000.0, 45.0, RadiusModel::Mean);
        assert!(!out.contains(&point_to_cell(outside)));
    }

    #[test]
    fn equator_crossing_disk_covers_both_hemispheres() {
        let center = pt(0.2, 20.0);
        let mut out = CellSet::new();
        cell_range(center, 50_000.0, RadiusModel::Mean, &mut out);
        assert!(out.contains(&point_to_cell(center)));
        let south = pt(-0.2, 20.0);
        assert!(out.contains(&point_to_cell(south)), "south side missing");
    }

    #[test]
    fn rect_rasterization_contains_interior_points() {
        let rc = SpatialRect::new(55.3, 48.9, 56.0, 49.6).unwrap();
        let mut out = CellSet::new();
        cell_rect(&rc, &mut out);
        assert!(out.contains(&point_to_cell(pt(55.6, 49.2))));
        assert!(!out.contains(&point_to_cell(pt(50.0, 49.0))));
    }

    #[test]
    fn rect_across_a_quadrant_boundary_still_fills() {
        let rc = SpatialRect::new(40.0, 44.5, 40.4, 45.5).unwrap();
        let mut out = CellSet::new();
        cell_rect(&rc, &mut out);
        assert!(out.contains(&point_to_cell(pt(40.2, 44.8))));
        assert!(out.contains(&point_to_cell(pt(40.2, 45.3))));
    }

    #[test]
    fn cell_corner_round_trips() {
        let cell = point_to_cell(pt(55.7975, 49.2194));
        let corner = cell_to_latlon(&cell);
        // The corner is within one depth-4 cell of the original point.
        assert!((corner.latitude - 55.7975).abs() < 0.05);
        assert!((corner.longitude - 49.2194).abs() < 0.05);
    }
}
