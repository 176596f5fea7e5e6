//! # Geography Payload Parsing
//!
//! A geography/geometry column stores an SRID, a 2-byte shape tag and a
//! shape body. The body is always a point list; multi-part shapes append a
//! *tail* describing how the list splits into parts (rings of a polygon,
//! lines of a multilinestring).
//!
//! ```text
//! +------+-----+----------------------------+----------------+
//! | SRID | tag | num_points + point list    | tail (multi-*) |
//! | 4 B  | 2 B | 4 B + 16 B each (lat, lon) | see below      |
//! +------+-----+----------------------------+----------------+
//! ```
//!
//! Shapes are a tagged variant with a shared vertex iterator; `contains`
//! is implemented for the variants with an interior (point equality,
//! polygon ray crossing). No trait objects: the variant enum is the whole
//! dispatch.

use eyre::{ensure, Result};

use crate::spatial::transform::SpatialPoint;

/// 2-byte shape tags of the host format.
pub mod shape_tag {
    pub const LINESTRING: u16 = 0x0002;
    pub const MULTIPOLYGON: u16 = 0x0401;
    pub const POINT: u16 = 0x0C01;
    pub const LINESEGMENT: u16 = 0x1401;
}

const HEAD_SIZE: usize = 6;
const POINT_SIZE: usize = 16;
/// Tail entries are 5 bytes: u32 value plus a tag byte.
const TAIL_NUM_SIZE: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeKind {
    Null,
    Point,
    LineString,
    Polygon,
    MultiLineString,
    MultiPolygon,
    LineSegment,
}

/// A parsed geography value borrowing the row bytes.
#[derive(Debug, Clone)]
pub struct Geography<'a> {
    srid: u32,
    kind: ShapeKind,
    points: &'a [u8],
    point_count: usize,
    /// Part end offsets (in points), empty for single-part shapes.
    parts: Vec<usize>,
}

fn read_point(bytes: &[u8]) -> SpatialPoint {
    SpatialPoint {
        latitude: f64::from_le_bytes(bytes[..8].try_into().unwrap()),
        longitude: f64::from_le_bytes(bytes[8..16].try_into().unwrap()),
    }
}

impl<'a> Geography<'a> {
    pub fn parse(bytes: &'a [u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Ok(Self {
                srid: 0,
                kind: ShapeKind::Null,
                points: &[],
                point_count: 0,
                parts: Vec::new(),
            });
        }
        ensure!(bytes.len() >= HEAD_SIZE, "geography of {} bytes has no head", bytes.len());
        let srid = u32::from_le_bytes(bytes[..4].try_into().unwrap());
        let tag = u16::from_le_bytes([bytes[4], bytes[5]]);
        let body = &bytes[HEAD_SIZE..];

        match tag {
            shape_tag::POINT => {
                ensure!(body.len() >= POINT_SIZE, "point body truncated");
                Ok(Self {
                    srid,
                    kind: ShapeKind::Point,
                    points: &body[..POINT_SIZE],
                    point_count: 1,
                    parts: Vec::new(),
                })
            }
            shape_tag::LINESEGMENT => {
                ensure!(body.len() >= 2 * POINT_SIZE, "line segment body truncated");
                Ok(Self {
                    srid,
                    kind: ShapeKind::LineSegment,
                    points: &body[..2 * POINT_SIZE],
                    point_count: 2,
                    parts: Vec::new(),
                })
            }
            shape_tag::LINESTRING | shape_tag::MULTIPOLYGON => {
                ensure!(body.len() >= 4, "point list header truncated");
                let num = u32::from_le_bytes(body[..4].try_into().unwrap()) as usize;
                let list_len = num
                    .checked_mul(POINT_SIZE)
                    .filter(|&l| body.len() >= 4 + l)
                    .ok_or_else(|| eyre::eyre!("point list of {} points truncated", num))?;
                let points = &body[4..4 + list_len];
                let tail = &body[4 + list_len..];
                let parts = parse_tail(tail, num)?;
                let kind = classify(tag, &parts);
                Ok(Self {
                    srid,
                    kind,
                    points,
                    point_count: num,
                    parts,
                })
            }
            other => eyre::bail!("unknown geography tag {:#06x}", other),
        }
    }

    pub fn srid(&self) -> u32 {
        self.srid
    }

    pub fn kind(&self) -> ShapeKind {
        self.kind
    }

    pub fn point_count(&self) -> usize {
        self.point_count
    }

    pub fn point(&self, i: usize) -> SpatialPoint {
        debug_assert!(i < self.point_count);
        read_point(&self.points[i * POINT_SIZE..])
    }

    /// All vertices, part boundaries ignored.
    pub fn vertices(&self) -> impl Iterator<Item = SpatialPoint> + '_ {
        (0..self.point_count).map(|i| self.point(i))
    }

    /// Number of parts (rings / component lines); 1 for single-part
    /// shapes.
    pub fn part_count(&self) -> usize {
        if self.parts.is_empty() {
            usize::from(self.point_count > 0)
        } else {
            self.parts.len()
        }
    }

    /// Vertex range of part `p`.
    fn part_range(&self, p: usize) -> (usize, usize) {
        if self.parts.is_empty() {
            (0, self.point_count)
        } else {
            let start = if p == 0 { 0 } else { self.parts[p - 1] };
            (start, self.parts[p])
        }
    }

    pub fn part(&self, p: usize) -> impl Iterator<Item = SpatialPoint> + '_ {
        let (start, end) = self.part_range(p);
        (start..end).map(|i| self.point(i))
    }

    /// Point-in-shape test. Points match exactly; polygon variants use
    /// even-odd ray crossing over every ring; lines contain nothing.
    pub fn contains(&self, p: &SpatialPoint) -> bool {
        match self.kind {
            ShapeKind::Point => {
                let own = self.point(0);
                own.latitude == p.latitude && own.longitude == p.longitude
            }
            ShapeKind::Polygon | ShapeKind::MultiPolygon => {
                let mut inside = false;
                for part in 0..self.part_count() {
                    let (start, end) = self.part_range(part);
                    if ring_crossings(self, start, end, p) {
                        inside = !inside;
                    }
                }
                inside
            }
            _ => false,
        }
    }
}

/// Even-odd crossing parity of one ring.
fn ring_crossings(geo: &Geography<'_>, start: usize, end: usize, p: &SpatialPoint) -> bool {
    let n = end - start;
    if n < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = end - 1;
    for i in start..end {
        let a = geo.point(j);
        let b = geo.point(i);
        j = i;
        if (a.latitude > p.latitude) != (b.latitude > p.latitude) {
            let x = b.longitude
                + (p.latitude - b.latitude) * (a.longitude - b.longitude)
                    / (a.latitude - b.latitude);
            if p.longitude < x {
                inside = !inside;
            }
        }
    }
    inside
}

fn parse_tail(tail: &[u8], point_count: usize) -> Result<Vec<usize>> {
    if tail.is_empty() {
        return Ok(Vec::new());
    }
    ensure!(tail.len() >= 2 * TAIL_NUM_SIZE, "geography tail truncated");
    let numobj = u32::from_le_bytes(tail[..4].try_into().unwrap()) as usize;
    let entries = &tail[2 * TAIL_NUM_SIZE..];
    ensure!(
        entries.len() >= numobj * TAIL_NUM_SIZE,
        "geography tail lists {} parts but stores {} bytes",
        numobj,
        entries.len()
    );
    let mut parts = Vec::with_capacity(numobj);
    for i in 0..numobj {
        let at = i * TAIL_NUM_SIZE;
        let end = u32::from_le_bytes(entries[at..at + 4].try_into().unwrap()) as usize;
        ensure!(
            end <= point_count && parts.last().map_or(true, |&p| p <= end),
            "geography part {} ends at {} outside the point list",
            i,
            end
        );
        parts.push(end);
    }
    Ok(parts)
}

fn classify(tag: u16, parts: &[usize]) -> ShapeKind {
    match tag {
        shape_tag::LINESTRING => {
            if parts.len() > 1 {
                ShapeKind::MultiLineString
            } else {
                ShapeKind::LineString
            }
        }
        _ => {
            if parts.len() > 1 {
                ShapeKind::MultiPolygon
            } else {
                ShapeKind::Polygon
            }
        }
    }
}

impl std::fmt::Display for Geography<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            ShapeKind::Null => write!(f, "NULL"),
            ShapeKind::Point => {
                let p = self.point(0);
                write!(f, "POINT ({} {})", p.longitude, p.latitude)
            }
            ShapeKind::LineSegment | ShapeKind::LineString => {
                write!(f, "LINESTRING (")?;
                for (i, p) in self.vertices().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} {}", p.longitude, p.latitude)?;
                }
                write!(f, ")")
            }
            ShapeKind::MultiLineString => write!(f, "MULTILINESTRING ({} lines)", self.part_count()),
            ShapeKind::Polygon => write!(f, "POLYGON ({} points)", self.point_count),
            ShapeKind::MultiPolygon => {
                write!(f, "MULTIPOLYGON ({} rings)", self.part_count())
            }
        }
    }
}

/// Serializes geography payloads for fixtures and tooling.
#[derive(Debug)]
pub struct GeographyBuilder {
    srid: u32,
}

impl GeographyBuilder {
    pub fn wgs84() -> Self {
        Self { srid: 4326 }
    }

    pub fn point(&self, p: SpatialPoint) -> Vec<u8> {
        let mut out = self.head(shape_tag::POINT);
        out.extend_from_slice(&p.latitude.to_le_bytes());
        out.extend_from_slice(&p.longitude.to_le_bytes());
        out
    }

    pub fn linestring(&self, points: &[SpatialPoint]) -> Vec<u8> {
        let mut out = self.head(shape_tag::LINESTRING);
        self.point_list(&mut out, points);
        out
    }

    /// One polygon: a single closed ring.
    pub fn polygon(&self, ring: &[SpatialPoint]) -> Vec<u8> {
        let mut out = self.head(shape_tag::MULTIPOLYGON);
        self.point_list(&mut out, ring);
        Self::tail(&mut out, &[ring.len()]);
        out
    }

    /// Several rings; `rings` holds each ring's vertices.
    pub fn multipolygon(&self, rings: &[Vec<SpatialPoint>]) -> Vec<u8> {
        let mut out = self.head(shape_tag::MULTIPOLYGON);
        let all: Vec<SpatialPoint> = rings.iter().flatten().copied().collect();
        self.point_list(&mut out, &all);
        let mut ends = Vec::new();
        let mut total = 0;
        for ring in rings {
            total += ring.len();
            ends.push(total);
        }
        Self::tail(&mut out, &ends);
        out
    }

    fn head(&self, tag: u16) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.srid.to_le_bytes());
        out.extend_from_slice(&tag.to_le_bytes());
        out
    }

    fn point_list(&self, out: &mut Vec<u8>, points: &[SpatialPoint]) {
        out.extend_from_slice(&(points.len() as u32).to_le_bytes());
        for p in points {
            out.extend_from_slice(&p.latitude.to_le_bytes());
            out.extend_from_slice(&p.longitude.to_le_bytes());
        }
    }

    fn tail(out: &mut Vec<u8>, ends: &[usize]) {
        out.extend_from_slice(&(ends.len() as u32).to_le_bytes());
        out.push(1);
        out.extend_from_slice(&1u32.to_le_bytes());
        out.push(1);
        for &end in ends {
            out.extend_from_slice(&(end as u32).to_le_bytes());
            out.push(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(lat: f64, lon: f64) -> SpatialPoint {
        SpatialPoint {
            latitude: lat,
            longitude: lon,
        }
    }

    #[test]
    fn point_round_trip() {
        let bytes = GeographyBuilder::wgs84().point(pt(55.8, 49.2));
        let geo = Geography::parse(&bytes).unwrap();
        assert_eq!(geo.kind(), ShapeKind::Point);
        assert_eq!(geo.srid(), 4326);
        assert_eq!(geo.point(0), pt(55.8, 49.2));
        assert_eq!(geo.to_string(), "POINT (49.2 55.8)");
    }

    #[test]
    fn empty_payload_is_null_shape() {
        let geo = Geography::parse(&[]).unwrap();
        assert_eq!(geo.kind(), ShapeKind::Null);
        assert_eq!(geo.part_count(), 0);
    }

    #[test]
    fn linestring_vertices() {
        let bytes =
            GeographyBuilder::wgs84().linestring(&[pt(0.0, 0.0), pt(1.0, 1.0), pt(2.0, 0.5)]);
        let geo = Geography::parse(&bytes).unwrap();
        assert_eq!(geo.kind(), ShapeKind::LineString);
        assert_eq!(geo.point_count(), 3);
        let verts: Vec<_> = geo.vertices().collect();
        assert_eq!(verts[2], pt(2.0, 0.5));
        assert!(!geo.contains(&pt(0.0, 0.0)));
    }

    #[test]
    fn polygon_contains_interior_point() {
        let ring = [pt(0.0, 0.0), pt(0.0, 10.0), pt(10.0, 10.0), pt(10.0, 0.0)];
        let bytes = GeographyBuilder::wgs84().polygon(&ring);
        let geo = Geography::parse(&bytes).unwrap();
        assert_eq!(geo.kind(), ShapeKind::Polygon);
        assert!(geo.contains(&pt(5.0, 5.0)));
        assert!(!geo.contains(&pt(15.0, 5.0)));
        assert!(!geo.contains(&pt(-1.0, -1.0)));
    }

    #[test]
    fn multipolygon_hole_uses_even_odd() {
        let outer = vec![pt(0.0, 0.0), pt(0.0, 10.0), pt(10.0, 10.0), pt(10.0, 0.0)];
        let hole = vec![pt(4.0, 4.0), pt(4.0, 6.0), pt(6.0, 6.0), pt(6.0, 4.0)];
        let bytes = GeographyBuilder::wgs84().multipolygon(&[outer, hole]);
        let geo = Geography::parse(&bytes).unwrap();
        assert_eq!(geo.kind(), ShapeKind::MultiPolygon);
        assert_eq!(geo.part_count(), 2);
        assert!(geo.contains(&pt(2.0, 2.0)));
        assert!(!geo.contains(&pt(5.0, 5.0))); // inside the hole
    }

    #[test]
    fn truncated_point_list_is_rejected() {
        let mut bytes = GeographyBuilder::wgs84().linestring(&[pt(0.0, 0.0), pt(1.0, 1.0)]);
        bytes.truncate(bytes.len() - 8);
        assert!(Geography::parse(&bytes).is_err());
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let mut bytes = GeographyBuilder::wgs84().point(pt(0.0, 0.0));
        bytes[4] = 0x77;
        bytes[5] = 0x77;
        assert!(Geography::parse(&bytes).is_err());
    }
}
