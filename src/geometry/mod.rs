//! Planar geometry for map content
//!
//! Map data is stored as three optional multi-geometries (points, lines,
//! polygons). Readers see them flattened into a single `GeometryCollection`,
//! whose planar length is the summary value kept alongside the record.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LineString(pub Vec<Point>);

impl LineString {
    pub fn new(points: impl IntoIterator<Item = impl Into<Point>>) -> Self {
        Self(points.into_iter().map(Into::into).collect())
    }

    pub fn is_closed(&self) -> bool {
        match (self.0.first(), self.0.last()) {
            (Some(first), Some(last)) => self.0.len() > 1 && first == last,
            _ => false,
        }
    }

    fn segments_length(&self) -> f64 {
        self.0.windows(2).map(|w| w[0].distance(&w[1])).sum()
    }
}

/// A polygon: one exterior ring and any number of holes.
///
/// Rings that are not explicitly closed are treated as if their last point
/// connected back to the first.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub exterior: LineString,
    #[serde(default)]
    pub interiors: Vec<LineString>,
}

impl Polygon {
    pub fn new(exterior: LineString) -> Self {
        Self {
            exterior,
            interiors: Vec::new(),
        }
    }

    pub fn with_interior(mut self, ring: LineString) -> Self {
        self.interiors.push(ring);
        self
    }
}

fn ring_perimeter(ring: &LineString) -> f64 {
    let open = ring.segments_length();
    if ring.is_closed() || ring.0.len() < 2 {
        return open;
    }
    match (ring.0.first(), ring.0.last()) {
        (Some(first), Some(last)) => open + last.distance(first),
        _ => open,
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MultiPoint(pub Vec<Point>);

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MultiLineString(pub Vec<LineString>);

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MultiPolygon(pub Vec<Polygon>);

/// A single member of a flattened collection
#[derive(Clone, Debug, PartialEq)]
pub enum Geometry {
    Point(Point),
    LineString(LineString),
    Polygon(Polygon),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct GeometryCollection(pub Vec<Geometry>);

impl GeometryCollection {
    /// Flatten optional point, line and polygon sets into one collection,
    /// members in that order.
    pub fn flatten(
        points: Option<&MultiPoint>,
        lines: Option<&MultiLineString>,
        polys: Option<&MultiPolygon>,
    ) -> Self {
        let mut members = Vec::new();
        if let Some(points) = points {
            members.extend(points.0.iter().copied().map(Geometry::Point));
        }
        if let Some(lines) = lines {
            members.extend(lines.0.iter().cloned().map(Geometry::LineString));
        }
        if let Some(polys) = polys {
            members.extend(polys.0.iter().cloned().map(Geometry::Polygon));
        }
        Self(members)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Linear length. Points have none; polygons contribute their ring perimeters.
pub trait Length {
    fn length(&self) -> f64;
}

impl Length for Point {
    fn length(&self) -> f64 {
        0.0
    }
}

impl Length for LineString {
    fn length(&self) -> f64 {
        self.segments_length()
    }
}

impl Length for Polygon {
    fn length(&self) -> f64 {
        ring_perimeter(&self.exterior) + self.interiors.iter().map(ring_perimeter).sum::<f64>()
    }
}

impl Length for Geometry {
    fn length(&self) -> f64 {
        match self {
            Geometry::Point(p) => p.length(),
            Geometry::LineString(l) => l.length(),
            Geometry::Polygon(p) => p.length(),
        }
    }
}

impl Length for GeometryCollection {
    fn length(&self) -> f64 {
        self.0.iter().map(Length::length).sum()
    }
}
