//! Vertex sequences for linear and areal features.

use serde::{Deserialize, Serialize};

use crate::location::{BoundingBox, Location};

/// An ordered, open sequence of vertices.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolyLine(Vec<Location>);

impl PolyLine {
    #[must_use]
    pub const fn new(locations: Vec<Location>) -> Self {
        Self(locations)
    }

    #[must_use]
    pub fn locations(&self) -> &[Location] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn first(&self) -> Option<Location> {
        self.0.first().copied()
    }

    #[must_use]
    pub fn last(&self) -> Option<Location> {
        self.0.last().copied()
    }

    /// Whether `location` is one of the vertices (not merely on a segment).
    #[must_use]
    pub fn contains(&self, location: Location) -> bool {
        self.0.contains(&location)
    }

    /// Consecutive vertex pairs.
    pub fn segments(&self) -> impl Iterator<Item = (Location, Location)> + '_ {
        self.0.windows(2).map(|pair| (pair[0], pair[1]))
    }

    #[must_use]
    pub fn bounds(&self) -> Option<BoundingBox> {
        BoundingBox::from_locations(&self.0)
    }
}

impl From<Vec<Location>> for PolyLine {
    fn from(locations: Vec<Location>) -> Self {
        Self(locations)
    }
}

/// The outer ring of an area. The closing vertex is optional on input;
/// [`Polygon::boundary`] always yields a closed ring.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Polygon(Vec<Location>);

impl Polygon {
    #[must_use]
    pub const fn new(ring: Vec<Location>) -> Self {
        Self(ring)
    }

    /// Ring vertices as supplied.
    #[must_use]
    pub fn locations(&self) -> &[Location] {
        &self.0
    }

    /// The ring as a closed [`PolyLine`] (first vertex repeated at the end).
    #[must_use]
    pub fn boundary(&self) -> PolyLine {
        let mut ring = self.0.clone();
        if let (Some(first), Some(last)) = (ring.first().copied(), ring.last().copied())
            && first != last
        {
            ring.push(first);
        }
        PolyLine::new(ring)
    }

    /// Number of distinct vertices (closing vertex not counted).
    #[must_use]
    pub fn distinct_vertex_count(&self) -> usize {
        match (self.0.first(), self.0.last()) {
            (Some(first), Some(last)) if first == last && self.0.len() > 1 => self.0.len() - 1,
            _ => self.0.len(),
        }
    }

    #[must_use]
    pub fn contains_vertex(&self, location: Location) -> bool {
        self.0.contains(&location)
    }

    #[must_use]
    pub fn bounds(&self) -> Option<BoundingBox> {
        BoundingBox::from_locations(&self.0)
    }
}
