use glam::Vec2;
use serde::{Deserialize, Serialize};

/// An axis-aligned rectangle on the XY plane.
///
/// Boxes are values: operations return new boxes and never mutate in place.
/// A box produced by [`BoundingBox::intersection`] of disjoint inputs has a
/// negative extent on at least one axis; use [`BoundingBox::overlap_area`] when
/// only the shared area matters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: Vec2,
    pub max: Vec2,
}

impl BoundingBox {
    /// Create a box from its corners. Panics in debug builds if `min > max`.
    pub fn new(min: Vec2, max: Vec2) -> Self {
        debug_assert!(
            min.x <= max.x && min.y <= max.y,
            "inverted box: min={min}, max={max}"
        );
        Self { min, max }
    }

    /// Box spanning two arbitrary corners, in any order.
    pub fn from_corners(a: Vec2, b: Vec2) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Degenerate box covering a single point.
    pub fn point(p: Vec2) -> Self {
        Self { min: p, max: p }
    }

    /// Square of half-width `radius` around `center`.
    pub fn around(center: Vec2, radius: f32) -> Self {
        let r = Vec2::splat(radius.abs());
        Self {
            min: center - r,
            max: center + r,
        }
    }

    /// Smallest box containing both inputs.
    pub fn combine(&self, other: &Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Combination of every box in the iterator, or `None` when it is empty.
    pub fn combine_all<'a>(boxes: impl IntoIterator<Item = &'a BoundingBox>) -> Option<Self> {
        boxes
            .into_iter()
            .copied()
            .reduce(|acc, b| acc.combine(&b))
    }

    /// Component-wise max of mins and min of maxes. Not clamped.
    pub fn intersection(&self, other: &Self) -> Self {
        Self {
            min: self.min.max(other.min),
            max: self.max.min(other.max),
        }
    }

    pub fn width(&self) -> f32 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f32 {
        self.max.y - self.min.y
    }

    /// Width times height. Zero for points and segments.
    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Width plus height.
    pub fn semi_perimeter(&self) -> f32 {
        self.width() + self.height()
    }

    /// Area shared by both boxes, zero when they are disjoint or only touch.
    pub fn overlap_area(&self, other: &Self) -> f32 {
        let i = self.intersection(other);
        if i.width() <= 0.0 || i.height() <= 0.0 {
            0.0
        } else {
            i.area()
        }
    }

    pub fn is_valid(&self) -> bool {
        self.min.x <= self.max.x && self.min.y <= self.max.y
    }

    /// True when the boxes share at least one point (edges included).
    pub fn intersects(&self, other: &Self) -> bool {
        self.min.x <= other.max.x
            && other.min.x <= self.max.x
            && self.min.y <= other.max.y
            && other.min.y <= self.max.y
    }

    pub fn contains_point(&self, p: Vec2) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    pub fn contains(&self, other: &Self) -> bool {
        self.contains_point(other.min) && self.contains_point(other.max)
    }
}
