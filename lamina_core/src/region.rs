// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Rectangle-set regions.
//!
//! A [`Region`] is a set of pairwise disjoint, non-empty axis-aligned
//! [`Rect`]s. Damage, repaint areas and paint clips are all regions. The
//! representation is not canonical: two regions covering the same area may
//! hold different rectangles, so equality compares coverage rather than
//! storage.

use kurbo::{Affine, Point, Rect, Vec2};

/// A set of disjoint axis-aligned rectangles.
#[derive(Clone, Debug, Default)]
pub struct Region {
    rects: Vec<Rect>,
}

impl Region {
    /// The empty region.
    pub const EMPTY: Self = Self { rects: Vec::new() };

    /// Creates an empty region.
    #[must_use]
    pub const fn new() -> Self {
        Self::EMPTY
    }

    /// Creates a region covering a single rectangle.
    ///
    /// Rectangles with zero or negative area yield the empty region.
    #[must_use]
    pub fn from_rect(rect: Rect) -> Self {
        let rect = rect.abs();
        if is_empty_rect(rect) {
            Self::new()
        } else {
            Self { rects: vec![rect] }
        }
    }

    /// Returns `true` if the region covers no area.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    /// Returns the disjoint rectangles making up this region.
    #[must_use]
    pub fn rects(&self) -> &[Rect] {
        &self.rects
    }

    /// Returns the smallest rectangle enclosing the region, or [`Rect::ZERO`]
    /// when it is empty.
    #[must_use]
    pub fn bounding_rect(&self) -> Rect {
        let mut iter = self.rects.iter();
        let Some(first) = iter.next() else {
            return Rect::ZERO;
        };
        iter.fold(*first, |acc, r| acc.union(*r))
    }

    /// Returns the covered area.
    #[must_use]
    pub fn area(&self) -> f64 {
        self.rects.iter().map(|r| r.area()).sum()
    }

    /// Returns `true` if `point` lies inside the region.
    #[must_use]
    pub fn contains(&self, point: Point) -> bool {
        self.rects.iter().any(|r| r.contains(point))
    }

    /// Returns `true` if the region overlaps `rect` with non-zero area.
    #[must_use]
    pub fn intersects_rect(&self, rect: Rect) -> bool {
        self.rects
            .iter()
            .any(|r| !is_empty_rect(r.intersect(rect.abs())))
    }

    /// Returns `true` if every point of `other` is also in `self`.
    #[must_use]
    pub fn contains_region(&self, other: &Self) -> bool {
        other.subtract(self).is_empty()
    }

    /// Adds a rectangle to the region.
    pub fn add_rect(&mut self, rect: Rect) {
        let rect = rect.abs();
        if is_empty_rect(rect) {
            return;
        }
        let mut pieces = vec![rect];
        for existing in &self.rects {
            pieces = pieces
                .into_iter()
                .flat_map(|p| subtract_rect(p, *existing))
                .collect();
            if pieces.is_empty() {
                return;
            }
        }
        self.rects.extend(pieces);
    }

    /// Adds every rectangle of `other` to the region.
    pub fn add_region(&mut self, other: &Self) {
        for r in &other.rects {
            self.add_rect(*r);
        }
    }

    /// Returns the union of two regions.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        let mut out = self.clone();
        out.add_region(other);
        out
    }

    /// Returns the part of the region inside `rect`.
    #[must_use]
    pub fn intersect_rect(&self, rect: Rect) -> Self {
        let rect = rect.abs();
        Self {
            rects: self
                .rects
                .iter()
                .map(|r| r.intersect(rect))
                .filter(|r| !is_empty_rect(*r))
                .collect(),
        }
    }

    /// Returns the intersection of two regions.
    #[must_use]
    pub fn intersect(&self, other: &Self) -> Self {
        let mut rects = Vec::new();
        for a in &self.rects {
            for b in &other.rects {
                let r = a.intersect(*b);
                if !is_empty_rect(r) {
                    rects.push(r);
                }
            }
        }
        Self { rects }
    }

    /// Returns the part of the region not covered by `other`.
    #[must_use]
    pub fn subtract(&self, other: &Self) -> Self {
        let mut rects = self.rects.clone();
        for cut in &other.rects {
            rects = rects
                .into_iter()
                .flat_map(|r| subtract_rect(r, *cut))
                .collect();
        }
        Self { rects }
    }

    /// Returns the region moved by `offset`.
    #[must_use]
    pub fn translate(&self, offset: Vec2) -> Self {
        Self {
            rects: self.rects.iter().map(|r| *r + offset).collect(),
        }
    }

    /// Returns the region mapped through `transform`.
    ///
    /// Each rectangle is replaced by the bounding box of its image, so the
    /// result is exact for translations and axis-aligned scales and an
    /// over-approximation otherwise.
    #[must_use]
    pub fn transform_bbox(&self, transform: Affine) -> Self {
        self.rects
            .iter()
            .map(|r| transform.transform_rect_bbox(*r))
            .collect()
    }
}

impl PartialEq for Region {
    fn eq(&self, other: &Self) -> bool {
        self.contains_region(other) && other.contains_region(self)
    }
}

impl From<Rect> for Region {
    fn from(rect: Rect) -> Self {
        Self::from_rect(rect)
    }
}

impl FromIterator<Rect> for Region {
    fn from_iter<I: IntoIterator<Item = Rect>>(iter: I) -> Self {
        let mut region = Self::new();
        for r in iter {
            region.add_rect(r);
        }
        region
    }
}

impl Extend<Rect> for Region {
    fn extend<I: IntoIterator<Item = Rect>>(&mut self, iter: I) {
        for r in iter {
            self.add_rect(r);
        }
    }
}

fn is_empty_rect(r: Rect) -> bool {
    !(r.width() > 0.0 && r.height() > 0.0)
}

/// Splits `a \ b` into at most four bands: full-width above and below the
/// overlap, then the left and right remainders beside it.
fn subtract_rect(a: Rect, b: Rect) -> impl Iterator<Item = Rect> {
    let i = a.intersect(b);
    let bands = if is_empty_rect(i) {
        [Some(a), None, None, None]
    } else {
        [
            Some(Rect::new(a.x0, a.y0, a.x1, i.y0)),
            Some(Rect::new(a.x0, i.y1, a.x1, a.y1)),
            Some(Rect::new(a.x0, i.y0, i.x0, i.y1)),
            Some(Rect::new(i.x1, i.y0, a.x1, i.y1)),
        ]
    };
    bands.into_iter().flatten().filter(|r| !is_empty_rect(*r))
}
