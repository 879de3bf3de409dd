//! Coalescing of dirty rectangles into larger commit regions
//!
//! Driving an e-paper controller has a high per-update cost, so many small
//! per-cell rectangles are collapsed into fewer large ones. Two rectangles
//! are only merged when their combined area still covers most of the
//! bounding box, which bounds the number of untouched pixels a merged
//! update rewrites.

use crate::geometry::Rect;

/// Merges inserted rectangles into their bounding boxes while bounding the
/// wasted area.
///
/// With the default ratio of 3/4, a merged rectangle wastes at most ~25% of
/// its area on pixels no source rectangle covered.
#[derive(Debug, Clone)]
pub struct RectangleMerger {
    rects: Vec<Rect>,
    ratio_num: i64,
    ratio_den: i64,
}

impl Default for RectangleMerger {
    fn default() -> Self {
        Self::new()
    }
}

impl RectangleMerger {
    /// Create a merger with the default 3/4 area ratio
    pub fn new() -> Self {
        Self::with_ratio(3, 4)
    }

    /// Create a merger with a custom area ratio
    ///
    /// Two rectangles `r`, `s` merge iff
    /// `area(r) + area(s) >= num / den * area(grow(r, s))`.
    pub fn with_ratio(num: u32, den: u32) -> Self {
        Self {
            rects: Vec::new(),
            ratio_num: i64::from(num),
            ratio_den: i64::from(den.max(1)),
        }
    }

    /// Drop all rectangles
    pub fn reset(&mut self) {
        self.rects.clear();
    }

    /// True if no rectangles are held
    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    /// Whether `r` and `s` together cover enough of their bounding box
    fn mergeable(&self, r: Rect, s: Rect) -> bool {
        let u = r.grow(s);
        (r.area() + s.area()) * self.ratio_den >= self.ratio_num * u.area()
    }

    /// Find a rectangle in `rects[..end]` that `r` may be merged into,
    /// scanning in reverse insertion order.
    fn find_merge_target(&self, r: Rect, end: usize) -> Option<usize> {
        (0..end).rev().find(|&i| self.mergeable(r, self.rects[i]))
    }

    /// Insert a rectangle, merging it into an existing one if possible
    pub fn insert(&mut self, r: Rect) {
        if !r.valid() {
            return;
        }
        match self.find_merge_target(r, self.rects.len()) {
            Some(i) => self.rects[i] = self.rects[i].grow(r),
            None => self.rects.push(r),
        }
    }

    /// Repeatedly merge rectangles until a full pass finds nothing to merge
    pub fn merge(&mut self) {
        loop {
            let mut found = false;
            for i in (1..self.rects.len()).rev() {
                if let Some(j) = self.find_merge_target(self.rects[i], i) {
                    self.rects[j] = self.rects[j].grow(self.rects[i]);
                    self.rects[i] = Rect::default();
                    found = true;
                }
            }
            if !found {
                break;
            }
            self.rects.retain(Rect::valid);
        }
    }

    /// Iterate over the current rectangles in unspecified order
    pub fn iter(&self) -> impl Iterator<Item = &Rect> {
        self.rects.iter()
    }
}

impl<'a> IntoIterator for &'a RectangleMerger {
    type Item = &'a Rect;
    type IntoIter = std::slice::Iter<'a, Rect>;

    fn into_iter(self) -> Self::IntoIter {
        self.rects.iter()
    }
}
