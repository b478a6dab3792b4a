//! Bounding regions, points and index entries.

use std::fmt;

use crate::common::{Error, Result};

/// An axis-aligned 2D bounding box, the key of every index entry.
///
/// A region is always finite with `min <= max` on both axes; it may be
/// degenerate (zero width on an axis, or a single point). All predicates
/// treat the bounds as closed intervals, so touching regions intersect.
///
/// # Example
/// ```
/// use geopagedb::Region;
///
/// let a = Region::new(0.0, 0.0, 1.0, 1.0).unwrap();
/// let b = Region::new(1.0, 1.0, 2.0, 2.0).unwrap();
/// assert!(a.intersects(&b));
/// assert!(!a.contains(&b));
/// assert!(Region::new(1.0, 0.0, 0.0, 1.0).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    pub(crate) min_x: f64,
    pub(crate) min_y: f64,
    pub(crate) max_x: f64,
    pub(crate) max_y: f64,
}

impl Region {
    /// Create a region, validating its bounds.
    ///
    /// # Errors
    /// Returns `Error::InvalidRegion` if any bound is NaN or infinite, or if
    /// `min > max` on either axis.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Result<Self> {
        let region = Region {
            min_x,
            min_y,
            max_x,
            max_y,
        };
        if region.is_valid() {
            Ok(region)
        } else {
            Err(Error::InvalidRegion {
                min_x,
                min_y,
                max_x,
                max_y,
            })
        }
    }

    /// Zero-area region at a single point.
    pub fn point(x: f64, y: f64) -> Result<Self> {
        Self::new(x, y, x, y)
    }

    /// Smallest region covering every region in `regions`, or `None` if empty.
    pub fn bounding<'a>(regions: impl IntoIterator<Item = &'a Region>) -> Option<Region> {
        regions
            .into_iter()
            .fold(None, |acc: Option<Region>, r| match acc {
                Some(acc) => Some(acc.union(r)),
                None => Some(*r),
            })
    }

    pub fn min_x(&self) -> f64 {
        self.min_x
    }

    pub fn min_y(&self) -> f64 {
        self.min_y
    }

    pub fn max_x(&self) -> f64 {
        self.max_x
    }

    pub fn max_y(&self) -> f64 {
        self.max_y
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// Center point as `(x, y)`.
    pub fn center(&self) -> (f64, f64) {
        // Halve first: the sum of two large bounds overflows
        (
            self.min_x / 2.0 + self.max_x / 2.0,
            self.min_y / 2.0 + self.max_y / 2.0,
        )
    }

    /// Closed-interval overlap test.
    pub fn intersects(&self, other: &Region) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }

    /// True if `other` lies entirely inside `self` (boundaries included).
    pub fn contains(&self, other: &Region) -> bool {
        self.min_x <= other.min_x
            && self.min_y <= other.min_y
            && other.max_x <= self.max_x
            && other.max_y <= self.max_y
    }

    /// Smallest region covering both `self` and `other`.
    pub fn union(&self, other: &Region) -> Region {
        Region {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    /// Area that would be added to `self` by growing it to cover `other`.
    pub fn enlargement(&self, other: &Region) -> f64 {
        self.union(other).area() - self.area()
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.min_x.is_finite()
            && self.min_y.is_finite()
            && self.max_x.is_finite()
            && self.max_y.is_finite()
            && self.min_x <= self.max_x
            && self.min_y <= self.max_y
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}] x [{}, {}]",
            self.min_x, self.max_x, self.min_y, self.max_y
        )
    }
}

/// A query point; queried as a zero-area [`Region`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }

    /// The zero-area region at this point.
    pub fn to_region(self) -> Result<Region> {
        Region::point(self.x, self.y)
    }
}

/// A key/payload pair stored in the index.
///
/// The payload is an opaque record id owned by the caller. Two entries are
/// the same entry only if both region and payload match exactly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Entry {
    pub region: Region,
    pub payload: i32,
}

impl Entry {
    pub fn new(region: Region, payload: i32) -> Self {
        Entry { region, payload }
    }
}
