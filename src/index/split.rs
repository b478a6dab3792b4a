//! Node split policies for the capacity-bounded strategy.
//!
//! Both policies follow Guttman's R-tree paper: pick two seeds that would
//! waste the most area together, then distribute the rest. They differ in
//! how seeds and the next item are picked:
//! - [`SplitPolicy::Quadratic`] compares every pair, then always places the
//!   item with the strongest preference for one group
//! - [`SplitPolicy::Linear`] picks seeds by normalized separation along each
//!   axis, then places items in order

use std::cmp::Ordering;

use crate::common::{Entry, PageRef, Region};
use crate::index::SplitPolicy;

/// Anything with a bounding region that can be partitioned.
pub(crate) trait Bounded {
    fn bounds(&self) -> &Region;
}

impl Bounded for Entry {
    fn bounds(&self) -> &Region {
        &self.region
    }
}

/// A child link paired with the child's region, for splitting internal nodes.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ChildSlot {
    pub(crate) page: PageRef,
    pub(crate) region: Region,
}

impl Bounded for ChildSlot {
    fn bounds(&self) -> &Region {
        &self.region
    }
}

/// Split `items` into two groups of at least `min_fill` items each.
///
/// # Panics
/// Panics if fewer than two items are given.
pub(crate) fn partition<T: Bounded>(
    items: Vec<T>,
    min_fill: usize,
    policy: SplitPolicy,
) -> (Vec<T>, Vec<T>) {
    assert!(items.len() >= 2, "cannot split fewer than two items");

    let (a, b) = match policy {
        SplitPolicy::Quadratic => quadratic_seeds(&items),
        SplitPolicy::Linear => linear_seeds(&items),
    };
    let (hi, lo) = if a > b { (a, b) } else { (b, a) };

    let mut rest = items;
    let mut right = Group::new(rest.swap_remove(hi));
    let mut left = Group::new(rest.swap_remove(lo));

    while !rest.is_empty() {
        // One group needs everything left to reach the minimum
        if left.items.len() + rest.len() <= min_fill {
            left.extend(rest);
            break;
        }
        if right.items.len() + rest.len() <= min_fill {
            right.extend(rest);
            break;
        }

        let next = match policy {
            SplitPolicy::Quadratic => pick_next(&rest, &left.bounds, &right.bounds),
            SplitPolicy::Linear => rest.len() - 1,
        };
        let item = rest.swap_remove(next);
        if prefers_left(&left, &right, item.bounds()) {
            left.push(item);
        } else {
            right.push(item);
        }
    }

    (left.items, right.items)
}

struct Group<T> {
    items: Vec<T>,
    bounds: Region,
}

impl<T: Bounded> Group<T> {
    fn new(seed: T) -> Self {
        let bounds = *seed.bounds();
        Self {
            items: vec![seed],
            bounds,
        }
    }

    fn push(&mut self, item: T) {
        self.bounds = self.bounds.union(item.bounds());
        self.items.push(item);
    }

    fn extend(&mut self, items: Vec<T>) {
        for item in items {
            self.push(item);
        }
    }
}

/// Least enlargement, then smaller area, then fewer items.
fn prefers_left<T>(left: &Group<T>, right: &Group<T>, region: &Region) -> bool {
    let d1 = left.bounds.enlargement(region);
    let d2 = right.bounds.enlargement(region);
    match d1.partial_cmp(&d2) {
        Some(Ordering::Less) => true,
        Some(Ordering::Greater) => false,
        _ => match left.bounds.area().partial_cmp(&right.bounds.area()) {
            Some(Ordering::Less) => true,
            Some(Ordering::Greater) => false,
            _ => left.items.len() <= right.items.len(),
        },
    }
}

/// The pair whose union wastes the most area.
fn quadratic_seeds<T: Bounded>(items: &[T]) -> (usize, usize) {
    let mut best = (0, 1);
    let mut worst_waste = f64::NEG_INFINITY;
    for i in 0..items.len() {
        for j in (i + 1)..items.len() {
            let (a, b) = (items[i].bounds(), items[j].bounds());
            let waste = a.union(b).area() - a.area() - b.area();
            if waste > worst_waste {
                worst_waste = waste;
                best = (i, j);
            }
        }
    }
    best
}

/// The item whose placement matters most: largest difference in enlargement.
fn pick_next<T: Bounded>(items: &[T], left: &Region, right: &Region) -> usize {
    let mut best = 0;
    let mut best_diff = f64::NEG_INFINITY;
    for (i, item) in items.iter().enumerate() {
        let diff = (left.enlargement(item.bounds()) - right.enlargement(item.bounds())).abs();
        if diff > best_diff {
            best_diff = diff;
            best = i;
        }
    }
    best
}

/// The pair with the greatest normalized separation along either axis.
fn linear_seeds<T: Bounded>(items: &[T]) -> (usize, usize) {
    let x = axis_seeds(items, |r| (r.min_x, r.max_x));
    let y = axis_seeds(items, |r| (r.min_y, r.max_y));
    let (_, a, b) = if y.0 > x.0 { y } else { x };

    if a != b {
        return (a, b);
    }
    // Every item spans the same extreme on both sides
    (a, if a == 0 { 1 } else { 0 })
}

/// (normalized separation, highest low side, lowest high side) on one axis.
fn axis_seeds<T: Bounded>(items: &[T], axis: impl Fn(&Region) -> (f64, f64)) -> (f64, usize, usize) {
    let mut highest_low = 0;
    let mut lowest_high = 0;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;

    for (i, item) in items.iter().enumerate() {
        let (lo, hi) = axis(item.bounds());
        if lo > axis(items[highest_low].bounds()).0 {
            highest_low = i;
        }
        if hi < axis(items[lowest_high].bounds()).1 {
            lowest_high = i;
        }
        min = min.min(lo);
        max = max.max(hi);
    }

    let separation = axis(items[highest_low].bounds()).0 - axis(items[lowest_high].bounds()).1;
    let width = max - min;
    let normalized = if width > 0.0 { separation / width } else { separation };
    (normalized, highest_low, lowest_high)
}
