//! Quadrant node strategy (quadtree).
//!
//! Every non-root node covers a square cell and splits it into four
//! quadrants around the cell's center. An entry is stored at the deepest
//! node whose center lines it does not cross.
//!
//! # Quadrants
//! ```text
//!        y
//!        ▲
//!   2 NW │ 3 NE
//!  ──────┼──────▶ x      index = (x high ? 1 : 0) + (y high ? 2 : 0)
//!   0 SW │ 1 SE
//! ```
//!
//! # Root
//! The root is centered at the origin and has no fixed extent. Its children
//! are power-of-two cells anchored at the origin, one per quadrant. When an
//! entry falls outside the root child of its quadrant, a cell twice the size
//! is created around the old one ("expand") until the entry fits. Root
//! cells stop growing at [`MAX_CELL_SIZE`]; entries reaching further out
//! stay at the root.

use log::debug;

use crate::common::config::{MAX_CELL_SIZE, MIN_BINARY_EXPONENT};
use crate::common::{Entry, PageRef, Region, Result};
use crate::index::{Config, Node};

const ORIGIN: (f64, f64) = (0.0, 0.0);

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct QuadTree;

impl QuadTree {
    pub(crate) fn new() -> Self {
        Self
    }

    // ========================================================================
    // Insert
    // ========================================================================

    pub(crate) fn insert(&self, cfg: &mut Config, entry: Entry) -> Result<()> {
        let mut root = match cfg.root() {
            Some(page) => cfg.load(page)?,
            None => {
                let root = cfg.create_node(origin_region(), None)?;
                cfg.set_root(Some(root.page));
                root
            }
        };
        root.region = root.region.union(&entry.region);

        let placement = subnode_index(&entry.region, ORIGIN).and_then(|quadrant| {
            cell_size(quadrant_extent(quadrant, &entry.region)).map(|size| (quadrant, size))
        });
        let Some((quadrant, needed)) = placement else {
            root.add_entry(entry);
            cfg.store_node(root)?;
            return Ok(());
        };

        root.materialize_all(cfg)?;
        let child = self.root_child_for(cfg, &mut root, quadrant, needed)?;
        let root_page = cfg.store_node(root)?;
        let child = cfg.load_child(child, root_page)?;
        self.insert_contained(cfg, child, entry)
    }

    /// The root child of `quadrant`, created or expanded to at least side
    /// `needed`. Updates `root`'s links and region; the caller stores it.
    fn root_child_for(
        &self,
        cfg: &mut Config,
        root: &mut Node,
        quadrant: usize,
        needed: f64,
    ) -> Result<PageRef> {
        let mut existing = None;
        for pos in 0..root.child_count() {
            let child = root.get_sub_node(pos, cfg)?;
            if subnode_index(&child.region, ORIGIN) == Some(quadrant) {
                existing = Some(child);
                break;
            }
        }

        let Some(child) = existing else {
            let cell = root_cell(quadrant, needed);
            let child = cfg.create_node(cell, Some(root.page))?;
            root.add_child(child.page)?;
            root.region = root.region.union(&cell);
            return Ok(child.page);
        };

        let mut size = child.region.width();
        if size >= needed {
            return Ok(child.page);
        }

        let old = child.page;
        let mut top = child.page;
        while size < needed {
            size *= 2.0;
            let mut bigger = cfg.create_node(root_cell(quadrant, size), Some(root.page))?;
            bigger.add_child(top)?;
            cfg.bind_parent(top.offset, Some(bigger.page));
            top = cfg.store_node(bigger)?;
        }
        debug!("expanded root quadrant {} to size {}", quadrant, size);

        root.replace_child(old.offset, top)?;
        root.region = root.region.union(&root_cell(quadrant, size));
        Ok(top)
    }

    /// Insert into the subtree of a non-root node whose cell contains the
    /// entry, creating quadrant nodes on the way down.
    fn insert_contained(&self, cfg: &mut Config, mut node: Node, entry: Entry) -> Result<()> {
        loop {
            let Some(quadrant) = subnode_index(&entry.region, node.region.center()) else {
                node.add_entry(entry);
                cfg.store_node(node)?;
                return Ok(());
            };

            if let Some(child) = self.find_child(cfg, &mut node, quadrant)? {
                node = child;
                continue;
            }
            if is_zero_width(&entry.region) {
                node.add_entry(entry);
                cfg.store_node(node)?;
                return Ok(());
            }

            node.materialize_all(cfg)?;
            let cell = quadrant_cell(&node.region, quadrant);
            let child = cfg.create_node(cell, Some(node.page))?;
            node.add_child(child.page)?;
            let parent = cfg.store_node(node)?;
            node = cfg.load_child(child.page, parent)?;
        }
    }

    /// The child of a non-root node covering `quadrant`, if it exists.
    fn find_child(&self, cfg: &mut Config, node: &mut Node, quadrant: usize) -> Result<Option<Node>> {
        let center = node.region.center();
        for pos in 0..node.child_count() {
            let child = node.get_sub_node(pos, cfg)?;
            if subnode_index(&child.region, center) == Some(quadrant) {
                return Ok(Some(child));
            }
        }
        Ok(None)
    }

    // ========================================================================
    // Delete
    // ========================================================================

    /// Remove one entry equal to `entry`. Returns false if none exists.
    pub(crate) fn delete(&self, cfg: &mut Config, entry: &Entry) -> Result<bool> {
        let Some(root) = cfg.root() else {
            return Ok(false);
        };
        let root = cfg.load(root)?;
        self.remove(cfg, root, entry)
    }

    /// Search children first, then the node's own entries. A child left with
    /// neither entries nor children is destroyed. The root always matches and
    /// is never destroyed.
    fn remove(&self, cfg: &mut Config, mut node: Node, entry: &Entry) -> Result<bool> {
        let is_root = node.parent.is_none();
        if !is_root && !node.region.contains(&entry.region) {
            return Ok(false);
        }

        for pos in 0..node.child_count() {
            let child = node.get_sub_node(pos, cfg)?;
            let child_page = child.page;
            if !self.remove(cfg, child, entry)? {
                continue;
            }

            let child = cfg.load_child(child_page, node.page)?;
            if child.is_leaf() && child.entries.is_empty() {
                let mut node = cfg.load(node.page)?;
                node.materialize_all(cfg)?;
                node.remove_child(child_page.offset)?;
                cfg.destroy_node(child);
                cfg.store_node(node)?;
            }
            return Ok(true);
        }

        if node.remove_entry(entry) {
            cfg.store_node(node)?;
            return Ok(true);
        }
        Ok(false)
    }
}

// ============================================================================
// Geometry
// ============================================================================

/// Quadrant of `center` that `region` lies in, touching the center lines
/// allowed. None if the region crosses a center line.
pub(crate) fn subnode_index(region: &Region, center: (f64, f64)) -> Option<usize> {
    let (cx, cy) = center;
    let mut index = None;
    if region.min_x >= cx {
        if region.min_y >= cy {
            index = Some(3);
        }
        if region.max_y <= cy {
            index = Some(1);
        }
    }
    if region.max_x <= cx {
        if region.min_y >= cy {
            index = Some(2);
        }
        if region.max_y <= cy {
            index = Some(0);
        }
    }
    index
}

/// Cell of `quadrant` inside a non-root node's cell.
fn quadrant_cell(cell: &Region, quadrant: usize) -> Region {
    let (cx, cy) = cell.center();
    let (min_x, max_x) = if quadrant & 1 == 1 {
        (cx, cell.max_x)
    } else {
        (cell.min_x, cx)
    };
    let (min_y, max_y) = if quadrant & 2 == 2 {
        (cy, cell.max_y)
    } else {
        (cell.min_y, cy)
    };
    Region {
        min_x,
        min_y,
        max_x,
        max_y,
    }
}

/// Root child cell of `quadrant` with side `size`, anchored at the origin.
fn root_cell(quadrant: usize, size: f64) -> Region {
    let (min_x, max_x) = if quadrant & 1 == 1 { (0.0, size) } else { (-size, 0.0) };
    let (min_y, max_y) = if quadrant & 2 == 2 { (0.0, size) } else { (-size, 0.0) };
    Region {
        min_x,
        min_y,
        max_x,
        max_y,
    }
}

fn origin_region() -> Region {
    Region {
        min_x: 0.0,
        min_y: 0.0,
        max_x: 0.0,
        max_y: 0.0,
    }
}

/// Side a root cell of `quadrant` needs to contain `region`.
fn quadrant_extent(quadrant: usize, region: &Region) -> f64 {
    let x = if quadrant & 1 == 1 { region.max_x } else { -region.min_x };
    let y = if quadrant & 2 == 2 { region.max_y } else { -region.min_y };
    x.max(y)
}

/// Smallest power of two, at least 1, that is >= `extent`. None past
/// [`MAX_CELL_SIZE`].
fn cell_size(extent: f64) -> Option<f64> {
    if extent > MAX_CELL_SIZE {
        return None;
    }
    let mut size = 1.0;
    while size < extent {
        size *= 2.0;
    }
    Some(size)
}

/// True if the region has no usable width on some axis, relative to the
/// magnitude of its coordinates. Such entries never get nodes of their own.
fn is_zero_width(region: &Region) -> bool {
    axis_is_zero_width(region.min_x, region.max_x) || axis_is_zero_width(region.min_y, region.max_y)
}

fn axis_is_zero_width(min: f64, max: f64) -> bool {
    let width = max - min;
    if width == 0.0 {
        return true;
    }
    let scaled = width / min.abs().max(max.abs());
    binary_exponent(scaled) <= MIN_BINARY_EXPONENT
}

/// Unbiased binary exponent of a positive double.
fn binary_exponent(value: f64) -> i32 {
    ((value.to_bits() >> 52) & 0x7ff) as i32 - 1023
}
