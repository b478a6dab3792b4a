//! Capacity-bounded node strategy (R-tree).
//!
//! Entries live in leaves only. Every internal node's region is the bounding
//! box of its children, every leaf's region the bounding box of its entries.
//!
//! # Insert
//! ```text
//! choose_leaf ──▶ add entry ──▶ adjust_tree
//!                                 │ overflow? split (Linear | Quadratic)
//!                                 │ store node, then load parent
//!                                 │ add sibling, recompute parent region
//!                                 ▼
//!                               root split? grow a new root
//! ```
//!
//! # Delete
//! Find the leaf holding the exact pair, remove it, then condense: underfull
//! non-root nodes leave the tree and their entries are reinserted. A root
//! left with a single child is replaced by that child.

use log::debug;

use crate::common::{Entry, Error, PageRef, Region, Result};
use crate::index::split::{partition, ChildSlot};
use crate::index::{Config, IndexOptions, Node, SplitPolicy};

#[derive(Debug, Clone, Copy)]
pub(crate) struct RTree {
    max_entries: usize,
    min_entries: usize,
    policy: SplitPolicy,
}

impl RTree {
    pub(crate) fn new(options: &IndexOptions) -> Self {
        Self {
            max_entries: options.max_node_entries,
            min_entries: options.min_node_entries,
            policy: options.split_policy,
        }
    }

    // ========================================================================
    // Insert
    // ========================================================================

    pub(crate) fn insert(&self, cfg: &mut Config, entry: Entry) -> Result<()> {
        let Some(root) = cfg.root() else {
            let mut leaf = cfg.create_node(entry.region, None)?;
            leaf.add_entry(entry);
            let page = cfg.store_node(leaf)?;
            cfg.set_root(Some(page));
            return Ok(());
        };

        let mut leaf = self.choose_leaf(cfg, root, &entry.region)?;
        leaf.region = leaf.region.union(&entry.region);
        leaf.add_entry(entry);
        self.adjust_tree(cfg, leaf)
    }

    /// Descend from `root` by least enlargement, ties going to the smaller
    /// region.
    fn choose_leaf(&self, cfg: &mut Config, root: PageRef, region: &Region) -> Result<Node> {
        let mut node = cfg.load(root)?;
        while !node.is_leaf() {
            let mut best = 0;
            let mut best_cost = (f64::INFINITY, f64::INFINITY);
            for pos in 0..node.child_count() {
                let child = node.get_sub_node(pos, cfg)?;
                let cost = (child.region.enlargement(region), child.region.area());
                if cost < best_cost {
                    best_cost = cost;
                    best = pos;
                }
            }
            node = node.get_sub_node(best, cfg)?;
        }
        Ok(node)
    }

    /// Walk from a changed node to the root, splitting overflowing nodes and
    /// refreshing regions.
    fn adjust_tree(&self, cfg: &mut Config, mut node: Node) -> Result<()> {
        loop {
            let sibling = if self.overflows(&node) {
                Some(self.split(cfg, &mut node)?)
            } else {
                None
            };
            let region = node.region;
            let parent = node.parent;
            let page = cfg.store_node(node)?;

            let Some(parent) = parent else {
                if let Some(sibling) = sibling {
                    self.grow_root(cfg, page, sibling)?;
                }
                return Ok(());
            };

            let mut parent = cfg.load(parent)?;
            if sibling.is_none() && parent.region.contains(&region) {
                return Ok(());
            }
            parent.materialize_all(cfg)?;
            if let Some(sibling) = sibling {
                parent.add_child(sibling)?;
            }
            parent.region = self.children_bounds(cfg, &mut parent)?;
            node = parent;
        }
    }

    fn overflows(&self, node: &Node) -> bool {
        if node.is_leaf() {
            node.entries.len() > self.max_entries
        } else {
            node.child_count() > self.max_entries
        }
    }

    /// Move part of `node` into a new sibling. Both regions are recomputed.
    /// Returns the sibling's slot; `node` is left for the caller to store.
    fn split(&self, cfg: &mut Config, node: &mut Node) -> Result<PageRef> {
        let mut sibling = cfg.create_node(node.region, node.parent)?;

        if node.is_leaf() {
            let entries = std::mem::take(&mut node.entries);
            let (keep, moved) = partition(entries, self.min_entries, self.policy);
            node.entries = keep;
            sibling.entries = moved;
            node.region = bounds_or(node.entries_bounds(), node.region);
            sibling.region = bounds_or(sibling.entries_bounds(), sibling.region);
        } else {
            let mut slots = Vec::with_capacity(node.child_count());
            for pos in 0..node.child_count() {
                let child = node.get_sub_node(pos, cfg)?;
                slots.push(ChildSlot {
                    page: child.page,
                    region: child.region,
                });
            }
            let (keep, moved) = partition(slots, self.min_entries, self.policy);

            node.region = bounds_or(Region::bounding(keep.iter().map(|s| &s.region)), node.region);
            node.set_children(keep.iter().map(|s| s.page).collect());
            sibling.region =
                bounds_or(Region::bounding(moved.iter().map(|s| &s.region)), sibling.region);
            sibling.set_children(moved.iter().map(|s| s.page).collect());
            for slot in &moved {
                cfg.bind_parent(slot.page.offset, Some(sibling.page));
            }
        }

        debug!(
            "split node {}: {} stay, sibling {} takes {}",
            node.page,
            node.entries.len().max(node.child_count()),
            sibling.page,
            sibling.entries.len().max(sibling.child_count())
        );
        cfg.store_node(sibling)
    }

    fn grow_root(&self, cfg: &mut Config, old_root: PageRef, sibling: PageRef) -> Result<()> {
        let left = cfg.load(old_root)?.region;
        let right = cfg.load(sibling)?.region;

        let mut root = cfg.create_node(left.union(&right), None)?;
        root.add_child(old_root)?;
        root.add_child(sibling)?;
        let page = cfg.store_node(root)?;

        cfg.bind_parent(old_root.offset, Some(page));
        cfg.bind_parent(sibling.offset, Some(page));
        cfg.set_root(Some(page));
        debug!("root split, new root at {}", page);
        Ok(())
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
        if !root.region.contains(&entry.region) {
            return Ok(false);
        }
        let Some(mut leaf) = self.find_leaf(cfg, root, entry)? else {
            return Ok(false);
        };

        leaf.remove_entry(entry);
        let orphans = self.condense_tree(cfg, leaf)?;

        if !orphans.is_empty() {
            debug!("reinserting {} entries from dissolved nodes", orphans.len());
        }
        for orphan in orphans {
            self.insert(cfg, orphan)?;
        }
        Ok(true)
    }

    fn find_leaf(&self, cfg: &mut Config, mut node: Node, entry: &Entry) -> Result<Option<Node>> {
        if node.is_leaf() {
            return Ok(node.entries.contains(entry).then_some(node));
        }
        for pos in 0..node.child_count() {
            let child = node.get_sub_node(pos, cfg)?;
            if !child.region.contains(&entry.region) {
                continue;
            }
            if let Some(leaf) = self.find_leaf(cfg, child, entry)? {
                return Ok(Some(leaf));
            }
        }
        Ok(None)
    }

    /// Walk from a shrunken leaf to the root, dissolving underfull nodes.
    /// Returns the entries of dissolved subtrees.
    fn condense_tree(&self, cfg: &mut Config, leaf: Node) -> Result<Vec<Entry>> {
        let mut orphans = Vec::new();
        let mut node = leaf;

        while let Some(parent) = node.parent {
            let size = if node.is_leaf() {
                node.entries.len()
            } else {
                node.child_count()
            };

            if size < self.min_entries {
                let offset = node.page.offset;
                self.dissolve(cfg, node, &mut orphans)?;
                let mut parent = cfg.load(parent)?;
                parent.materialize_all(cfg)?;
                if !parent.remove_child(offset)? {
                    return Err(Error::Structural(format!(
                        "node at {} is not a child of its parent {}",
                        offset, parent.page
                    )));
                }
                node = parent;
            } else {
                node.region = self.node_bounds(cfg, &mut node)?;
                cfg.store_node(node)?;
                node = cfg.load(parent)?;
            }
        }

        self.settle_root(cfg, node)?;
        Ok(orphans)
    }

    /// Collect every entry below `node` and destroy the subtree.
    fn dissolve(&self, cfg: &mut Config, mut node: Node, orphans: &mut Vec<Entry>) -> Result<()> {
        orphans.append(&mut node.entries);
        for pos in 0..node.child_count() {
            let child = node.get_sub_node(pos, cfg)?;
            self.dissolve(cfg, child, orphans)?;
        }
        cfg.destroy_node(node);
        Ok(())
    }

    /// Store the root after condensing, dropping it if empty and replacing it
    /// by its child while it has exactly one.
    fn settle_root(&self, cfg: &mut Config, mut root: Node) -> Result<()> {
        loop {
            if root.is_leaf() && root.entries.is_empty() {
                cfg.destroy_node(root);
                cfg.set_root(None);
                return Ok(());
            }
            if root.child_count() != 1 {
                root.region = self.node_bounds(cfg, &mut root)?;
                cfg.store_node(root)?;
                return Ok(());
            }

            let child = root.get_sub_node(0, cfg)?;
            debug!("shortening tree: {} replaces root {}", child.page, root.page);
            cfg.destroy_node(root);
            cfg.bind_parent(child.page.offset, None);
            cfg.set_root(Some(child.page));
            root = cfg.load(child.page)?;
        }
    }

    // ========================================================================
    // Regions
    // ========================================================================

    fn node_bounds(&self, cfg: &mut Config, node: &mut Node) -> Result<Region> {
        if node.is_leaf() {
            Ok(bounds_or(node.entries_bounds(), node.region))
        } else {
            self.children_bounds(cfg, node)
        }
    }

    fn children_bounds(&self, cfg: &mut Config, node: &mut Node) -> Result<Region> {
        let mut bounds: Option<Region> = None;
        for pos in 0..node.child_count() {
            let child = node.get_sub_node(pos, cfg)?;
            bounds = Some(match bounds {
                Some(b) => b.union(&child.region),
                None => child.region,
            });
        }
        Ok(bounds_or(bounds, node.region))
    }
}

fn bounds_or(bounds: Option<Region>, fallback: Region) -> Region {
    bounds.unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ByteOrder, MemoryChannel, PageStore};

    fn region(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Region {
        Region::new(min_x, min_y, max_x, max_y).unwrap()
    }

    fn point_entry(x: f64, y: f64, payload: i32) -> Entry {
        Entry::new(Region::point(x, y).unwrap(), payload)
    }

    fn setup(options: IndexOptions) -> (RTree, Config) {
        let store = PageStore::new(Box::new(MemoryChannel::new()), ByteOrder::Little, false);
        (RTree::new(&options), Config::new(store, options))
    }

    /// Check region invariants and fill bounds; returns (entries, depth).
    fn check_subtree(tree: &RTree, cfg: &mut Config, page: PageRef, is_root: bool) -> (usize, usize) {
        let mut node = cfg.load(page).unwrap();
        if node.is_leaf() {
            if !is_root {
                assert!(node.entries().len() >= tree.min_entries);
            }
            assert!(node.entries().len() <= tree.max_entries);
            assert_eq!(Some(node.region), node.entries_bounds());
            return (node.entries().len(), 1);
        }

        assert!(node.child_count() <= tree.max_entries);
        if !is_root {
            assert!(node.child_count() >= tree.min_entries);
        }
        let mut total = 0;
        let mut depths = Vec::new();
        let mut bounds: Option<Region> = None;
        for pos in 0..node.child_count() {
            let child = node.get_sub_node(pos, cfg).unwrap();
            bounds = Some(bounds.map_or(child.region, |b| b.union(&child.region)));
            let (count, depth) = check_subtree(tree, cfg, child.page, false);
            total += count;
            depths.push(depth);
        }
        assert_eq!(Some(node.region), bounds, "internal region is the children's MBR");
        assert!(depths.windows(2).all(|w| w[0] == w[1]), "leaves at one depth");
        (total, depths[0] + 1)
    }

    fn grid(n: i32) -> Vec<Entry> {
        (0..n)
            .map(|i| point_entry((i % 10) as f64, (i / 10) as f64, i))
            .collect()
    }

    #[test]
    fn test_first_insert_creates_root_leaf() {
        let (tree, mut cfg) = setup(IndexOptions::rtree().with_node_capacity(2, 4));
        tree.insert(&mut cfg, point_entry(1.0, 2.0, 7)).unwrap();

        let root = cfg.load(cfg.root().unwrap()).unwrap();
        assert!(root.is_leaf());
        assert_eq!(root.region, Region::point(1.0, 2.0).unwrap());
        assert_eq!(cfg.node_count(), 1);
    }

    #[test]
    fn test_splits_keep_invariants() {
        for policy in [SplitPolicy::Linear, SplitPolicy::Quadratic] {
            let options = IndexOptions::rtree()
                .with_node_capacity(2, 4)
                .with_split_policy(policy);
            let (tree, mut cfg) = setup(options);

            for entry in grid(60) {
                tree.insert(&mut cfg, entry).unwrap();
            }
            let root = cfg.root().unwrap();
            let (count, depth) = check_subtree(&tree, &mut cfg, root, true);
            assert_eq!(count, 60, "{:?}", policy);
            assert!(depth >= 3, "{:?}", policy);
            assert_eq!(cfg.load(root).unwrap().region, region(0.0, 0.0, 9.0, 5.0));
        }
    }

    #[test]
    fn test_delete_condenses_and_shortens() {
        let (tree, mut cfg) = setup(IndexOptions::rtree().with_node_capacity(2, 4));
        let entries = grid(40);
        for entry in &entries {
            tree.insert(&mut cfg, *entry).unwrap();
        }

        for (i, entry) in entries.iter().enumerate() {
            assert!(tree.delete(&mut cfg, entry).unwrap());
            assert!(!tree.delete(&mut cfg, entry).unwrap(), "already gone");
            if let Some(root) = cfg.root() {
                let (count, _) = check_subtree(&tree, &mut cfg, root, true);
                assert_eq!(count, entries.len() - i - 1);
            }
        }
        assert_eq!(cfg.root(), None);
        assert_eq!(cfg.node_count(), 0);
    }

    #[test]
    fn test_delete_requires_exact_pair() {
        let (tree, mut cfg) = setup(IndexOptions::rtree().with_node_capacity(2, 4));
        tree.insert(&mut cfg, point_entry(1.0, 1.0, 1)).unwrap();

        assert!(!tree.delete(&mut cfg, &point_entry(1.0, 1.0, 2)).unwrap());
        assert!(!tree.delete(&mut cfg, &point_entry(5.0, 5.0, 1)).unwrap());
        assert!(tree.delete(&mut cfg, &point_entry(1.0, 1.0, 1)).unwrap());
    }

    #[test]
    fn test_duplicates_deleted_one_at_a_time() {
        let (tree, mut cfg) = setup(IndexOptions::rtree().with_node_capacity(2, 4));
        for _ in 0..6 {
            tree.insert(&mut cfg, point_entry(3.0, 3.0, 9)).unwrap();
        }
        for _ in 0..6 {
            assert!(tree.delete(&mut cfg, &point_entry(3.0, 3.0, 9)).unwrap());
        }
        assert!(!tree.delete(&mut cfg, &point_entry(3.0, 3.0, 9)).unwrap());
    }
}
