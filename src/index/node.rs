//! In-memory view of one page of the tree.

use crate::common::{Entry, Error, PageRef, Region, Result};
use crate::index::Config;

/// One node of the persistent tree.
///
/// A node is identified by the offset of its slot. It holds its bounding
/// region, the entries stored directly at it, and a description of its child
/// links. Children are not owned: the node only knows where their links live
/// and reads them on demand, in order, the first time they are touched.
///
/// # Child links
/// ```text
///  child_block (on disk)      children (materialized prefix)
/// ┌────┬────┬────┬────┐      ┌────┬────┐
/// │ c0 │ c1 │ c2 │ c3 │  ──▶ │ c0 │ c1 │   child_count = 4
/// └────┴────┴────┴────┘      └────┴────┘
/// ```
/// Reading child `k` for the first time reads every link before it that is
/// not yet materialized. Links are fixed-width, so random access would be
/// possible; the sequential prefix keeps a node's in-memory state a simple
/// function of how far it has been walked.
///
/// # Parent
/// `parent` is a lookup-only back-reference set when the node is reached
/// from its parent. It never keeps the parent alive.
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) page: PageRef,
    pub(crate) region: Region,
    pub(crate) entries: Vec<Entry>,
    /// Link block currently on disk, if any.
    pub(crate) child_block: Option<PageRef>,
    /// Materialized prefix of the child links.
    pub(crate) children: Vec<PageRef>,
    pub(crate) child_count: usize,
    pub(crate) parent: Option<PageRef>,
    /// False for a descriptor registered before its record was read.
    pub(crate) loaded: bool,
    /// The child list changed and needs a new link block on write.
    pub(crate) children_dirty: bool,
}

impl Node {
    /// A new, empty node.
    pub(crate) fn new(page: PageRef, region: Region) -> Self {
        Self {
            page,
            region,
            entries: Vec::new(),
            child_block: None,
            children: Vec::new(),
            child_count: 0,
            parent: None,
            loaded: true,
            children_dirty: false,
        }
    }

    /// A descriptor for a node whose record has not been read yet.
    pub(crate) fn unloaded(page: PageRef) -> Self {
        let placeholder = Region {
            min_x: 0.0,
            min_y: 0.0,
            max_x: 0.0,
            max_y: 0.0,
        };
        Self {
            loaded: false,
            ..Self::new(page, placeholder)
        }
    }

    /// A node just decoded from its record; no links are materialized yet.
    pub(crate) fn decoded(
        page: PageRef,
        region: Region,
        entries: Vec<Entry>,
        child_block: Option<PageRef>,
        child_count: usize,
    ) -> Self {
        Self {
            entries,
            child_block,
            child_count,
            ..Self::new(page, region)
        }
    }

    pub fn page(&self) -> PageRef {
        self.page
    }

    pub fn region(&self) -> &Region {
        &self.region
    }

    /// Entries stored directly at this node.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn child_count(&self) -> usize {
        self.child_count
    }

    /// How many child links have been read so far.
    pub fn materialized_children(&self) -> usize {
        self.children.len()
    }

    pub fn is_leaf(&self) -> bool {
        self.child_count == 0
    }

    pub fn parent(&self) -> Option<PageRef> {
        self.parent
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// An independent copy with the same disk identity and children, detached
    /// from its parent.
    ///
    /// Entries and materialized links are owned by the copy, so changing one
    /// never affects the other.
    pub fn copy(&self) -> Node {
        Node {
            parent: None,
            ..self.clone()
        }
    }

    // ========================================================================
    // Children
    // ========================================================================

    /// Return child `pos`, loaded and bound to this node as its parent.
    pub(crate) fn get_sub_node(&mut self, pos: usize, cfg: &mut Config) -> Result<Node> {
        self.materialize_to(pos, cfg)?;
        cfg.load_child(self.children[pos], self.page)
    }

    /// Read child links up to and including `pos`, in order.
    pub(crate) fn materialize_to(&mut self, pos: usize, cfg: &mut Config) -> Result<()> {
        if pos >= self.child_count {
            return Err(Error::Structural(format!(
                "node at {} has {} children, child {} requested",
                self.page, self.child_count, pos
            )));
        }
        if pos < self.children.len() {
            return Ok(());
        }

        let block = self.child_block.ok_or_else(|| {
            Error::Structural(format!(
                "node at {} declares {} children but has no link block",
                self.page, self.child_count
            ))
        })?;
        while self.children.len() <= pos {
            let link = cfg.read_link(block, self.children.len())?;
            self.children.push(link);
        }
        cfg.remember_links(self);
        Ok(())
    }

    pub(crate) fn materialize_all(&mut self, cfg: &mut Config) -> Result<()> {
        match self.child_count {
            0 => Ok(()),
            count => self.materialize_to(count - 1, cfg),
        }
    }

    /// Child links; complete only after [`Node::materialize_all`].
    pub(crate) fn child_pages(&self) -> &[PageRef] {
        &self.children
    }

    pub(crate) fn add_child(&mut self, page: PageRef) -> Result<()> {
        self.require_materialized()?;
        self.children.push(page);
        self.child_count += 1;
        self.children_dirty = true;
        Ok(())
    }

    /// Remove the child at `offset`. Returns false if it isn't a child.
    pub(crate) fn remove_child(&mut self, offset: u64) -> Result<bool> {
        self.require_materialized()?;
        match self.children.iter().position(|c| c.offset == offset) {
            Some(pos) => {
                self.children.remove(pos);
                self.child_count -= 1;
                self.children_dirty = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub(crate) fn replace_child(&mut self, old_offset: u64, page: PageRef) -> Result<()> {
        self.require_materialized()?;
        let slot = self
            .children
            .iter_mut()
            .find(|c| c.offset == old_offset)
            .ok_or_else(|| {
                Error::Structural(format!(
                    "node at {} has no child at offset {}",
                    self.page, old_offset
                ))
            })?;
        *slot = page;
        self.children_dirty = true;
        Ok(())
    }

    pub(crate) fn set_children(&mut self, pages: Vec<PageRef>) {
        self.child_count = pages.len();
        self.children = pages;
        self.children_dirty = true;
    }

    fn require_materialized(&self) -> Result<()> {
        if self.children.len() != self.child_count {
            return Err(Error::Structural(format!(
                "node at {} changed with {} of {} children materialized",
                self.page,
                self.children.len(),
                self.child_count
            )));
        }
        Ok(())
    }

    // ========================================================================
    // Entries
    // ========================================================================

    pub(crate) fn add_entry(&mut self, entry: Entry) {
        self.entries.push(entry);
    }

    /// Remove the first entry equal to `entry`. Returns false if absent.
    pub(crate) fn remove_entry(&mut self, entry: &Entry) -> bool {
        match self.entries.iter().position(|e| e == entry) {
            Some(pos) => {
                self.entries.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Bounding box of the entries stored at this node.
    pub(crate) fn entries_bounds(&self) -> Option<Region> {
        Region::bounding(self.entries.iter().map(|e| &e.region))
    }
}
