//! Query engine: visitor-driven depth-first traversal.

use crate::common::{Entry, PageRef, Region, Result};
use crate::index::{Config, Node};

/// Receives the nodes and entries a query reaches.
///
/// # Order
/// `visit_node` is called once for every node whose region intersects the
/// query, before any of its children. After the children, `visit_data` is
/// called for each of the node's own entries that match. Sibling order is
/// unspecified.
pub trait Visitor {
    fn visit_node(&mut self, _node: &Node) {}

    fn visit_data(&mut self, entry: &Entry);
}

/// Collects matching entries and counts visited nodes.
#[derive(Debug, Default, Clone)]
pub struct CollectingVisitor {
    pub entries: Vec<Entry>,
    pub nodes_visited: usize,
}

impl CollectingVisitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Payloads of the collected entries, sorted.
    pub fn payloads(&self) -> Vec<i32> {
        let mut payloads: Vec<i32> = self.entries.iter().map(|e| e.payload).collect();
        payloads.sort_unstable();
        payloads
    }
}

impl Visitor for CollectingVisitor {
    fn visit_node(&mut self, _node: &Node) {
        self.nodes_visited += 1;
    }

    fn visit_data(&mut self, entry: &Entry) {
        self.entries.push(*entry);
    }
}

/// Which entries a query reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum QueryKind {
    /// Entries whose region intersects the query.
    Intersection,
    /// Entries whose region lies inside the query.
    Containment,
}

impl QueryKind {
    fn matches(self, query: &Region, entry: &Entry) -> bool {
        match self {
            QueryKind::Intersection => query.intersects(&entry.region),
            QueryKind::Containment => query.contains(&entry.region),
        }
    }
}

/// Visit the tree under `root`. Subtrees are pruned by intersection for
/// every kind of query.
pub(crate) fn traverse<V: Visitor + ?Sized>(
    cfg: &mut Config,
    root: PageRef,
    query: &Region,
    kind: QueryKind,
    visitor: &mut V,
) -> Result<()> {
    let root = cfg.load(root)?;
    visit(cfg, root, query, kind, visitor)
}

fn visit<V: Visitor + ?Sized>(
    cfg: &mut Config,
    mut node: Node,
    query: &Region,
    kind: QueryKind,
    visitor: &mut V,
) -> Result<()> {
    if !node.region.intersects(query) {
        return Ok(());
    }
    visitor.visit_node(&node);

    for pos in 0..node.child_count() {
        let child = node.get_sub_node(pos, cfg)?;
        visit(cfg, child, query, kind, visitor)?;
    }
    for entry in node.entries() {
        if kind.matches(query, entry) {
            visitor.visit_data(entry);
        }
    }
    Ok(())
}
