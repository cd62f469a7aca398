//! The dependency graph over declared dependencies and parent/child links.
//!
//! # Overview
//!
//! Every active item is a node. An out-edge `A -> B` means B is a
//! prerequisite of A: either A declares a dependency on B, or A is the parent
//! containing child B (a parent cannot complete before its children are
//! terminal, so containment is a prerequisite edge too).
//!
//! # Design
//!
//! - **Reject, don't roll back**: `add_edge` simulates the insertion and
//!   refuses it with the offending cycle path if it would close a loop. The
//!   graph is never left holding a half-applied change.
//! - **Three-color DFS**: `topo_order` marks nodes white/gray/black; a gray
//!   revisit is a back edge and yields the cycle path.
//! - **Rebuilt, not stored**: the graph is derived from the item set on
//!   startup (`from_items`) and never persisted separately.

use crate::model::item::WorkItem;
use crate::model::item_id::ItemId;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

// ---------------------------------------------------------------------------
// CycleError
// ---------------------------------------------------------------------------

/// A dependency cycle. The path lists the item ids forming the loop, starting
/// and ending at the same id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleError {
    pub path: Vec<ItemId>,
}

impl CycleError {
    /// Number of distinct items in the cycle.
    #[must_use]
    pub fn len(&self) -> usize {
        self.path.len().saturating_sub(1)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for CycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.path.iter().map(ToString::to_string).collect();
        write!(
            f,
            "dependency cycle ({} items): {}",
            self.len(),
            rendered.join(" -> ")
        )
    }
}

impl std::error::Error for CycleError {}

// ---------------------------------------------------------------------------
// DepGraph
// ---------------------------------------------------------------------------

/// Directed prerequisite graph over the active item set.
#[derive(Debug, Clone, Default)]
pub struct DepGraph {
    nodes: BTreeSet<ItemId>,
    edges: BTreeMap<ItemId, BTreeSet<ItemId>>,
}

impl DepGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph from the active item set: one node per item, an edge
    /// per declared dependency and per parent -> child containment link.
    ///
    /// Edges pointing at ids absent from the set are kept; reference
    /// resolution is validated elsewhere and a dangling target simply becomes
    /// a node with no outgoing edges here.
    pub fn from_items<'a, I>(items: I) -> Self
    where
        I: IntoIterator<Item = &'a WorkItem>,
    {
        let mut graph = Self::new();
        for item in items {
            graph.add_node(item.id);
            for dep in &item.dependencies {
                graph.insert_edge(item.id, *dep);
            }
            if let Some(parent) = item.parent_id {
                graph.insert_edge(parent, item.id);
            }
        }
        graph
    }

    pub fn add_node(&mut self, id: ItemId) {
        self.nodes.insert(id);
    }

    #[must_use]
    pub fn contains(&self, id: ItemId) -> bool {
        self.nodes.contains(&id)
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Prerequisites of `id` (its out-neighbors).
    pub fn prerequisites(&self, id: ItemId) -> impl Iterator<Item = ItemId> + '_ {
        self.edges.get(&id).into_iter().flatten().copied()
    }

    /// Add a prerequisite edge `from -> to`, simulating first: if a path
    /// `to -> ... -> from` already exists the edge would close a cycle and is
    /// rejected, leaving the graph unchanged.
    ///
    /// # Errors
    ///
    /// [`CycleError`] with the path `from -> to -> ... -> from`.
    pub fn add_edge(&mut self, from: ItemId, to: ItemId) -> Result<(), CycleError> {
        if from == to {
            return Err(CycleError {
                path: vec![from, from],
            });
        }

        if let Some(mut path) = self.find_path(to, from) {
            // path is to -> ... -> from; the rejected edge closes it.
            let mut cycle = vec![from];
            cycle.append(&mut path);
            return Err(CycleError { path: cycle });
        }

        self.insert_edge(from, to);
        Ok(())
    }

    /// Remove an item and every edge touching it.
    pub fn remove_item(&mut self, id: ItemId) {
        self.nodes.remove(&id);
        self.edges.remove(&id);
        for targets in self.edges.values_mut() {
            targets.remove(&id);
        }
    }

    /// Topological order with prerequisites first: if `A -> B` then B comes
    /// before A in the result. Deterministic for a given graph.
    ///
    /// # Errors
    ///
    /// [`CycleError`] naming the first cycle encountered.
    pub fn topo_order(&self) -> Result<Vec<ItemId>, CycleError> {
        let mut color: HashMap<ItemId, Color> = HashMap::new();
        let mut order: Vec<ItemId> = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<ItemId> = Vec::new();

        for &node in &self.nodes {
            if color.get(&node).copied().unwrap_or(Color::White) == Color::White {
                self.visit(node, &mut color, &mut stack, &mut order)?;
            }
        }

        Ok(order)
    }

    fn insert_edge(&mut self, from: ItemId, to: ItemId) {
        self.nodes.insert(from);
        self.nodes.insert(to);
        self.edges.entry(from).or_default().insert(to);
    }

    /// DFS for a path `start -> ... -> target` along prerequisite edges.
    /// Returns the node sequence including both endpoints.
    fn find_path(&self, start: ItemId, target: ItemId) -> Option<Vec<ItemId>> {
        if start == target {
            return Some(vec![start]);
        }

        let mut visited: BTreeSet<ItemId> = BTreeSet::new();
        let mut parent: HashMap<ItemId, ItemId> = HashMap::new();
        let mut work: Vec<ItemId> = vec![start];
        visited.insert(start);

        while let Some(current) = work.pop() {
            for next in self.prerequisites(current) {
                if !visited.insert(next) {
                    continue;
                }
                parent.insert(next, current);
                if next == target {
                    let mut path = vec![target];
                    let mut cursor = target;
                    while let Some(&prev) = parent.get(&cursor) {
                        path.push(prev);
                        cursor = prev;
                    }
                    path.reverse();
                    return Some(path);
                }
                work.push(next);
            }
        }

        None
    }

    fn visit(
        &self,
        node: ItemId,
        color: &mut HashMap<ItemId, Color>,
        stack: &mut Vec<ItemId>,
        order: &mut Vec<ItemId>,
    ) -> Result<(), CycleError> {
        color.insert(node, Color::Gray);
        stack.push(node);

        for next in self.prerequisites(node) {
            match color.get(&next).copied().unwrap_or(Color::White) {
                Color::White => self.visit(next, color, stack, order)?,
                Color::Gray => {
                    // Back edge: the stack from `next` onward is the cycle.
                    let start = stack
                        .iter()
                        .position(|&n| n == next)
                        .unwrap_or(stack.len() - 1);
                    let mut path: Vec<ItemId> = stack[start..].to_vec();
                    path.push(next);
                    return Err(CycleError { path });
                }
                Color::Black => {}
            }
        }

        stack.pop();
        color.insert(node, Color::Black);
        order.push(node);
        Ok(())
    }
}

/// DFS colors for cycle detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    /// Not yet visited.
    White,
    /// Currently on the DFS stack.
    Gray,
    /// Fully processed.
    Black,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::{CycleError, DepGraph};
    use crate::model::item::{Kind, WorkItem};
    use crate::model::item_id::ItemId;
    use chrono::Utc;

    fn id(n: u32) -> ItemId {
        ItemId::top(n)
    }

    fn graph_of(edges: &[(u32, u32)]) -> DepGraph {
        let mut graph = DepGraph::new();
        for &(from, to) in edges {
            graph.add_edge(id(from), id(to)).unwrap();
        }
        graph
    }

    // -----------------------------------------------------------------------
    // add_edge / cycle rejection
    // -----------------------------------------------------------------------

    #[test]
    fn self_edge_is_rejected() {
        let mut graph = DepGraph::new();
        let err = graph.add_edge(id(1), id(1)).unwrap_err();
        assert_eq!(err.path, vec![id(1), id(1)]);
    }

    #[test]
    fn mutual_edge_is_rejected() {
        let mut graph = graph_of(&[(1, 2)]);
        let err = graph.add_edge(id(2), id(1)).unwrap_err();
        assert_eq!(err.path, vec![id(2), id(1), id(2)]);
        assert_eq!(err.len(), 2);
    }

    #[test]
    fn long_cycle_is_rejected_with_path() {
        let mut graph = graph_of(&[(1, 2), (2, 3), (3, 4)]);
        let err = graph.add_edge(id(4), id(1)).unwrap_err();
        assert_eq!(err.path.first(), Some(&id(4)));
        assert_eq!(err.path.last(), Some(&id(4)));
        assert_eq!(err.len(), 4);
    }

    #[test]
    fn rejected_edge_leaves_graph_unchanged() {
        let mut graph = graph_of(&[(1, 2), (2, 3)]);
        let before: Vec<ItemId> = graph.topo_order().unwrap();
        assert!(graph.add_edge(id(3), id(1)).is_err());
        assert_eq!(graph.topo_order().unwrap(), before);
        // The graph still accepts unrelated edges afterwards.
        graph.add_edge(id(1), id(3)).unwrap();
    }

    #[test]
    fn diamond_is_not_a_cycle() {
        let mut graph = graph_of(&[(1, 2), (1, 3), (2, 4)]);
        graph.add_edge(id(3), id(4)).unwrap();
        assert!(graph.topo_order().is_ok());
    }

    #[test]
    fn duplicate_edge_is_a_no_op() {
        let mut graph = graph_of(&[(1, 2)]);
        graph.add_edge(id(1), id(2)).unwrap();
        assert_eq!(graph.topo_order().unwrap().len(), 2);
    }

    // -----------------------------------------------------------------------
    // topo_order
    // -----------------------------------------------------------------------

    #[test]
    fn empty_graph_topo_order() {
        assert!(DepGraph::new().topo_order().unwrap().is_empty());
    }

    #[test]
    fn prerequisites_come_first() {
        let graph = graph_of(&[(1, 2), (2, 3), (1, 4)]);
        let order = graph.topo_order().unwrap();
        let pos = |n: u32| order.iter().position(|&x| x == id(n)).unwrap();
        assert!(pos(3) < pos(2));
        assert!(pos(2) < pos(1));
        assert!(pos(4) < pos(1));
    }

    #[test]
    fn topo_order_reports_preexisting_cycle() {
        // from_items can load a cycle that was hand-edited into the records.
        let now = Utc::now();
        let mut a = WorkItem::new(id(1), "First of a pair", Kind::Task, now);
        a.dependencies.insert(id(2));
        let mut b = WorkItem::new(id(2), "Second of a pair", Kind::Task, now);
        b.dependencies.insert(id(1));

        let graph = DepGraph::from_items([&a, &b]);
        let err: CycleError = graph.topo_order().unwrap_err();
        assert_eq!(err.path.first(), err.path.last());
        assert_eq!(err.len(), 2);
    }

    // -----------------------------------------------------------------------
    // from_items / containment edges
    // -----------------------------------------------------------------------

    #[test]
    fn containment_edges_order_children_before_parents() {
        let now = Utc::now();
        let parent = WorkItem::new(id(1), "Parent item", Kind::Task, now);
        let child_a = WorkItem::new(ItemId::child_of(1, 1), "First child", Kind::Task, now);
        let child_b = WorkItem::new(ItemId::child_of(1, 2), "Second child", Kind::Task, now);

        let graph = DepGraph::from_items([&parent, &child_a, &child_b]);
        let order = graph.topo_order().unwrap();
        let pos = |i: ItemId| order.iter().position(|&x| x == i).unwrap();
        assert!(pos(ItemId::child_of(1, 1)) < pos(id(1)));
        assert!(pos(ItemId::child_of(1, 2)) < pos(id(1)));
    }

    #[test]
    fn dependency_and_containment_edges_combine() {
        let now = Utc::now();
        let mut parent = WorkItem::new(id(1), "Parent item", Kind::Task, now);
        parent.dependencies.insert(id(2));
        let dep = WorkItem::new(id(2), "A dependency", Kind::Task, now);
        let child = WorkItem::new(ItemId::child_of(1, 1), "Only child", Kind::Task, now);

        let graph = DepGraph::from_items([&parent, &dep, &child]);
        assert_eq!(graph.node_count(), 3);
        let prereqs: Vec<ItemId> = graph.prerequisites(id(1)).collect();
        assert!(prereqs.contains(&id(2)));
        assert!(prereqs.contains(&ItemId::child_of(1, 1)));
    }

    #[test]
    fn remove_item_drops_incident_edges() {
        let mut graph = graph_of(&[(1, 2), (3, 2), (2, 4)]);
        graph.remove_item(id(2));
        assert!(!graph.contains(id(2)));
        assert!(graph.prerequisites(id(1)).next().is_none());
        assert!(graph.prerequisites(id(3)).next().is_none());
        // With 2 gone, the edge that used to cycle through it is legal.
        graph.add_edge(id(4), id(1)).unwrap();
    }

    #[test]
    fn large_chain_has_no_false_cycle() {
        let mut graph = DepGraph::new();
        for n in 1..1_000 {
            graph.add_edge(id(n), id(n + 1)).unwrap();
        }
        assert!(graph.topo_order().is_ok());
        let err = graph.add_edge(id(1_000), id(1)).unwrap_err();
        assert_eq!(err.len(), 1_000);
    }
}
