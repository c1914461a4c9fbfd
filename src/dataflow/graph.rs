//! Append-only arena of dataflow nodes.
//!
//! Nodes are never modified or removed once pushed. Ids grow monotonically and
//! a node's parents always have smaller ids, so sorting ids ascending gives a
//! topological order of any lineage.

use crate::error::{Result, WrangleError};
use crate::pipeline::spec::{SchemaPolicy, Step};
use crate::source::SourceSpec;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Position of a node in its engine's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(usize);

impl NodeId {
    pub(crate) fn from_index(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a node computes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum NodeKind {
    Source { source: SourceSpec },
    Step { parent: NodeId, step: Step },
    Append { parents: Vec<NodeId>, policy: SchemaPolicy },
}

impl NodeKind {
    pub fn parents(&self) -> &[NodeId] {
        match self {
            Self::Source { .. } => &[],
            Self::Step { parent, .. } => std::slice::from_ref(parent),
            Self::Append { parents, .. } => parents,
        }
    }

    pub fn op_name(&self) -> &'static str {
        match self {
            Self::Source { .. } => "source",
            Self::Step { step, .. } => step.name(),
            Self::Append { .. } => "append_rows",
        }
    }

    pub(crate) fn remap(&self, ids: &HashMap<NodeId, NodeId>) -> Result<Self> {
        let lookup = |id: &NodeId| {
            ids.get(id).copied().ok_or_else(|| {
                WrangleError::DataProcessing(format!("node references unknown parent {id}"))
            })
        };
        Ok(match self {
            Self::Source { source } => Self::Source {
                source: source.clone(),
            },
            Self::Step { parent, step } => Self::Step {
                parent: lookup(parent)?,
                step: step.clone(),
            },
            Self::Append { parents, policy } => Self::Append {
                parents: parents.iter().map(lookup).collect::<Result<_>>()?,
                policy: *policy,
            },
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
}

/// Shared arena. Readers clone `Arc<Node>` handles out under a short read lock.
#[derive(Debug, Default)]
pub struct Graph {
    nodes: RwLock<Vec<Arc<Node>>>,
}

impl Graph {
    pub fn push(&self, kind: NodeKind) -> NodeId {
        let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
        let id = NodeId(nodes.len());
        nodes.push(Arc::new(Node { id, kind }));
        id
    }

    /// # Errors
    ///
    /// `Other` when `id` was not allocated by this arena.
    pub fn get(&self, id: NodeId) -> Result<Arc<Node>> {
        let nodes = self.nodes.read().unwrap_or_else(PoisonError::into_inner);
        nodes
            .get(id.0)
            .cloned()
            .ok_or_else(|| WrangleError::Other(format!("unknown dataflow node {id}")))
    }

    pub fn len(&self) -> usize {
        self.nodes.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `id` and every node it depends on, in ascending (topological) order.
    ///
    /// # Errors
    ///
    /// As for [`Self::get`].
    pub fn lineage(&self, id: NodeId) -> Result<Vec<Arc<Node>>> {
        let mut seen = BTreeSet::new();
        let mut pending = vec![id];
        while let Some(next) = pending.pop() {
            if seen.insert(next) {
                pending.extend_from_slice(self.get(next)?.kind.parents());
            }
        }
        seen.into_iter().map(|id| self.get(id)).collect()
    }

    /// Copy nodes from another lineage into this arena.
    ///
    /// `nodes` must be in topological order and reference parents only among
    /// themselves. Returns the mapping from old ids to new ids.
    ///
    /// # Errors
    ///
    /// `DataProcessing` when a node references a parent outside `nodes`.
    pub fn import(&self, nodes: &[(NodeId, NodeKind)]) -> Result<HashMap<NodeId, NodeId>> {
        let mut ids = HashMap::with_capacity(nodes.len());
        for (old, kind) in nodes {
            let kind = kind.remap(&ids)?;
            ids.insert(*old, self.push(kind));
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Frame;

    fn source() -> NodeKind {
        NodeKind::Source {
            source: SourceSpec::Inline {
                frame: Frame::default(),
            },
        }
    }

    #[test]
    fn test_lineage_is_topological() {
        let graph = Graph::default();
        let a = graph.push(source());
        let b = graph.push(source());
        let unrelated = graph.push(source());
        let step = graph.push(NodeKind::Step {
            parent: a,
            step: Step::Take { count: 1 },
        });
        let merged = graph.push(NodeKind::Append {
            parents: vec![step, b],
            policy: SchemaPolicy::Pad,
        });

        let ids: Vec<NodeId> = graph
            .lineage(merged)
            .unwrap()
            .iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(ids, vec![a, b, step, merged]);
        assert!(!ids.contains(&unrelated));
    }

    #[test]
    fn test_import_remaps_parents() {
        let source_graph = Graph::default();
        let a = source_graph.push(source());
        let b = source_graph.push(NodeKind::Step {
            parent: a,
            step: Step::Take { count: 2 },
        });
        let nodes: Vec<(NodeId, NodeKind)> = source_graph
            .lineage(b)
            .unwrap()
            .iter()
            .map(|n| (n.id, n.kind.clone()))
            .collect();

        let target = Graph::default();
        target.push(source());
        let ids = target.import(&nodes).unwrap();

        let new_b = ids[&b];
        assert_eq!(new_b.index(), 2);
        assert_eq!(target.get(new_b).unwrap().kind.parents(), &[ids[&a]]);
    }

    #[test]
    fn test_import_rejects_dangling_parent() {
        let graph = Graph::default();
        let orphan = vec![(
            NodeId(5),
            NodeKind::Step {
                parent: NodeId(4),
                step: Step::Take { count: 1 },
            },
        )];
        assert!(graph.import(&orphan).is_err());
    }
}
