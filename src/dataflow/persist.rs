//! Saved dataflow documents.
//!
//! A document holds the lineage of one dataflow as a list of nodes numbered
//! from zero in topological order. By-example steps are stored as the
//! programs they resolved to, so loading never re-runs inference and a loaded
//! dataflow produces exactly the rows the saved one did.

use super::Dataflow;
use super::graph::{NodeId, NodeKind};
use crate::dataflow::Engine;
use crate::error::{Result, ResultExt as _, WrangleError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::collections::HashMap;
use std::path::Path;
use uuid::Uuid;

pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: NodeId,
    pub node: NodeKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataflowDocument {
    pub version: u32,
    /// Identifier of this saved lineage
    pub lineage_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub nodes: Vec<NodeRecord>,
    /// Node the dataflow handle pointed at
    pub output: NodeId,
    /// SHA-256 of the compact JSON encoding of `nodes`
    pub checksum: String,
}

impl DataflowDocument {
    /// Snapshot the lineage of `dataflow`, resolving by-example steps.
    ///
    /// # Errors
    ///
    /// Inference failures of by-example steps, as they would surface when
    /// materializing.
    pub fn from_dataflow(dataflow: &Dataflow) -> Result<Self> {
        let lineage = dataflow.lineage()?;
        let positions: HashMap<NodeId, NodeId> = lineage
            .iter()
            .enumerate()
            .map(|(i, node)| (node.id, NodeId::from_index(i)))
            .collect();

        let mut nodes = Vec::with_capacity(lineage.len());
        for node in &lineage {
            let kind = match &node.kind {
                NodeKind::Step { parent, step } if step.is_by_example() => NodeKind::Step {
                    parent: *parent,
                    step: dataflow.resolve_step(node.id)?,
                },
                other => other.clone(),
            };
            let id = positions
                .get(&node.id)
                .copied()
                .ok_or_else(|| WrangleError::Other(format!("node {} missing", node.id)))?;
            nodes.push(NodeRecord {
                id,
                node: kind.remap(&positions)?,
            });
        }

        let output = positions
            .get(&dataflow.id())
            .copied()
            .ok_or_else(|| WrangleError::Other("output node missing from lineage".to_owned()))?;
        let checksum = checksum(&nodes)?;

        Ok(Self {
            version: FORMAT_VERSION,
            lineage_id: Uuid::new_v4(),
            created_at: Utc::now(),
            nodes,
            output,
            checksum,
        })
    }

    /// Check version, checksum and node numbering.
    ///
    /// # Errors
    ///
    /// `DataProcessing` describing the first problem found.
    pub fn verify(&self) -> Result<()> {
        if self.version != FORMAT_VERSION {
            return Err(WrangleError::DataProcessing(format!(
                "unsupported dataflow format version {} (expected {FORMAT_VERSION})",
                self.version
            )));
        }
        let actual = checksum(&self.nodes)?;
        if actual != self.checksum {
            return Err(WrangleError::DataProcessing(format!(
                "checksum mismatch: expected {}, found {actual}",
                self.checksum
            )));
        }
        if let Some((i, record)) = self
            .nodes
            .iter()
            .enumerate()
            .find(|(i, record)| record.id.index() != *i)
        {
            return Err(WrangleError::DataProcessing(format!(
                "node at position {i} is numbered {}",
                record.id
            )));
        }
        if self.output.index() >= self.nodes.len() {
            return Err(WrangleError::DataProcessing(format!(
                "output node {} is not in the document",
                self.output
            )));
        }
        Ok(())
    }
}

fn checksum(nodes: &[NodeRecord]) -> Result<String> {
    let bytes = serde_json::to_vec(nodes)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

pub(super) fn save(dataflow: &Dataflow, path: &Path) -> Result<()> {
    let document = DataflowDocument::from_dataflow(dataflow)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(&document)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write dataflow to {}", path.display()))?;

    tracing::info!(
        lineage = %document.lineage_id,
        nodes = document.nodes.len(),
        "Saved dataflow to {}",
        path.display()
    );
    Ok(())
}

pub(super) fn load(engine: &Engine, path: &Path) -> Result<Dataflow> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read dataflow from {}", path.display()))?;
    let document: DataflowDocument = serde_json::from_str(&contents)?;
    document.verify()?;

    let nodes: Vec<(NodeId, NodeKind)> = document
        .nodes
        .into_iter()
        .map(|record| (record.id, record.node))
        .collect();
    let ids = engine.inner.graph.import(&nodes)?;
    let output = ids
        .get(&document.output)
        .copied()
        .ok_or_else(|| WrangleError::DataProcessing("output node was not loaded".to_owned()))?;

    tracing::info!(
        lineage = %document.lineage_id,
        nodes = nodes.len(),
        "Loaded dataflow from {}",
        path.display()
    );
    Ok(engine.dataflow(output))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::DeriveExample;
    use crate::pipeline::Step;
    use crate::record::Frame;

    fn flow(engine: &Engine) -> Dataflow {
        let frame = Frame::from_text_rows(
            &["pickup"],
            &[&["2009-01-04"], &["2013-08-22"], &["2020-01-01"]],
        )
        .unwrap();
        engine
            .from_frame(frame)
            .derive_column_by_example(
                "pickup",
                "weekday",
                [("2009-01-04", "Sunday"), ("2013-08-22", "Thursday")],
            )
            .unwrap()
    }

    #[test]
    fn test_by_example_steps_saved_as_programs() {
        let engine = Engine::new();
        let document = DataflowDocument::from_dataflow(&flow(&engine)).unwrap();

        assert_eq!(document.nodes.len(), 2);
        assert_eq!(document.output.index(), 1);
        assert!(matches!(
            &document.nodes[1].node,
            NodeKind::Step {
                step: Step::DeriveColumn { .. },
                ..
            }
        ));
        document.verify().unwrap();
    }

    #[test]
    fn test_tampered_document_rejected() {
        let engine = Engine::new();
        let mut document = DataflowDocument::from_dataflow(&flow(&engine)).unwrap();
        document.nodes[1].node = NodeKind::Step {
            parent: NodeId::from_index(0),
            step: Step::DeriveColumnByExample {
                column: "pickup".to_owned(),
                new_column: "weekday".to_owned(),
                examples: vec![DeriveExample::new("2009-01-04", "Sun")],
            },
        };
        assert!(matches!(
            document.verify(),
            Err(WrangleError::DataProcessing(_))
        ));
    }

    #[test]
    fn test_save_load_in_fresh_engine() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("flows").join("weekday.json");

        let original = flow(&Engine::new());
        original.save(&path)?;

        let loaded = Engine::new().load(&path)?;
        assert_eq!(loaded.to_frame()?, original.to_frame()?);
        Ok(())
    }
}
