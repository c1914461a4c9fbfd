//! Pull-based execution of a lineage.
//!
//! Opening a node opens its parents recursively and stacks one lazy row
//! transformation per step on top of the source streams. Nothing is read
//! until rows are pulled, and only as many rows as the consumer pulls are
//! produced: `head(5)` over a filter reads just far enough to find five
//! matching rows.
//!
//! One [`Executor`] serves one top-level call. Inferred programs and scanned
//! source schemas are memoized for the duration of that call so several
//! consumers of the same node do not repeat the work; nothing is shared
//! between calls.

use super::ops;
use super::spec::Step;
use crate::config::EngineSettings;
use crate::dataflow::graph::{Graph, NodeId, NodeKind};
use crate::error::{Result, WrangleError};
use crate::inference::Synthesizer;
use crate::record::{Frame, Row, Schema};
use crate::source::{self, SourceSpec};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub type RowIter = Box<dyn Iterator<Item = Result<Row>> + Send>;

/// A schema plus a lazy iterator over rows aligned to it.
pub struct RowStream {
    schema: Schema,
    rows: RowIter,
}

impl RowStream {
    pub fn new(schema: Schema, rows: impl Iterator<Item = Result<Row>> + Send + 'static) -> Self {
        Self {
            schema,
            rows: Box::new(rows),
        }
    }

    pub fn from_rows(schema: Schema, rows: Vec<Row>) -> Self {
        Self::new(schema, rows.into_iter().map(Ok))
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn into_parts(self) -> (Schema, RowIter) {
        (self.schema, self.rows)
    }

    /// Pull rows according to `demand` into a frame.
    ///
    /// # Errors
    ///
    /// The first error yielded by the stream.
    pub fn collect_frame(self, demand: Demand) -> Result<Frame> {
        let rows: Vec<Row> = match demand {
            Demand::Rows(n) => self.rows.take(n).collect::<Result<_>>()?,
            Demand::All => self.rows.collect::<Result<_>>()?,
        };
        Frame::new(self.schema, rows)
    }

    // Row errors raised below this node keep their own context.
    fn in_context(self, node: NodeId, op: &'static str) -> Self {
        let rows = self.rows.map(move |row| row.map_err(|e| e.at_step(node.index(), op)));
        Self::new(self.schema, rows)
    }
}

impl Iterator for RowStream {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        self.rows.next()
    }
}

impl fmt::Debug for RowStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowStream")
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

/// How many rows a materialization needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Demand {
    Rows(usize),
    All,
}

impl From<Option<usize>> for Demand {
    fn from(limit: Option<usize>) -> Self {
        limit.map_or(Self::All, Self::Rows)
    }
}

pub struct Executor<'a> {
    graph: &'a Graph,
    settings: &'a Arc<EngineSettings>,
    synthesizer: &'a dyn Synthesizer,
    schemas: HashMap<NodeId, Schema>,
    resolved: HashMap<NodeId, Step>,
}

impl<'a> Executor<'a> {
    pub fn new(
        graph: &'a Graph,
        settings: &'a Arc<EngineSettings>,
        synthesizer: &'a dyn Synthesizer,
    ) -> Self {
        Self {
            graph,
            settings,
            synthesizer,
            schemas: HashMap::new(),
            resolved: HashMap::new(),
        }
    }

    /// Lazy stream of the rows produced by `id`.
    ///
    /// # Errors
    ///
    /// Errors raised while building the stream (missing columns, failed
    /// inference, unreadable sources) are wrapped with the node and step that
    /// raised them.
    pub fn open(&mut self, id: NodeId) -> Result<RowStream> {
        let node = self.graph.get(id)?;
        let op = node.kind.op_name();
        let context = |e: WrangleError| e.at_step(id.index(), op);

        let stream = match &node.kind {
            NodeKind::Source { source } => {
                let schema = self.source_schema(id, source).map_err(context)?;
                source::open(source, schema).map_err(context)?
            }
            NodeKind::Step { parent, step } => {
                let step = if step.is_by_example() {
                    self.resolve(id)?
                } else {
                    step.clone()
                };
                let input = self.open(*parent)?;
                tracing::debug!(node = %id, op, "Opening step");
                ops::apply(&step, input, self.settings).map_err(context)?
            }
            NodeKind::Append { parents, policy } => {
                let inputs = parents
                    .iter()
                    .map(|parent| self.open(*parent))
                    .collect::<Result<Vec<_>>>()?;
                ops::append(inputs, *policy).map_err(context)?
            }
        };
        Ok(stream.in_context(id, op))
    }

    /// Materialize `id` into a frame.
    ///
    /// # Errors
    ///
    /// Any error opening or pulling the node, wrapped in `Step`.
    pub fn materialize(&mut self, id: NodeId, demand: Demand) -> Result<Frame> {
        self.open(id)?.collect_frame(demand)
    }

    /// The concrete step a node runs: by-example steps are replaced by the
    /// inferred program, other steps are returned as they are.
    ///
    /// # Errors
    ///
    /// `InferenceAmbiguous` (wrapped with step context) when no program fits.
    pub fn resolve(&mut self, id: NodeId) -> Result<Step> {
        if let Some(step) = self.resolved.get(&id) {
            return Ok(step.clone());
        }
        let node = self.graph.get(id)?;
        let NodeKind::Step { parent, step } = &node.kind else {
            return Err(WrangleError::Other(format!("node {id} is not a step")));
        };
        if !step.is_by_example() {
            return Ok(step.clone());
        }

        let resolved = self
            .infer(*parent, step)
            .map_err(|e| e.at_step(id.index(), step.name()))?;
        tracing::debug!(node = %id, "Inferred {}", resolved.description());
        self.resolved.insert(id, resolved.clone());
        Ok(resolved)
    }

    fn infer(&mut self, parent: NodeId, step: &Step) -> Result<Step> {
        match step {
            Step::SplitColumnByExample { column, examples } if examples.is_empty() => {
                let sample = self.sample_column(parent, column)?;
                let program = self.synthesizer.detect_split(&sample, self.settings)?;
                Ok(Step::SplitColumn {
                    column: column.clone(),
                    program,
                })
            }
            Step::SplitColumnByExample { column, examples } => Ok(Step::SplitColumn {
                column: column.clone(),
                program: self.synthesizer.split(examples, self.settings)?,
            }),
            Step::DeriveColumnByExample {
                column,
                new_column,
                examples,
            } => Ok(Step::DeriveColumn {
                column: column.clone(),
                new_column: new_column.clone(),
                program: self.synthesizer.derive(examples, self.settings)?,
            }),
            other => Ok(other.clone()),
        }
    }

    // Non-null renderings of `column` over the first sampled rows of `parent`.
    fn sample_column(&mut self, parent: NodeId, column: &str) -> Result<Vec<String>> {
        let stream = self.open(parent)?;
        let idx = stream.schema().require(column)?;
        let mut sample = Vec::new();
        for row in stream.take(self.settings.split_sample_size) {
            if let Some(value) = row?.get(idx).filter(|v| !v.is_null()) {
                sample.push(value.render().into_owned());
            }
        }
        Ok(sample)
    }

    fn source_schema(&mut self, id: NodeId, spec: &SourceSpec) -> Result<Schema> {
        if let Some(schema) = self.schemas.get(&id) {
            return Ok(schema.clone());
        }
        let schema = source::scan_schema(spec, self.settings)?;
        self.schemas.insert(id, schema.clone());
        Ok(schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::ExampleSynthesizer;
    use crate::record::Value;

    fn inline(graph: &Graph) -> NodeId {
        let frame = Frame::from_text_rows(&["pickup"], &[&["2013-08-22 10:00:00"], &[""]]).unwrap();
        graph.push(NodeKind::Source {
            source: SourceSpec::Inline { frame },
        })
    }

    #[test]
    fn test_demand_limits_rows() {
        let graph = Graph::default();
        let settings = Arc::new(EngineSettings::default());
        let id = inline(&graph);

        let mut executor = Executor::new(&graph, &settings, &ExampleSynthesizer);
        assert_eq!(executor.materialize(id, Demand::Rows(1)).unwrap().height(), 1);
        assert_eq!(executor.materialize(id, Demand::All).unwrap().height(), 2);
    }

    #[test]
    fn test_by_example_step_resolved_once() {
        let graph = Graph::default();
        let settings = Arc::new(EngineSettings::default());
        let source = inline(&graph);
        let split = graph.push(NodeKind::Step {
            parent: source,
            step: Step::SplitColumnByExample {
                column: "pickup".to_owned(),
                examples: Vec::new(),
            },
        });

        let mut executor = Executor::new(&graph, &settings, &ExampleSynthesizer);
        let resolved = executor.resolve(split).unwrap();
        assert!(matches!(resolved, Step::SplitColumn { .. }));
        assert_eq!(executor.resolve(split).unwrap(), resolved);

        let frame = executor.materialize(split, Demand::All).unwrap();
        assert_eq!(
            frame.schema().names().collect::<Vec<_>>(),
            vec!["pickup", "pickup_1", "pickup_2"]
        );
        assert_eq!(frame.get(0, "pickup_2"), Some(&Value::from("10:00:00")));
    }

    #[test]
    fn test_errors_name_the_failing_node() {
        let graph = Graph::default();
        let settings = Arc::new(EngineSettings::default());
        let source = inline(&graph);
        let keep = graph.push(NodeKind::Step {
            parent: source,
            step: Step::KeepColumns {
                columns: "dropoff".into(),
            },
        });
        let take = graph.push(NodeKind::Step {
            parent: keep,
            step: Step::Take { count: 1 },
        });

        let mut executor = Executor::new(&graph, &settings, &ExampleSynthesizer);
        let err = executor.materialize(take, Demand::All).unwrap_err();
        match err {
            WrangleError::Step { node, op, .. } => {
                assert_eq!(node, keep.index());
                assert_eq!(op, "keep_columns");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
