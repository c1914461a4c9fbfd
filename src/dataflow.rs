//! Lazy, immutable dataflows.
//!
//! An [`Engine`] owns an append-only arena of nodes. A [`Dataflow`] is a
//! cheap handle to one node: applying a step pushes a new node whose parent is
//! the current one and returns a handle to it, so the original dataflow is
//! never changed and can keep being used.
//!
//! ## Example Usage
//!
//! ```no_run
//! use wrangle::dataflow::Engine;
//! use wrangle::expr::col;
//! use wrangle::pipeline::NullRelationship;
//!
//! # fn example() -> wrangle::error::Result<()> {
//! let engine = Engine::new();
//! let green = engine.read_csv("green_tripdata.csv")?;
//!
//! let cleaned = green
//!     .replace_na(["pickup_datetime", "dropoff_datetime"])?
//!     .drop_nulls(["pickup_datetime", "dropoff_datetime"], NullRelationship::All)?
//!     .rename_columns([("lpep_pickup_datetime", "pickup_datetime")])?
//!     .filter(col("distance").gt(0))?;
//!
//! // Nothing has been read yet; head pulls just enough rows
//! let preview = cleaned.head(5)?;
//! println!("{}", preview.to_csv_string()?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Errors
//!
//! Malformed steps are rejected by the call that applies them and the parent
//! dataflow stays usable. Problems that depend on the data (a column that is
//! not there, examples no program fits) surface when the dataflow is
//! materialized, wrapped with the node and step that raised them.

pub mod graph;
pub mod persist;

use crate::config::EngineSettings;
use crate::error::{Result, WrangleError};
use crate::expr::Expr;
use crate::inference::{DeriveExample, ExampleSynthesizer, SplitExample, Synthesizer};
use crate::pipeline::spec::{ConversionPolicy, NullRelationship, SchemaPolicy, Step, TypeConversion};
use crate::pipeline::{Demand, Executor, RowStream, validate_step};
use crate::profiling::{self, DataProfile};
use crate::record::{Frame, Schema, Value};
use crate::selector::ColumnSelector;
use crate::source::{self, FormatHint, SourceSpec};
use crate::type_inference::ColumnTypesBuilder;
use graph::{Graph, NodeId, NodeKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug)]
struct EngineInner {
    id: Uuid,
    graph: Graph,
    settings: Arc<EngineSettings>,
    synthesizer: Arc<dyn Synthesizer>,
}

/// Owner of the node arena, settings and synthesis strategy shared by every
/// dataflow built from it. Cloning is cheap and shares the arena.
#[derive(Debug, Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// Engine with default settings and the default synthesizer.
    pub fn new() -> Self {
        Self::build(EngineSettings::default(), Arc::new(ExampleSynthesizer))
    }

    /// # Errors
    ///
    /// `Config` when the settings fail validation.
    pub fn with_settings(settings: EngineSettings) -> Result<Self> {
        Self::with_synthesizer(settings, Arc::new(ExampleSynthesizer))
    }

    /// Engine using a custom program synthesis strategy.
    ///
    /// # Errors
    ///
    /// `Config` when the settings fail validation.
    pub fn with_synthesizer(
        settings: EngineSettings,
        synthesizer: Arc<dyn Synthesizer>,
    ) -> Result<Self> {
        settings
            .validate()
            .map_err(|e| WrangleError::Config(format!("{e:#}")))?;
        Ok(Self::build(settings, synthesizer))
    }

    fn build(settings: EngineSettings, synthesizer: Arc<dyn Synthesizer>) -> Self {
        let id = Uuid::new_v4();
        tracing::debug!(engine = %id, "Created engine");
        Self {
            inner: Arc::new(EngineInner {
                id,
                graph: Graph::default(),
                settings: Arc::new(settings),
                synthesizer,
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.inner.settings
    }

    /// Number of nodes created so far.
    pub fn node_count(&self) -> usize {
        self.inner.graph.len()
    }

    /// Dataflow reading `path`, detecting the format when the hint is `Auto`.
    ///
    /// # Errors
    ///
    /// `Io` when the file cannot be read for detection, `UnrecognizedFormat`
    /// when no reader matches.
    pub fn read(&self, path: impl AsRef<Path>, hint: FormatHint) -> Result<Dataflow> {
        let spec = source::resolve(path.as_ref(), hint, &self.inner.settings)?;
        Ok(self.source(spec))
    }

    /// Comma-delimited file with a header row.
    ///
    /// # Errors
    ///
    /// `Io` when the file does not exist.
    pub fn read_csv(&self, path: impl AsRef<Path>) -> Result<Dataflow> {
        self.read_delimited(path, ',', true)
    }

    /// # Errors
    ///
    /// `Io` when the file does not exist, `InvalidStep` for a non-ASCII
    /// delimiter.
    pub fn read_delimited(
        &self,
        path: impl AsRef<Path>,
        delimiter: char,
        has_header: bool,
    ) -> Result<Dataflow> {
        let path = existing_file(path.as_ref())?;
        if !delimiter.is_ascii() {
            return Err(WrangleError::InvalidStep(format!(
                "delimiter {delimiter:?} is not an ASCII character"
            )));
        }
        Ok(self.source(SourceSpec::Delimited {
            path,
            delimiter,
            has_header,
        }))
    }

    /// # Errors
    ///
    /// `Io` when the file does not exist.
    pub fn read_json_lines(&self, path: impl AsRef<Path>) -> Result<Dataflow> {
        let path = existing_file(path.as_ref())?;
        Ok(self.source(SourceSpec::JsonLines { path }))
    }

    /// Dataflow over rows already in memory.
    pub fn from_frame(&self, frame: Frame) -> Dataflow {
        self.source(SourceSpec::Inline { frame })
    }

    /// Rebuild a dataflow saved with [`Dataflow::save`].
    ///
    /// # Errors
    ///
    /// `Io` when the file cannot be read, `DataProcessing` when it is not a
    /// valid dataflow document.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<Dataflow> {
        persist::load(self, path.as_ref())
    }

    fn source(&self, spec: SourceSpec) -> Dataflow {
        let id = self.inner.graph.push(NodeKind::Source { source: spec });
        self.dataflow(id)
    }

    fn dataflow(&self, id: NodeId) -> Dataflow {
        Dataflow {
            engine: self.clone(),
            id,
        }
    }

    fn executor(&self) -> Executor<'_> {
        Executor::new(
            &self.inner.graph,
            &self.inner.settings,
            self.inner.synthesizer.as_ref(),
        )
    }

    fn same_engine(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

fn existing_file(path: &Path) -> Result<PathBuf> {
    if !path.is_file() {
        return Err(WrangleError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("source file not found: {}", path.display()),
        )));
    }
    Ok(path.to_path_buf())
}

/// Handle to one immutable node of an engine's graph.
#[derive(Debug, Clone)]
pub struct Dataflow {
    engine: Engine,
    id: NodeId,
}

impl Dataflow {
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// New dataflow with `step` appended to this one's lineage.
    ///
    /// # Errors
    ///
    /// `InvalidStep` when the step is malformed; `self` is unaffected.
    pub fn apply(&self, step: Step) -> Result<Self> {
        validate_step(&step)?;
        let description = step.description();
        let id = self.engine.inner.graph.push(NodeKind::Step {
            parent: self.id,
            step,
        });
        tracing::debug!(node = %id, parent = %self.id, "Added step: {description}");
        Ok(self.engine.dataflow(id))
    }

    /// Turn null-like text tokens (the engine's `null_tokens`) into nulls.
    ///
    /// # Errors
    ///
    /// `InvalidStep` when the selector lists no columns or an empty name.
    pub fn replace_na(&self, columns: impl Into<ColumnSelector>) -> Result<Self> {
        self.apply(Step::ReplaceNa {
            columns: columns.into(),
            tokens: None,
        })
    }

    /// Turn the given text tokens into nulls.
    ///
    /// # Errors
    ///
    /// `InvalidStep` when `tokens` is empty or the selector is invalid.
    pub fn replace_na_tokens<I, S>(&self, columns: impl Into<ColumnSelector>, tokens: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.apply(Step::ReplaceNa {
            columns: columns.into(),
            tokens: Some(tokens.into_iter().map(Into::into).collect()),
        })
    }

    /// # Errors
    ///
    /// `InvalidStep` for an invalid selector. Missing columns are reported
    /// when rows are pulled.
    pub fn drop_nulls(
        &self,
        columns: impl Into<ColumnSelector>,
        relationship: NullRelationship,
    ) -> Result<Self> {
        self.apply(Step::DropNulls {
            columns: columns.into(),
            relationship,
        })
    }

    /// # Errors
    ///
    /// `InvalidStep` when `pairs` is empty or names an empty column.
    /// Collisions and missing sources are detected at materialization.
    pub fn rename_columns<I, A, B>(&self, pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (A, B)>,
        A: Into<String>,
        B: Into<String>,
    {
        self.apply(Step::RenameColumns {
            pairs: pairs
                .into_iter()
                .map(|(from, to)| (from.into(), to.into()))
                .collect(),
        })
    }

    /// # Errors
    ///
    /// `InvalidStep` for an invalid selector.
    pub fn keep_columns(&self, columns: impl Into<ColumnSelector>) -> Result<Self> {
        self.apply(Step::KeepColumns {
            columns: columns.into(),
        })
    }

    /// # Errors
    ///
    /// `InvalidStep` for an invalid selector.
    pub fn drop_columns(&self, columns: impl Into<ColumnSelector>) -> Result<Self> {
        self.apply(Step::DropColumns {
            columns: columns.into(),
        })
    }

    /// Replace cells whose text equals `find`.
    ///
    /// # Errors
    ///
    /// `InvalidStep` for an invalid selector.
    pub fn replace(
        &self,
        columns: impl Into<ColumnSelector>,
        find: impl Into<Value>,
        replace_with: impl Into<Value>,
    ) -> Result<Self> {
        self.apply(Step::Replace {
            columns: columns.into(),
            find: find.into(),
            replace_with: replace_with.into(),
        })
    }

    /// # Errors
    ///
    /// `InvalidStep` for an invalid selector. A fill value that does not
    /// fit the column type is kept as given and the column becomes `Unknown`.
    pub fn fill_nulls(
        &self,
        columns: impl Into<ColumnSelector>,
        value: impl Into<Value>,
    ) -> Result<Self> {
        self.apply(Step::FillNulls {
            columns: columns.into(),
            value: value.into(),
        })
    }

    /// Parse cells as decimals; cells that do not parse become null.
    ///
    /// # Errors
    ///
    /// `InvalidStep` for an invalid selector.
    pub fn to_number(&self, columns: impl Into<ColumnSelector>) -> Result<Self> {
        self.apply(Step::ToNumber {
            columns: columns.into(),
        })
    }

    /// Convert columns, nulling values that do not convert.
    ///
    /// # Errors
    ///
    /// See [`Self::set_column_types_with`].
    pub fn set_column_types(&self, conversions: Vec<TypeConversion>) -> Result<Self> {
        self.set_column_types_with(conversions, ConversionPolicy::Null)
    }

    /// # Errors
    ///
    /// `InvalidStep` when no conversions are given or one is malformed. With
    /// [`ConversionPolicy::Fail`] a value that does not convert fails
    /// materialization with `TypeConversionFailure`.
    pub fn set_column_types_with(
        &self,
        conversions: Vec<TypeConversion>,
        on_error: ConversionPolicy,
    ) -> Result<Self> {
        self.apply(Step::SetColumnTypes {
            conversions,
            on_error,
        })
    }

    /// # Errors
    ///
    /// `InvalidStep` when `predicate` is not boolean-valued.
    pub fn filter(&self, predicate: Expr) -> Result<Self> {
        self.apply(Step::Filter { predicate })
    }

    /// # Errors
    ///
    /// Never fails today; returns `Result` like every other step.
    pub fn take(&self, count: usize) -> Result<Self> {
        self.apply(Step::Take { count })
    }

    /// Split `column` into new columns following the examples.
    ///
    /// # Errors
    ///
    /// `InvalidStep` when the step is malformed. No split is inferred here;
    /// `InferenceAmbiguous` surfaces at materialization when the examples
    /// or values admit none.
    pub fn split_column_by_example(
        &self,
        column: impl Into<String>,
        examples: impl IntoIterator<Item = SplitExample>,
    ) -> Result<Self> {
        self.apply(Step::SplitColumnByExample {
            column: column.into(),
            examples: examples.into_iter().collect(),
        })
    }

    /// Split `column` on a delimiter or fixed widths detected from its values.
    ///
    /// # Errors
    ///
    /// See [`Self::split_column_by_example`].
    pub fn split_column_auto(&self, column: impl Into<String>) -> Result<Self> {
        self.split_column_by_example(column, Vec::new())
    }

    /// Add `new_column` computed from `column` by a program that reproduces
    /// every example.
    ///
    /// # Errors
    ///
    /// `InvalidStep` when there are no examples. `InferenceAmbiguous`
    /// surfaces at materialization when no program reproduces them.
    pub fn derive_column_by_example<I, E>(
        &self,
        column: impl Into<String>,
        new_column: impl Into<String>,
        examples: I,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = E>,
        E: Into<DeriveExample>,
    {
        self.apply(Step::DeriveColumnByExample {
            column: column.into(),
            new_column: new_column.into(),
            examples: examples.into_iter().map(Into::into).collect(),
        })
    }

    /// Rows of this dataflow followed by the rows of each of `others`, padding
    /// columns that are missing from some inputs with nulls.
    ///
    /// # Errors
    ///
    /// See [`Self::append_rows_with`].
    pub fn append_rows(&self, others: &[&Self]) -> Result<Self> {
        self.append_rows_with(others, SchemaPolicy::Pad)
    }

    /// # Errors
    ///
    /// `InvalidStep` when `others` is empty. Schema differences are checked
    /// at materialization.
    pub fn append_rows_with(&self, others: &[&Self], policy: SchemaPolicy) -> Result<Self> {
        if others.is_empty() {
            return Err(WrangleError::InvalidStep(
                "append_rows: no dataflows to append".to_owned(),
            ));
        }
        let mut parents = Vec::with_capacity(others.len() + 1);
        parents.push(self.id);
        for other in others {
            parents.push(self.adopt(other)?);
        }
        let id = self
            .engine
            .inner
            .graph
            .push(NodeKind::Append { parents, policy });
        tracing::debug!(node = %id, inputs = others.len() + 1, "Added append_rows");
        Ok(self.engine.dataflow(id))
    }

    // Node id for `other` in this engine, copying its lineage over if needed.
    fn adopt(&self, other: &Self) -> Result<NodeId> {
        if self.engine.same_engine(&other.engine) {
            return Ok(other.id);
        }
        let nodes: Vec<(NodeId, NodeKind)> = other
            .engine
            .inner
            .graph
            .lineage(other.id)?
            .iter()
            .map(|node| (node.id, node.kind.clone()))
            .collect();
        let ids = self.engine.inner.graph.import(&nodes)?;
        tracing::debug!(
            from = %other.engine.id(),
            nodes = nodes.len(),
            "Imported lineage from another engine"
        );
        ids.get(&other.id)
            .copied()
            .ok_or_else(|| WrangleError::Other(format!("node {} was not imported", other.id)))
    }

    /// First `n` rows.
    ///
    /// # Errors
    ///
    /// Any error raised while reading the sources or running the steps,
    /// wrapped in `Step` with the failing node.
    pub fn head(&self, n: usize) -> Result<Frame> {
        self.engine.executor().materialize(self.id, Demand::Rows(n))
    }

    /// Every row.
    ///
    /// # Errors
    ///
    /// Any error raised while reading the sources or running the steps,
    /// wrapped in `Step` with the failing node.
    pub fn to_frame(&self) -> Result<Frame> {
        self.engine.executor().materialize(self.id, Demand::All)
    }

    /// Lazy row-at-a-time stream.
    ///
    /// # Errors
    ///
    /// Any error raised while reading the sources or running the steps,
    /// wrapped in `Step` with the failing node.
    pub fn stream(&self) -> Result<RowStream> {
        self.engine.executor().open(self.id)
    }

    /// Output schema; reads only what inference and source scanning need.
    ///
    /// # Errors
    ///
    /// Any error raised while reading the sources or running the steps,
    /// wrapped in `Step` with the failing node.
    pub fn schema(&self) -> Result<Schema> {
        Ok(self.stream()?.schema().clone())
    }

    /// # Errors
    ///
    /// Any error raised while reading the sources or running the steps,
    /// wrapped in `Step` with the failing node.
    pub fn row_count(&self) -> Result<usize> {
        self.stream()?
            .try_fold(0, |count, row| row.map(|_| count + 1))
    }

    /// Profile of every column.
    ///
    /// # Errors
    ///
    /// Any error raised while reading the sources or running the steps,
    /// wrapped in `Step` with the failing node.
    pub fn get_profile(&self) -> Result<DataProfile> {
        self.profile_columns(ColumnSelector::All)
    }

    /// # Errors
    ///
    /// `ColumnNotFound` when the selector names a missing column, otherwise
    /// as for [`Self::to_frame`].
    pub fn profile_columns(&self, columns: impl Into<ColumnSelector>) -> Result<DataProfile> {
        profiling::profile(self.stream()?, &columns.into(), &self.engine.inner.settings)
    }

    /// Two-phase type inference over this dataflow.
    pub fn column_types_builder(&self) -> ColumnTypesBuilder {
        ColumnTypesBuilder::new(self.clone())
    }

    /// Persist the lineage, with by-example steps stored as their inferred
    /// programs.
    ///
    /// # Errors
    ///
    /// `Io` when the file cannot be written; materialization errors from
    /// resolving by-example steps.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        persist::save(self, path.as_ref())
    }

    /// The lineage as one numbered line per node.
    ///
    /// # Errors
    ///
    /// `Other` when the lineage references a node the engine does not hold.
    pub fn describe(&self) -> Result<String> {
        let mut out = String::new();
        for node in self.engine.inner.graph.lineage(self.id)? {
            let line = match &node.kind {
                NodeKind::Source { source } => source.description(),
                NodeKind::Step { parent, step } => format!("{} <- {parent}", step.description()),
                NodeKind::Append { parents, policy } => format!(
                    "append rows of {} ({policy:?})",
                    parents
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            };
            out.push_str(&format!("{}: {line}\n", node.id));
        }
        Ok(out)
    }

    pub(crate) fn lineage(&self) -> Result<Vec<Arc<graph::Node>>> {
        self.engine.inner.graph.lineage(self.id)
    }

    pub(crate) fn resolve_step(&self, id: NodeId) -> Result<Step> {
        self.engine.executor().resolve(id)
    }
}
