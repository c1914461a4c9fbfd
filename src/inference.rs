//! Example-driven inference of string transformation programs.
//!
//! - [`program`]: the replayable programs (`DeriveProgram`, `SplitProgram`)
//! - [`synthesizer`]: the [`Synthesizer`] strategy and its default search
//! - [`split`]: example-free split detection and generated column names
//!
//! Inference runs when a by-example step is materialized; saved dataflows
//! store the inferred program instead of the examples' search.

pub mod program;
pub mod split;
pub mod synthesizer;

pub use program::{
    Atom, DateComponent, DeriveExample, DeriveProgram, Extractor, SplitExample, SplitProgram,
};
pub use split::{detect_split, split_column_names};
pub use synthesizer::{ExampleSynthesizer, Synthesizer};
