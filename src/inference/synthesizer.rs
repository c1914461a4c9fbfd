//! Program search from input/output examples.
//!
//! The default [`ExampleSynthesizer`] enumerates concatenations of constant
//! text and extractor outputs that reproduce the first example, keeps the
//! ones that also reproduce every other example, and returns the cheapest.
//! Enumeration order is fixed, so equal inputs always yield the same program.

use super::program::{Atom, DeriveExample, DeriveProgram, Extractor, SplitExample, SplitProgram};
use super::program::{DateComponent, parse_temporal};
use super::split;
use crate::config::EngineSettings;
use crate::error::{Result, WrangleError};
use std::fmt;

/// Strategy that turns examples into replayable programs.
///
/// The graph engine only talks to this trait, so alternative search
/// algorithms can be plugged into an [`Engine`](crate::dataflow::Engine).
pub trait Synthesizer: Send + Sync + fmt::Debug {
    /// Program mapping each example input to its output.
    ///
    /// # Errors
    ///
    /// `InferenceAmbiguous` when no program within the search limits fits
    /// every example.
    fn derive(&self, examples: &[DeriveExample], settings: &EngineSettings)
    -> Result<DeriveProgram>;

    /// Program splitting each example input into its outputs.
    ///
    /// # Errors
    ///
    /// `InferenceAmbiguous` when no split fits every example.
    fn split(&self, examples: &[SplitExample], settings: &EngineSettings) -> Result<SplitProgram>;

    /// Split program chosen from a sample of column values alone.
    ///
    /// # Errors
    ///
    /// `InferenceAmbiguous` when the sample shows no usable structure.
    fn detect_split(&self, sample: &[String], settings: &EngineSettings) -> Result<SplitProgram> {
        split::detect_split(sample, settings)
    }
}

/// Default enumerative synthesizer.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExampleSynthesizer;

impl Synthesizer for ExampleSynthesizer {
    fn derive(
        &self,
        examples: &[DeriveExample],
        settings: &EngineSettings,
    ) -> Result<DeriveProgram> {
        let Some(first) = examples.first() else {
            return Err(WrangleError::InvalidStep(
                "derivation needs at least one example".to_owned(),
            ));
        };

        let pieces = candidate_pieces(&first.input, &first.output, settings);
        let mut search = Search {
            examples,
            target: &first.output,
            pieces: &pieces,
            max_atoms: settings.synthesis.max_atoms,
            budget: settings.synthesis.max_candidates,
            explored: 0,
            best: None,
        };
        search.run(0, &mut Vec::new(), 0);

        tracing::debug!(
            explored = search.explored,
            examples = examples.len(),
            "Derivation search finished"
        );

        match search.best {
            Some((program, _)) => Ok(program),
            None if search.explored >= search.budget => Err(WrangleError::InferenceAmbiguous(
                format!(
                    "search limit of {} candidates reached without a program for '{}' -> '{}'",
                    search.budget, first.input, first.output
                ),
            )),
            None => Err(WrangleError::InferenceAmbiguous(format!(
                "no program reproduces all {} examples",
                examples.len()
            ))),
        }
    }

    fn split(&self, examples: &[SplitExample], settings: &EngineSettings) -> Result<SplitProgram> {
        let Some(first) = examples.first() else {
            return Err(WrangleError::InvalidStep(
                "split needs at least one example".to_owned(),
            ));
        };
        let width = first.outputs.len();
        if width == 0 || examples.iter().any(|e| e.outputs.len() != width) {
            return Err(WrangleError::InvalidStep(
                "split examples must all list the same, non-zero number of outputs".to_owned(),
            ));
        }

        if let Some(program) = delimiter_split(examples, width) {
            return Ok(program);
        }
        if let Some(program) = fixed_width_split(examples, width) {
            return Ok(program);
        }

        let mut programs = Vec::with_capacity(width);
        for column in 0..width {
            let column_examples: Vec<DeriveExample> = examples
                .iter()
                .filter_map(|e| {
                    let output = e.outputs.get(column)?;
                    Some(DeriveExample::new(e.input.clone(), output.clone()))
                })
                .collect();
            let program = self.derive(&column_examples, settings).map_err(|e| match e {
                WrangleError::InferenceAmbiguous(msg) => WrangleError::InferenceAmbiguous(
                    format!("split output {}: {msg}", column + 1),
                ),
                other => other,
            })?;
            programs.push(program);
        }
        Ok(SplitProgram::Derived { programs })
    }
}

// A delimiter that reproduces every example with `splitn(width)`. The text
// between the first two outputs of the first example is tried before single
// punctuation characters.
fn delimiter_split(examples: &[SplitExample], width: usize) -> Option<SplitProgram> {
    if width < 2 {
        return None;
    }
    let first = examples.first()?;

    let mut candidates: Vec<String> = Vec::new();
    if let (Some(a), Some(b)) = (first.outputs.first(), first.outputs.get(1))
        && let Some(rest) = first.input.strip_prefix(a.as_str())
        && let Some(end) = rest.find(b.as_str()).filter(|_| !b.is_empty())
        && let Some(gap) = rest.get(..end)
        && !gap.is_empty()
    {
        candidates.push(gap.to_owned());
    }
    for c in first.input.chars().filter(|c| !c.is_alphanumeric()) {
        let s = c.to_string();
        if !candidates.contains(&s) {
            candidates.push(s);
        }
    }

    candidates.into_iter().find_map(|delimiter| {
        let fits = examples.iter().all(|e| {
            let parts: Vec<&str> = e.input.splitn(width, delimiter.as_str()).collect();
            parts.len() == width && parts.iter().zip(&e.outputs).all(|(p, o)| p == o)
        });
        fits.then_some(SplitProgram::Delimiter {
            delimiter,
            columns: width,
        })
    })
}

// Outputs that concatenate back to the input at the same widths in every example.
fn fixed_width_split(examples: &[SplitExample], width: usize) -> Option<SplitProgram> {
    if width < 2 {
        return None;
    }
    let widths_of = |e: &SplitExample| -> Option<Vec<usize>> {
        (e.outputs.concat() == e.input)
            .then(|| e.outputs.iter().map(|o| o.chars().count()).collect())
    };
    let first = widths_of(examples.first()?)?;
    if first.contains(&0) {
        return None;
    }
    let leading = first.len() - 1;
    for example in examples.iter().skip(1) {
        let widths = widths_of(example)?;
        if widths.get(..leading) != first.get(..leading) {
            return None;
        }
    }
    Some(SplitProgram::FixedWidth { widths: first })
}

// Every atom that produces a non-empty piece of `target` from `input`,
// ordered by cost then by longer output.
fn candidate_pieces(input: &str, target: &str, settings: &EngineSettings) -> Vec<(Atom, String)> {
    let mut extractors = vec![Extractor::Whole];

    let mut delimiters: Vec<char> = Vec::new();
    for c in input.chars().filter(|c| !c.is_alphanumeric()) {
        if !delimiters.contains(&c) {
            delimiters.push(c);
        }
    }
    for delimiter in delimiters {
        let count = input.split(delimiter).count();
        if count < 2 {
            continue;
        }
        let Ok(count) = i32::try_from(count) else {
            continue;
        };
        for index in 0..count {
            extractors.push(Extractor::SplitPart {
                delimiter: delimiter.to_string(),
                index,
            });
            extractors.push(Extractor::SplitPart {
                delimiter: delimiter.to_string(),
                index: index - count,
            });
        }
    }

    for format in settings.date_formats.iter().chain(&settings.datetime_formats) {
        if parse_temporal(input.trim(), format).is_some() {
            for part in DateComponent::ALL {
                extractors.push(Extractor::DatePart {
                    format: format.clone(),
                    part,
                });
            }
        }
    }

    let chars: Vec<char> = input.chars().collect();
    for start in 0..chars.len() {
        let mut piece = String::new();
        for (offset, c) in chars.iter().skip(start).enumerate() {
            piece.push(*c);
            if !target.contains(piece.as_str()) {
                break;
            }
            extractors.push(Extractor::Slice {
                start,
                len: Some(offset + 1),
            });
            if start + offset + 1 == chars.len() {
                extractors.push(Extractor::Slice { start, len: None });
            }
        }
    }

    let mut pieces: Vec<(Atom, String)> = Vec::new();
    for extractor in extractors {
        let Some(output) = extractor.apply(input) else {
            continue;
        };
        if output.is_empty() || !target.contains(output.as_str()) {
            continue;
        }
        let atom = Atom::Extract { extractor };
        if !pieces.iter().any(|(a, _)| *a == atom) {
            pieces.push((atom, output));
        }
    }
    pieces.sort_by(|(a, ao), (b, bo)| a.cost().cmp(&b.cost()).then(bo.len().cmp(&ao.len())));
    pieces
}

struct Search<'a> {
    examples: &'a [DeriveExample],
    target: &'a str,
    pieces: &'a [(Atom, String)],
    max_atoms: usize,
    budget: usize,
    explored: usize,
    best: Option<(DeriveProgram, u32)>,
}

impl Search<'_> {
    fn run(&mut self, pos: usize, atoms: &mut Vec<Atom>, cost: u32) {
        let Some(rest) = self.target.get(pos..) else {
            return;
        };
        if rest.is_empty() {
            let program = DeriveProgram::new(atoms.clone());
            if self.consistent(&program) {
                self.best = Some((program, cost));
            }
            return;
        }
        if atoms.len() >= self.max_atoms {
            return;
        }

        let mut options: Vec<(Atom, usize)> = self
            .pieces
            .iter()
            .filter(|(_, output)| rest.starts_with(output.as_str()))
            .map(|(atom, output)| (atom.clone(), output.len()))
            .collect();
        // Longer constants first; a constant never follows another constant.
        if !matches!(atoms.last(), Some(Atom::Const { .. })) {
            let mut ends: Vec<usize> = rest
                .char_indices()
                .map(|(i, c)| i + c.len_utf8())
                .collect();
            ends.reverse();
            for end in ends {
                if let Some(text) = rest.get(..end) {
                    options.push((
                        Atom::Const {
                            text: text.to_owned(),
                        },
                        end,
                    ));
                }
            }
        }

        for (atom, advance) in options {
            if self.explored >= self.budget {
                return;
            }
            self.explored += 1;

            let next_cost = cost + atom.cost();
            if self.best.as_ref().is_some_and(|(_, best)| next_cost >= *best) {
                continue;
            }
            atoms.push(atom);
            self.run(pos + advance, atoms, next_cost);
            atoms.pop();
        }
    }

    fn consistent(&self, program: &DeriveProgram) -> bool {
        self.examples
            .iter()
            .all(|e| program.apply(&e.input).as_deref() == Some(e.output.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn derive(pairs: &[(&str, &str)]) -> Result<DeriveProgram> {
        let examples: Vec<DeriveExample> = pairs.iter().map(|&p| p.into()).collect();
        ExampleSynthesizer.derive(&examples, &EngineSettings::default())
    }

    #[test]
    fn test_weekday_generalizes() {
        let program = derive(&[("2009-01-04", "Sunday"), ("2013-08-22", "Thursday")]).unwrap();
        assert_eq!(program.apply("2020-01-01").as_deref(), Some("Wednesday"));
    }

    #[test]
    fn test_prefers_extraction_over_constants() {
        let program = derive(&[("Ada Lovelace", "Lovelace")]).unwrap();
        assert_eq!(program.apply("Grace Hopper").as_deref(), Some("Hopper"));
    }

    #[test]
    fn test_concatenation_with_constant() {
        let program = derive(&[
            ("Lovelace, Ada", "Ada Lovelace"),
            ("Hopper, Grace", "Grace Hopper"),
        ])
        .unwrap();
        assert_eq!(
            program.apply("Turing, Alan").as_deref(),
            Some("Alan Turing")
        );
    }

    #[test]
    fn test_date_reordered_around_separators() {
        let examples = [
            ("2013-08-22", "22/08/2013"),
            ("2009-01-04", "04/01/2009"),
            ("2020-12-31", "31/12/2020"),
        ];
        let program = derive(&examples).unwrap();
        assert_eq!(program.atoms.len(), 5);
        assert_eq!(program.apply("1999-11-05").as_deref(), Some("05/11/1999"));

        let mut settings = EngineSettings::default();
        settings.synthesis.max_atoms = 4;
        let examples: Vec<DeriveExample> = examples.iter().map(|&p| p.into()).collect();
        let err = ExampleSynthesizer.derive(&examples, &settings).unwrap_err();
        assert!(matches!(err, WrangleError::InferenceAmbiguous(_)));
    }

    #[test]
    fn test_contradicting_examples_are_ambiguous() {
        let err = derive(&[("a", "x"), ("a", "y")]).unwrap_err();
        assert!(matches!(err, WrangleError::InferenceAmbiguous(_)));
    }

    #[test]
    fn test_split_by_examples_finds_gap_delimiter() {
        let examples = vec![
            SplitExample::new("Lovelace, Ada", ["Lovelace", "Ada"]),
            SplitExample::new("Hopper, Grace", ["Hopper", "Grace"]),
        ];
        let program = ExampleSynthesizer
            .split(&examples, &EngineSettings::default())
            .unwrap();
        assert_eq!(
            program,
            SplitProgram::Delimiter {
                delimiter: ", ".to_owned(),
                columns: 2
            }
        );
    }

    #[test]
    fn test_split_by_examples_fixed_width() {
        let examples = vec![
            SplitExample::new("NY10001", ["NY", "10001"]),
            SplitExample::new("CA94105", ["CA", "94105"]),
        ];
        let program = ExampleSynthesizer
            .split(&examples, &EngineSettings::default())
            .unwrap();
        assert_eq!(program, SplitProgram::FixedWidth { widths: vec![2, 5] });
    }

    #[test]
    fn test_split_by_examples_derived_columns() {
        let examples = vec![SplitExample::new("2013-08-22", ["2013", "August"])];
        let program = ExampleSynthesizer
            .split(&examples, &EngineSettings::default())
            .unwrap();
        assert_eq!(
            program.apply(Some("2020-01-01")),
            vec![
                crate::record::Value::from("2020"),
                crate::record::Value::from("January")
            ]
        );
    }
}
