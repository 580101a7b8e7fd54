//! The exclusion decision boundary.
//!
//! The pipeline blocks on [`DecisionProvider::request`] until an answer
//! arrives. An answer is text holding space-separated component indices
//! (`"0 3 7"`; empty means exclude nothing), validated by
//! [`parse_selection`]. Providers:
//!
//! - [`StdinPrompt`]: interactive operator prompt.
//! - [`AnswerFile`]: pre-recorded answers keyed by recording id.
//! - [`FixedAnswer`]: the same answer for every recording.
//! - [`super::HeuristicProvider`]: automated component scoring.
//! - any `FnMut(&Review) -> Result<String>` closure.
use std::collections::{BTreeMap, BTreeSet};
use std::io::{BufRead, Write};
use std::path::Path;

use log::info;
use ndarray::Array2;

use super::Ica;
use crate::error::{PrepError, Result};
use crate::recording::{ChannelKind, Recording};

/// What a provider sees when asked for a decision.
pub struct Review<'a> {
    pub recording_id: &'a str,
    /// The filtered recording the decomposition was fitted on.
    pub recording: &'a Recording,
    pub ica: &'a Ica,
    /// `[k, T]` source time courses.
    pub sources: &'a Array2<f64>,
}

impl Review<'_> {
    /// One line per component with its explained-variance share.
    pub fn summary(&self) -> String {
        let mut out = format!(
            "recording {}: {} components\n",
            self.recording_id,
            self.ica.n_components()
        );
        for c in self.ica.components() {
            let share = c.explained_variance.get(&ChannelKind::Eeg).copied().unwrap_or(0.0);
            out.push_str(&format!("  ICA{:03}  eeg variance {:6.2}%\n", c.index, share * 100.0));
        }
        out
    }
}

pub trait DecisionProvider {
    /// Return the raw answer text for `review`.
    fn request(&mut self, review: &Review<'_>) -> Result<String>;
}

impl<F> DecisionProvider for F
where
    F: FnMut(&Review<'_>) -> Result<String>,
{
    fn request(&mut self, review: &Review<'_>) -> Result<String> {
        self(review)
    }
}

/// Parse space-separated indices and check each lies in `[0, k)`.
///
/// Any token that is not an integer, is negative, or is `>= k` rejects the
/// whole answer. Duplicates collapse.
pub fn parse_selection(input: &str, k: usize) -> Result<BTreeSet<usize>> {
    let invalid = |reason: String| PrepError::InvalidSelection { input: input.to_string(), reason };
    let mut out = BTreeSet::new();
    for tok in input.split_whitespace() {
        let v: i64 = tok
            .parse()
            .map_err(|_| invalid(format!("'{tok}' is not an integer")))?;
        if v < 0 || v as u64 >= k as u64 {
            return Err(invalid(format!("component {v} outside [0, {k})")));
        }
        out.insert(v as usize);
    }
    Ok(out)
}

/// Ask `provider` about `ica` fitted on `rec`, and validate the answer.
pub fn request_exclusions(
    recording_id: &str,
    rec: &Recording,
    ica: &Ica,
    provider: &mut dyn DecisionProvider,
) -> Result<BTreeSet<usize>> {
    let sources = ica.sources(rec)?;
    let review = Review { recording_id, recording: rec, ica, sources: &sources };
    let answer = provider.request(&review)?;
    let selection = parse_selection(&answer, ica.n_components())?;
    info!("{recording_id}: excluding components {selection:?}");
    Ok(selection)
}

// ── Providers ────────────────────────────────────────────────────────────────

/// Prompt an operator on `writer` and read one line from `reader`.
pub struct StdinPrompt<R, W> {
    reader: R,
    writer: W,
}

impl<R: BufRead, W: Write> StdinPrompt<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }
}

impl StdinPrompt<std::io::StdinLock<'static>, std::io::Stdout> {
    /// Prompt on the process's stdin/stdout.
    pub fn stdio() -> Self {
        Self::new(std::io::stdin().lock(), std::io::stdout())
    }
}

impl<R: BufRead, W: Write> DecisionProvider for StdinPrompt<R, W> {
    fn request(&mut self, review: &Review<'_>) -> Result<String> {
        write!(self.writer, "{}", review.summary())?;
        write!(
            self.writer,
            "Enter the indices of the components to exclude (separated by spaces): "
        )?;
        self.writer.flush()?;
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Err(PrepError::InvalidSelection {
                input: String::new(),
                reason: "input closed before an answer was given".into(),
            });
        }
        Ok(line.trim_end().to_string())
    }
}

/// Pre-recorded answers: recording id → index list.
#[derive(Debug, Clone, Default)]
pub struct AnswerFile {
    answers: BTreeMap<String, String>,
}

impl AnswerFile {
    pub fn new(answers: BTreeMap<String, String>) -> Self {
        Self { answers }
    }

    /// Load a JSON object `{ "<recording id>": "0 3 7", … }`.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::new(serde_json::from_str(&text)?))
    }
}

impl DecisionProvider for AnswerFile {
    fn request(&mut self, review: &Review<'_>) -> Result<String> {
        self.answers
            .get(review.recording_id)
            .cloned()
            .ok_or_else(|| PrepError::InvalidSelection {
                input: String::new(),
                reason: format!("no recorded answer for '{}'", review.recording_id),
            })
    }
}

/// The same answer for every recording.
#[derive(Debug, Clone)]
pub struct FixedAnswer(pub String);

impl DecisionProvider for FixedAnswer {
    fn request(&mut self, _review: &Review<'_>) -> Result<String> {
        Ok(self.0.clone())
    }
}
