/*!
 * Segment timer: turns word timestamps into display windows.
 *
 * Windows always cover `[0, narration_duration]` exactly, never overlap and
 * never split a word. The same grouping produces the short caption windows
 * and the longer narration segments that footage is matched against.
 */

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::PipelineError;

use super::model::{CaptionWindow, Segment, Transcript, Word};

// @const: Sentence-final punctuation, optionally followed by closing quotes or brackets
static SENTENCE_END_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[.!?…]["'”’)\]]*$"#).unwrap());

/// How words are grouped into windows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowLimit {
    /// Close a window before it would exceed `max_ms`, at sentence ends, or at `max_words`
    MaxDuration { max_ms: u64, max_words: usize },
    /// Produce at most this many windows with boundaries near even splits
    TargetCount(usize),
}

/// Groups transcript words into contiguous windows
#[derive(Debug, Clone)]
pub struct SegmentTimer {
    limit: WindowLimit,
}

impl SegmentTimer {
    pub fn new(limit: WindowLimit) -> Self {
        Self { limit }
    }

    pub fn limit(&self) -> WindowLimit {
        self.limit
    }

    /// Build caption windows covering `[0, narration_ms]`
    pub fn build_windows(
        &self,
        transcript: &Transcript,
        narration_ms: u64,
    ) -> Result<Vec<CaptionWindow>, PipelineError> {
        if transcript.is_empty() {
            return Err(PipelineError::EmptyTranscript);
        }

        let groups = match self.limit {
            WindowLimit::MaxDuration { max_ms, max_words } => {
                group_by_duration(transcript.words(), max_ms, max_words.max(1))
            }
            WindowLimit::TargetCount(count) => {
                group_by_count(transcript.words(), count.max(1), narration_ms)
            }
        };

        let windows = place_windows(groups, narration_ms);
        debug!(
            "Built {} windows from {} words over {}ms",
            windows.len(),
            transcript.len(),
            narration_ms
        );
        Ok(windows)
    }

    /// Build narration segments covering `[0, narration_ms]`
    pub fn build_segments(
        &self,
        transcript: &Transcript,
        narration_ms: u64,
    ) -> Result<Vec<Segment>, PipelineError> {
        let windows = self.build_windows(transcript, narration_ms)?;
        Ok(windows
            .iter()
            .enumerate()
            .map(|(index, window)| Segment::from_window(index, window))
            .collect())
    }
}

fn ends_sentence(word: &Word) -> bool {
    SENTENCE_END_REGEX.is_match(&word.text)
}

fn group_by_duration(words: &[Word], max_ms: u64, max_words: usize) -> Vec<Vec<Word>> {
    let mut groups: Vec<Vec<Word>> = Vec::new();
    let mut current: Vec<Word> = Vec::new();
    let mut window_start = 0;

    for word in words {
        if !current.is_empty() && word.end_ms.saturating_sub(window_start) > max_ms {
            groups.push(std::mem::take(&mut current));
        }
        if current.is_empty() {
            window_start = if groups.is_empty() { 0 } else { word.start_ms };
        }

        current.push(word.clone());

        if ends_sentence(word) || current.len() >= max_words {
            groups.push(std::mem::take(&mut current));
        }
    }

    if !current.is_empty() {
        groups.push(current);
    }
    groups
}

fn group_by_count(words: &[Word], count: usize, narration_ms: u64) -> Vec<Vec<Word>> {
    // Closing after word i places the next boundary at the following word's start
    let boundary_after = |i: usize| -> u64 {
        words
            .get(i + 1)
            .map(|w| w.start_ms)
            .unwrap_or(narration_ms)
    };

    let mut groups: Vec<Vec<Word>> = Vec::new();
    let mut current: Vec<Word> = Vec::new();

    for (i, word) in words.iter().enumerate() {
        current.push(word.clone());

        let closed = groups.len() + 1;
        if closed < count && i + 1 < words.len() {
            let ideal = narration_ms * closed as u64 / count as u64;
            let here = boundary_after(i).abs_diff(ideal);
            let later = boundary_after(i + 1).abs_diff(ideal);
            if here <= later {
                groups.push(std::mem::take(&mut current));
            }
        }
    }

    if !current.is_empty() {
        groups.push(current);
    }
    groups
}

/// Assign contiguous time spans to word groups.
///
/// Window k starts at its first word (the first window at 0) and ends where
/// window k+1 starts; the last ends at `narration_ms`. A window that would be
/// empty in time is merged into its predecessor.
fn place_windows(groups: Vec<Vec<Word>>, narration_ms: u64) -> Vec<CaptionWindow> {
    let mut windows: Vec<CaptionWindow> = Vec::with_capacity(groups.len());

    for group in groups {
        let start = match windows.last() {
            None => 0,
            Some(_) => group.first().map(|w| w.start_ms).unwrap_or(narration_ms),
        };

        if let Some(previous) = windows.last_mut() {
            if start <= previous.start_ms || start >= narration_ms {
                previous.words.extend(group);
                continue;
            }
        }
        windows.push(CaptionWindow::new(group, start, start));
    }

    let starts: Vec<u64> = windows.iter().skip(1).map(|w| w.start_ms).collect();
    for (window, end) in windows
        .iter_mut()
        .zip(starts.into_iter().chain(std::iter::once(narration_ms)))
    {
        window.end_ms = end;
    }
    windows
}
