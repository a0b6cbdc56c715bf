/*!
 * Timeline entities shared by every stage of a run.
 *
 * All times are integer milliseconds measured against the narration audio.
 * Entities are built once and never mutated afterwards; stages that need a
 * different shape produce new values.
 */

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::ProviderError;

/// Convert fractional seconds reported by a collaborator into milliseconds
pub fn secs_to_ms(secs: f64) -> u64 {
    if secs.is_finite() && secs > 0.0 {
        (secs * 1000.0).round() as u64
    } else {
        0
    }
}

/// Single transcribed word
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Word {
    pub text: String,
    pub start_ms: u64,
    pub end_ms: u64,
}

impl Word {
    pub fn new(text: impl Into<String>, start_ms: u64, end_ms: u64) -> Self {
        Self {
            text: text.into(),
            start_ms,
            end_ms,
        }
    }

    /// Midpoint of the word, used to assign it to one side of a cut
    pub fn midpoint_ms(&self) -> u64 {
        self.start_ms + (self.end_ms - self.start_ms) / 2
    }
}

/// Ordered word-level transcript of the narration
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Transcript {
    words: Vec<Word>,
}

impl Transcript {
    /// Build a transcript, validating ordering and ranges.
    ///
    /// Words with blank text are dropped. A word ending before it starts, or
    /// starting before its predecessor, is a malformed collaborator response.
    pub fn from_words(words: Vec<Word>) -> Result<Self, ProviderError> {
        let mut validated: Vec<Word> = Vec::with_capacity(words.len());
        for word in words {
            let text = word.text.trim();
            if text.is_empty() {
                continue;
            }
            if word.end_ms < word.start_ms {
                return Err(ProviderError::ParseError(format!(
                    "word '{}' ends at {}ms before it starts at {}ms",
                    text, word.end_ms, word.start_ms
                )));
            }
            if let Some(previous) = validated.last() {
                if word.start_ms < previous.start_ms {
                    return Err(ProviderError::ParseError(format!(
                        "word '{}' at {}ms starts before preceding word '{}' at {}ms",
                        text, word.start_ms, previous.text, previous.start_ms
                    )));
                }
            }
            validated.push(Word::new(text, word.start_ms, word.end_ms));
        }
        Ok(Self { words: validated })
    }

    pub fn words(&self) -> &[Word] {
        &self.words
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// End of the last spoken word
    pub fn end_ms(&self) -> u64 {
        self.words.iter().map(|w| w.end_ms).max().unwrap_or(0)
    }

    pub fn text(&self) -> String {
        join_words(&self.words)
    }
}

fn join_words(words: &[Word]) -> String {
    words
        .iter()
        .map(|w| w.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Time span over which one caption string is displayed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptionWindow {
    pub words: Vec<Word>,
    pub start_ms: u64,
    pub end_ms: u64,
}

impl CaptionWindow {
    pub fn new(words: Vec<Word>, start_ms: u64, end_ms: u64) -> Self {
        Self {
            words,
            start_ms,
            end_ms,
        }
    }

    pub fn text(&self) -> String {
        join_words(&self.words)
    }

    pub fn duration_ms(&self) -> u64 {
        self.end_ms.saturating_sub(self.start_ms)
    }

    /// Split the window at `at_ms`, assigning each word by its midpoint.
    ///
    /// Returns `None` when the cut does not fall strictly inside the window.
    pub fn split_at(&self, at_ms: u64) -> Option<(CaptionWindow, CaptionWindow)> {
        if at_ms <= self.start_ms || at_ms >= self.end_ms {
            return None;
        }
        let (left, right): (Vec<Word>, Vec<Word>) = self
            .words
            .iter()
            .cloned()
            .partition(|w| w.midpoint_ms() < at_ms);
        Some((
            CaptionWindow::new(left, self.start_ms, at_ms),
            CaptionWindow::new(right, at_ms, self.end_ms),
        ))
    }
}

/// Contiguous narration span with its script text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub index: usize,
    pub text: String,
    pub start_ms: u64,
    pub end_ms: u64,
}

impl Segment {
    pub fn new(index: usize, text: impl Into<String>, start_ms: u64, end_ms: u64) -> Self {
        Self {
            index,
            text: text.into(),
            start_ms,
            end_ms,
        }
    }

    pub fn duration_ms(&self) -> u64 {
        self.end_ms.saturating_sub(self.start_ms)
    }

    /// Segments are caption-timer windows re-expressed with their index
    pub fn from_window(index: usize, window: &CaptionWindow) -> Self {
        Self::new(index, window.text(), window.start_ms, window.end_ms)
    }
}

/// Ranked candidate phrases for one segment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub segment_index: usize,
    pub phrases: Vec<String>,
}

impl SearchQuery {
    pub fn new(segment_index: usize, phrases: Vec<String>) -> Self {
        Self {
            segment_index,
            phrases,
        }
    }

    pub fn top_phrase(&self) -> Option<&str> {
        self.phrases.first().map(|p| p.as_str())
    }
}

/// A candidate clip returned by footage search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FootageCandidate {
    pub file_reference: String,
    pub natural_duration_ms: u64,
}

impl FootageCandidate {
    pub fn new(file_reference: impl Into<String>, natural_duration_ms: u64) -> Self {
        Self {
            file_reference: file_reference.into(),
            natural_duration_ms,
        }
    }
}

/// How a clip is fitted to its required duration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum FitMode {
    /// Take `[offset_ms, offset_ms + target)` from a clip at least as long as the target
    Trim { offset_ms: u64 },
    /// Play the clip `full_loops` times, then its first `tail_ms`.
    ///
    /// A remainder shorter than one frame is not played as another pass; the
    /// final frame is held for it instead.
    Loop { full_loops: u64, tail_ms: u64 },
}

impl FitMode {
    /// Derive the fit for a clip of `natural_ms` played for `target_ms`.
    ///
    /// A loop tail shorter than one frame becomes a held frame, see
    /// [`ResolvedClip::hold_ms`].
    pub fn derive(natural_ms: u64, target_ms: u64, frame_ms: u64) -> Self {
        if natural_ms >= target_ms || natural_ms == 0 {
            FitMode::Trim {
                offset_ms: natural_ms.saturating_sub(target_ms) / 2,
            }
        } else {
            let full_loops = target_ms / natural_ms;
            let tail_ms = target_ms - full_loops * natural_ms;
            FitMode::Loop {
                full_loops,
                tail_ms: if tail_ms < frame_ms { 0 } else { tail_ms },
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FitMode::Trim { .. } => "trim",
            FitMode::Loop { .. } => "loop",
        }
    }
}

/// A stock clip fitted to an exact required duration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedClip {
    pub source_query: String,
    pub file_reference: String,
    pub natural_duration_ms: u64,
    pub target_duration_ms: u64,
    pub fit: FitMode,
}

impl ResolvedClip {
    pub fn fit(
        source_query: impl Into<String>,
        candidate: FootageCandidate,
        target_duration_ms: u64,
        frame_ms: u64,
    ) -> Self {
        Self {
            source_query: source_query.into(),
            fit: FitMode::derive(candidate.natural_duration_ms, target_duration_ms, frame_ms),
            file_reference: candidate.file_reference,
            natural_duration_ms: candidate.natural_duration_ms,
            target_duration_ms,
        }
    }

    /// The same clip fitted to a different target duration
    pub fn refit(&self, target_duration_ms: u64, frame_ms: u64) -> Self {
        Self {
            source_query: self.source_query.clone(),
            file_reference: self.file_reference.clone(),
            natural_duration_ms: self.natural_duration_ms,
            target_duration_ms,
            fit: FitMode::derive(self.natural_duration_ms, target_duration_ms, frame_ms),
        }
    }

    /// Source material played from the clip, excluding any held frame
    pub fn played_ms(&self) -> u64 {
        match self.fit {
            FitMode::Trim { .. } => self.target_duration_ms.min(self.natural_duration_ms),
            FitMode::Loop { full_loops, tail_ms } => full_loops * self.natural_duration_ms + tail_ms,
        }
    }

    /// Sub-frame remainder covered by holding the last played frame
    pub fn hold_ms(&self) -> u64 {
        match self.fit {
            FitMode::Trim { .. } => 0,
            FitMode::Loop { .. } => self.target_duration_ms.saturating_sub(self.played_ms()),
        }
    }

    /// Duration the encoder will actually emit for this clip
    pub fn rendered_duration_ms(&self) -> u64 {
        self.played_ms() + self.hold_ms()
    }
}

/// The narration track of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NarrationAudio {
    pub path: PathBuf,
    pub duration_ms: u64,
}

impl NarrationAudio {
    pub fn new(path: impl Into<PathBuf>, duration_ms: u64) -> Self {
        Self {
            path: path.into(),
            duration_ms,
        }
    }
}

/// One visual track entry of the final timeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanEntry {
    pub clip: ResolvedClip,
    pub captions: Vec<CaptionWindow>,
    pub offset_ms: u64,
}

impl PlanEntry {
    pub fn end_ms(&self) -> u64 {
        self.offset_ms + self.clip.target_duration_ms
    }
}

/// The validated, gap-free composite timeline ready for encoding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderPlan {
    pub narration: NarrationAudio,
    pub entries: Vec<PlanEntry>,
    pub tolerance_ms: u64,
}

impl RenderPlan {
    pub fn duration_ms(&self) -> u64 {
        self.entries.last().map(|e| e.end_ms()).unwrap_or(0)
    }

    /// All caption windows in timeline order
    pub fn captions(&self) -> impl Iterator<Item = &CaptionWindow> {
        self.entries.iter().flat_map(|e| e.captions.iter())
    }

    pub fn clips(&self) -> impl Iterator<Item = &ResolvedClip> {
        self.entries.iter().map(|e| &e.clip)
    }
}
