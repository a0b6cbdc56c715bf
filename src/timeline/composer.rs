/*!
 * Timeline composer: assembles segments, clips and captions into a render plan.
 *
 * Composition is a pure function of its inputs. Boundaries that disagree by
 * at most the tolerance are snapped together, residual drift at the end of
 * the narration is absorbed by the last segment (and the last caption
 * window), clips whose target no longer matches their span are re-fitted and
 * captions straddling a segment boundary are split there. The finished plan
 * is checked against every timing invariant before it is returned.
 */

use log::{debug, warn};

use crate::app_config::Config;
use crate::errors::PipelineError;

use super::model::{CaptionWindow, NarrationAudio, PlanEntry, RenderPlan, ResolvedClip, Segment};

/// Tolerances used while assembling a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComposerSettings {
    /// Allowed discrepancy between adjacent boundaries and rendered durations
    pub tolerance_ms: u64,
    /// One output frame
    pub frame_ms: u64,
    /// Largest end-of-narration drift the last span may absorb
    pub max_residual_ms: u64,
}

impl Default for ComposerSettings {
    fn default() -> Self {
        Self {
            tolerance_ms: 50,
            frame_ms: 34,
            max_residual_ms: 1_500,
        }
    }
}

impl ComposerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            tolerance_ms: config.timing.tolerance_ms,
            frame_ms: config.render.frame_ms(),
            max_residual_ms: config.timing.max_residual_ms,
        }
    }
}

/// Builds validated render plans
#[derive(Debug, Clone, Default)]
pub struct TimelineComposer {
    settings: ComposerSettings,
}

type Span = (u64, u64);

impl TimelineComposer {
    pub fn new(settings: ComposerSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> ComposerSettings {
        self.settings
    }

    /// Assemble the render plan for one run
    pub fn compose(
        &self,
        segments: &[Segment],
        windows: &[CaptionWindow],
        clips: &[ResolvedClip],
        narration: &NarrationAudio,
    ) -> Result<RenderPlan, PipelineError> {
        if segments.is_empty() {
            return Err(assembly("no segments to compose"));
        }
        if windows.is_empty() {
            return Err(assembly("no caption windows to compose"));
        }
        if segments.len() != clips.len() {
            return Err(assembly(format!(
                "{} segments but {} resolved clips",
                segments.len(),
                clips.len()
            )));
        }

        let total_ms = narration.duration_ms;
        let segment_spans = self.snap_spans(
            "segment",
            segments.iter().map(|s| (s.start_ms, s.end_ms)).collect(),
            total_ms,
        )?;
        let window_spans = self.snap_spans(
            "caption window",
            windows.iter().map(|w| (w.start_ms, w.end_ms)).collect(),
            total_ms,
        )?;

        let snapped_windows: Vec<CaptionWindow> = windows
            .iter()
            .zip(window_spans.iter())
            .map(|(w, (start, end))| CaptionWindow::new(w.words.clone(), *start, *end))
            .collect();

        let fitted = self.fit_clips(clips, &segment_spans);
        let buckets = bucket_captions(snapped_windows, &segment_spans);

        let entries: Vec<PlanEntry> = fitted
            .into_iter()
            .zip(buckets)
            .zip(segment_spans.iter())
            .map(|((clip, captions), (start, _))| PlanEntry {
                clip,
                captions,
                offset_ms: *start,
            })
            .collect();

        let plan = RenderPlan {
            narration: narration.clone(),
            entries,
            tolerance_ms: self.settings.tolerance_ms,
        };
        self.check_plan(&plan, windows)?;
        debug!(
            "Composed plan: {} entries, {} captions, {}ms",
            plan.entries.len(),
            plan.captions().count(),
            plan.duration_ms()
        );
        Ok(plan)
    }

    /// Snap near-equal boundaries together and absorb end drift into the last span
    fn snap_spans(&self, label: &str, spans: Vec<Span>, total_ms: u64) -> Result<Vec<Span>, PipelineError> {
        let epsilon = self.settings.tolerance_ms;
        let mut snapped: Vec<Span> = Vec::with_capacity(spans.len());

        for (i, (start, end)) in spans.into_iter().enumerate() {
            let start = match snapped.last() {
                None => {
                    if start > epsilon {
                        return Err(assembly(format!(
                            "first {} starts at {}ms, more than {}ms after 0",
                            label, start, epsilon
                        )));
                    }
                    0
                }
                Some((_, previous_end)) => {
                    if start.abs_diff(*previous_end) > epsilon {
                        return Err(assembly(format!(
                            "{} {} starts at {}ms but the previous one ends at {}ms",
                            label, i, start, previous_end
                        )));
                    }
                    *previous_end
                }
            };
            if end <= start {
                return Err(assembly(format!("{} {} has no duration ({}ms..{}ms)", label, i, start, end)));
            }
            snapped.push((start, end));
        }

        if let Some(last) = snapped.last_mut() {
            let residual = last.1.abs_diff(total_ms);
            if residual > self.settings.max_residual_ms {
                return Err(assembly(format!(
                    "last {} ends at {}ms, {}ms away from the narration end at {}ms",
                    label, last.1, residual, total_ms
                )));
            }
            if total_ms <= last.0 {
                return Err(assembly(format!(
                    "narration ends at {}ms, before the last {} starts at {}ms",
                    total_ms, label, last.0
                )));
            }
            if residual > epsilon {
                warn!("Last {} absorbs {}ms of drift", label, residual);
            }
            last.1 = total_ms;
        }
        Ok(snapped)
    }

    fn fit_clips(&self, clips: &[ResolvedClip], spans: &[Span]) -> Vec<ResolvedClip> {
        clips
            .iter()
            .zip(spans.iter())
            .enumerate()
            .map(|(i, (clip, (start, end)))| {
                let span_ms = end - start;
                if clip.target_duration_ms == span_ms {
                    clip.clone()
                } else {
                    debug!(
                        "Refitting clip {} from {}ms to {}ms",
                        i, clip.target_duration_ms, span_ms
                    );
                    clip.refit(span_ms, self.settings.frame_ms)
                }
            })
            .collect()
    }

    fn check_plan(&self, plan: &RenderPlan, original_windows: &[CaptionWindow]) -> Result<(), PipelineError> {
        let epsilon = self.settings.tolerance_ms;
        let mut cursor = 0;
        // Clips are concatenated back to back, so the encoded track places
        // each clip at the sum of the rendered durations before it.
        let mut encoded_cursor: u64 = 0;

        for (i, entry) in plan.entries.iter().enumerate() {
            if encoded_cursor.abs_diff(entry.offset_ms) >= epsilon {
                return Err(assembly(format!(
                    "clip {} is encoded at {}ms but its captions start at {}ms",
                    i, encoded_cursor, entry.offset_ms
                )));
            }
            if entry.offset_ms != cursor {
                return Err(assembly(format!(
                    "entry {} starts at {}ms, expected {}ms",
                    i, entry.offset_ms, cursor
                )));
            }
            let rendered = entry.clip.rendered_duration_ms();
            if entry.clip.target_duration_ms.abs_diff(rendered) >= epsilon {
                return Err(assembly(format!(
                    "clip {} renders {}ms for a {}ms target",
                    i, rendered, entry.clip.target_duration_ms
                )));
            }
            encoded_cursor += rendered;

            let mut caption_cursor = entry.offset_ms;
            for caption in &entry.captions {
                if caption.start_ms != caption_cursor || caption.end_ms <= caption.start_ms {
                    return Err(assembly(format!(
                        "caption '{}' at {}ms..{}ms breaks coverage of entry {}",
                        caption.text(),
                        caption.start_ms,
                        caption.end_ms,
                        i
                    )));
                }
                caption_cursor = caption.end_ms;
            }
            if caption_cursor != entry.end_ms() {
                return Err(assembly(format!(
                    "captions of entry {} end at {}ms, entry ends at {}ms",
                    i,
                    caption_cursor,
                    entry.end_ms()
                )));
            }
            cursor = entry.end_ms();
        }

        if cursor != plan.narration.duration_ms {
            return Err(assembly(format!(
                "plan covers {}ms of {}ms narration",
                cursor, plan.narration.duration_ms
            )));
        }
        if encoded_cursor.abs_diff(plan.narration.duration_ms) >= epsilon {
            return Err(assembly(format!(
                "video track renders {}ms against {}ms of narration",
                encoded_cursor, plan.narration.duration_ms
            )));
        }

        let placed: usize = plan.captions().map(|c| c.words.len()).sum();
        let expected: usize = original_windows.iter().map(|w| w.words.len()).sum();
        if placed != expected {
            return Err(assembly(format!(
                "{} caption words placed, {} expected",
                placed, expected
            )));
        }
        Ok(())
    }
}

/// Assign caption windows to segments, splitting windows that straddle a boundary
fn bucket_captions(windows: Vec<CaptionWindow>, spans: &[Span]) -> Vec<Vec<CaptionWindow>> {
    let mut buckets: Vec<Vec<CaptionWindow>> = vec![Vec::new(); spans.len()];
    let last = spans.len() - 1;
    let mut segment = 0;

    for window in windows {
        let mut rest = window;
        loop {
            while segment < last && spans[segment].1 <= rest.start_ms {
                segment += 1;
            }
            let boundary = spans[segment].1;
            if rest.end_ms <= boundary {
                buckets[segment].push(rest);
                break;
            }
            match rest.split_at(boundary) {
                Some((left, right)) => {
                    buckets[segment].push(left);
                    rest = right;
                }
                None => {
                    buckets[segment].push(rest);
                    break;
                }
            }
        }
    }
    buckets
}

fn assembly(message: impl Into<String>) -> PipelineError {
    PipelineError::PlanAssembly(message.into())
}
