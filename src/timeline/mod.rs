/*!
 * Timeline construction for a story video.
 *
 * - `model`: entities shared by all stages (words, windows, segments, clips, plans)
 * - `segment_timer`: word timestamps to caption windows and segments
 * - `query_planner`: segment text to ranked search phrases
 * - `footage_resolver`: search phrases to duration-fitted clips
 * - `composer`: everything above to a validated render plan
 */

pub mod composer;
pub mod footage_resolver;
pub mod model;
pub mod query_planner;
pub mod segment_timer;

pub use composer::{ComposerSettings, TimelineComposer};
pub use footage_resolver::FootageResolver;
pub use model::{
    secs_to_ms, CaptionWindow, FitMode, FootageCandidate, NarrationAudio, PlanEntry, RenderPlan,
    ResolvedClip, SearchQuery, Segment, Transcript, Word,
};
pub use query_planner::QueryPlanner;
pub use segment_timer::{SegmentTimer, WindowLimit};
