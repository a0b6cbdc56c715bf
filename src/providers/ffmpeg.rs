/*!
 * ffmpeg-based rendering and ffprobe-based media inspection.
 *
 * Each plan entry becomes one ffmpeg input. Looped clips are repeated with
 * `-stream_loop`, every clip is trimmed to its planned span (holding the last
 * frame for a sub-frame loop remainder), scaled and center-cropped to the
 * output frame, and the clips are concatenated. The
 * captions are written to a temporary SRT file and burned in, and the
 * narration becomes the audio track.
 */

use async_trait::async_trait;
use log::{debug, error, info};
use std::io::Write;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::app_config::RenderConfig;
use crate::errors::ProviderError;
use crate::providers::Renderer;
use crate::timeline::{secs_to_ms, FitMode, RenderPlan};

const PROBE_TIMEOUT: Duration = Duration::from_secs(60);

/// Measure the duration of a media file in milliseconds
pub async fn probe_duration_ms(ffprobe_path: &str, media_path: &Path) -> Result<u64, ProviderError> {
    let ffprobe_future = Command::new(ffprobe_path)
        .args(["-v", "quiet", "-show_entries", "format=duration", "-of", "csv=p=0"])
        .arg(media_path)
        .output();

    let output = tokio::select! {
        result = ffprobe_future => {
            result.map_err(|e| ProviderError::ProcessFailed(format!("Failed to execute ffprobe: {}", e)))?
        },
        _ = tokio::time::sleep(PROBE_TIMEOUT) => {
            return Err(ProviderError::ProcessFailed("ffprobe timed out after 60 seconds".to_string()));
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        error!("ffprobe failed: {}", stderr);
        return Err(ProviderError::ProcessFailed(format!("ffprobe failed: {}", stderr.trim())));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_probe_duration(&stdout)
}

fn parse_probe_duration(stdout: &str) -> Result<u64, ProviderError> {
    stdout
        .trim()
        .parse::<f64>()
        .ok()
        .map(secs_to_ms)
        .filter(|ms| *ms > 0)
        .ok_or_else(|| ProviderError::ProcessFailed(format!("ffprobe reported no duration: '{}'", stdout.trim())))
}

/// Format milliseconds as an SRT timestamp (`HH:MM:SS,mmm`)
pub fn format_srt_timestamp(ms: u64) -> String {
    let hours = ms / 3_600_000;
    let minutes = (ms % 3_600_000) / 60_000;
    let seconds = (ms % 60_000) / 1_000;
    let millis = ms % 1_000;
    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, seconds, millis)
}

/// Render the plan's captions as SRT, skipping windows without words
pub fn build_srt(plan: &RenderPlan) -> String {
    let mut srt = String::new();
    let captions = plan.captions().filter(|c| !c.words.is_empty());
    for (i, caption) in captions.enumerate() {
        srt.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            i + 1,
            format_srt_timestamp(caption.start_ms),
            format_srt_timestamp(caption.end_ms),
            caption.text()
        ));
    }
    srt
}

fn seconds(ms: u64) -> String {
    format!("{:.3}", ms as f64 / 1000.0)
}

/// Escape a path for use inside a filter graph option
fn escape_filter_path(path: &Path) -> String {
    path.to_string_lossy()
        .replace('\\', "/")
        .replace(':', "\\:")
        .replace('\'', "\\'")
}

/// Filter ffmpeg stderr to the lines that explain a failure
fn filter_ffmpeg_stderr(stderr: &str) -> String {
    let noise_prefixes = [
        "ffmpeg version",
        "built with",
        "configuration:",
        "lib",
        "Input #",
        "Metadata:",
        "Duration:",
        "Stream #",
        "Output #",
        "Stream mapping:",
        "Press [q]",
        "frame=",
    ];

    let meaningful: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !noise_prefixes.iter().any(|p| line.starts_with(p)))
        .collect();

    if meaningful.is_empty() {
        "unknown ffmpeg error (stderr was empty after filtering)".to_string()
    } else {
        meaningful.join("\n")
    }
}

/// Renderer invoking the ffmpeg binary
#[derive(Debug, Clone)]
pub struct FfmpegRenderer {
    ffmpeg_path: String,
    width: u32,
    height: u32,
    fps: u32,
    font_size: u32,
    timeout: Duration,
}

impl FfmpegRenderer {
    pub fn new(config: &RenderConfig) -> Self {
        let (width, height) = config.orientation.dimensions();
        Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
            width,
            height,
            fps: config.fps,
            font_size: config.font_size(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// The filter graph for `plan`, burning in captions from `srt_path`
    pub fn build_filter_graph(&self, plan: &RenderPlan, srt_path: &Path) -> String {
        let (w, h) = (self.width, self.height);
        let mut filters: Vec<String> = Vec::with_capacity(plan.entries.len() + 2);

        for (i, entry) in plan.entries.iter().enumerate() {
            let start_ms = match entry.clip.fit {
                FitMode::Trim { offset_ms } => offset_ms,
                FitMode::Loop { .. } => 0,
            };
            let hold = match entry.clip.hold_ms() {
                0 => String::new(),
                ms => format!("tpad=stop_mode=clone:stop_duration={},", seconds(ms)),
            };
            filters.push(format!(
                "[{i}:v]trim=start={start}:duration={duration},setpts=PTS-STARTPTS,{hold}\
                 scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h},fps={fps},setsar=1[v{i}]",
                i = i,
                start = seconds(start_ms),
                duration = seconds(entry.clip.played_ms()),
                hold = hold,
                w = w,
                h = h,
                fps = self.fps
            ));
        }

        let labels: String = (0..plan.entries.len()).map(|i| format!("[v{}]", i)).collect();
        filters.push(format!("{}concat=n={}:v=1:a=0[vcat]", labels, plan.entries.len()));
        filters.push(format!(
            "[vcat]subtitles='{}':force_style='FontSize={},PrimaryColour=&H00FFFFFF,OutlineColour=&H00000000,BorderStyle=1,Outline=2,Alignment=2,MarginV=120'[vout]",
            escape_filter_path(srt_path),
            self.font_size
        ));

        filters.join(";")
    }

    /// Full ffmpeg argument list
    pub fn build_args(&self, plan: &RenderPlan, srt_path: &Path, output_path: &Path) -> Vec<String> {
        let mut args = vec!["-y".to_string(), "-hide_banner".to_string()];

        for entry in &plan.entries {
            if let FitMode::Loop { full_loops, tail_ms } = entry.clip.fit {
                let plays = full_loops + u64::from(tail_ms > 0);
                if plays > 1 {
                    args.push("-stream_loop".to_string());
                    args.push((plays - 1).to_string());
                }
            }
            args.push("-i".to_string());
            args.push(entry.clip.file_reference.clone());
        }

        args.push("-i".to_string());
        args.push(plan.narration.path.to_string_lossy().to_string());

        args.push("-filter_complex".to_string());
        args.push(self.build_filter_graph(plan, srt_path));

        let audio_map = format!("{}:a", plan.entries.len());
        let fps = self.fps.to_string();
        let total = seconds(plan.narration.duration_ms);
        args.extend(
            [
                "-map", "[vout]",
                "-map", audio_map.as_str(),
                "-c:v", "libx264",
                "-preset", "medium",
                "-pix_fmt", "yuv420p",
                "-r", fps.as_str(),
                "-c:a", "aac",
                "-b:a", "192k",
                "-t", total.as_str(),
            ]
            .iter()
            .map(|s| s.to_string()),
        );

        args.push(output_path.to_string_lossy().to_string());
        args
    }
}

#[async_trait]
impl Renderer for FfmpegRenderer {
    async fn render(&self, plan: &RenderPlan, output_path: &Path) -> Result<(), ProviderError> {
        let mut srt_file = tempfile::Builder::new()
            .prefix("storyforge-captions-")
            .suffix(".srt")
            .tempfile()
            .map_err(|e| ProviderError::ProcessFailed(format!("Failed to create caption file: {}", e)))?;
        srt_file
            .write_all(build_srt(plan).as_bytes())
            .map_err(|e| ProviderError::ProcessFailed(format!("Failed to write caption file: {}", e)))?;

        let args = self.build_args(plan, srt_file.path(), output_path);
        debug!("{} {}", self.ffmpeg_path, args.join(" "));
        info!("Encoding {} clips into {}", plan.entries.len(), output_path.display());

        let ffmpeg_future = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .output();

        let output = tokio::select! {
            result = ffmpeg_future => {
                result.map_err(|e| ProviderError::ProcessFailed(format!("Failed to execute ffmpeg: {}", e)))?
            },
            _ = tokio::time::sleep(self.timeout) => {
                return Err(ProviderError::ProcessFailed(format!(
                    "ffmpeg timed out after {} seconds",
                    self.timeout.as_secs()
                )));
            }
        };

        if !output.status.success() {
            let filtered = filter_ffmpeg_stderr(&String::from_utf8_lossy(&output.stderr));
            error!("Rendering failed: {}", filtered);
            return Err(ProviderError::ProcessFailed(format!("ffmpeg failed: {}", filtered)));
        }
        Ok(())
    }
}
