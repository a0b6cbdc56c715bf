/*!
 * Pexels video search client.
 *
 * Each search returns one candidate per video: the file that best matches
 * the output orientation, with the video's duration as its natural length.
 */

use async_trait::async_trait;
use log::{debug, error};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use crate::app_config::{FootageConfig, Orientation};
use crate::errors::ProviderError;
use crate::providers::FootageSearch;
use crate::timeline::FootageCandidate;

/// Search response from the Pexels API
#[derive(Debug, Deserialize)]
pub struct VideoSearchResponse {
    #[serde(default)]
    pub videos: Vec<PexelsVideo>,
}

#[derive(Debug, Deserialize)]
pub struct PexelsVideo {
    pub id: u64,
    /// Duration in whole seconds
    #[serde(default)]
    pub duration: u64,
    #[serde(default)]
    pub video_files: Vec<PexelsVideoFile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PexelsVideoFile {
    pub link: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

impl PexelsVideoFile {
    fn size(&self) -> (u32, u32) {
        (self.width.unwrap_or(0), self.height.unwrap_or(0))
    }

    fn area(&self) -> u64 {
        let (w, h) = self.size();
        w as u64 * h as u64
    }
}

/// Pexels client implementing [`FootageSearch`]
#[derive(Debug, Clone)]
pub struct PexelsSearch {
    client: Client,
    api_key: String,
    endpoint: String,
    per_page: u32,
    orientation: Orientation,
}

impl PexelsSearch {
    pub fn new(config: &FootageConfig, orientation: Orientation) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()
                .unwrap_or_default(),
            api_key: config.resolved_api_key(),
            endpoint: config.endpoint.clone(),
            per_page: config.per_page,
            orientation,
        }
    }

    fn search_url(&self, phrase: &str) -> Result<Url, ProviderError> {
        let base = format!("{}/videos/search", self.endpoint.trim_end_matches('/'));
        Url::parse_with_params(
            &base,
            &[
                ("query", phrase.to_string()),
                ("orientation", self.orientation.as_str().to_string()),
                ("per_page", self.per_page.to_string()),
            ],
        )
        .map_err(|e| ProviderError::RequestFailed(format!("Invalid search URL '{}': {}", base, e)))
    }
}

/// Pick the file to use for a video.
///
/// Files matching the orientation win; among them the largest that fits
/// inside the output frame, else the smallest larger one.
pub fn select_video_file(files: &[PexelsVideoFile], orientation: Orientation) -> Option<&PexelsVideoFile> {
    let (frame_w, frame_h) = orientation.dimensions();
    let matches_orientation = |f: &&PexelsVideoFile| {
        let (w, h) = f.size();
        match orientation {
            Orientation::Portrait => h > w,
            Orientation::Landscape => w > h,
        }
    };
    let oriented: Vec<&PexelsVideoFile> = files.iter().filter(matches_orientation).collect();
    let pool: Vec<&PexelsVideoFile> = if oriented.is_empty() {
        files.iter().collect()
    } else {
        oriented
    };

    let fitting = pool
        .iter()
        .filter(|f| {
            let (w, h) = f.size();
            w <= frame_w && h <= frame_h
        })
        .max_by_key(|f| f.area());

    fitting
        .or_else(|| pool.iter().min_by_key(|f| f.area()))
        .copied()
}

/// Convert a search response into candidates
pub fn candidates_from_response(response: VideoSearchResponse, orientation: Orientation) -> Vec<FootageCandidate> {
    response
        .videos
        .iter()
        .filter_map(|video| {
            let file = select_video_file(&video.video_files, orientation)?;
            Some(FootageCandidate::new(file.link.clone(), video.duration * 1_000))
        })
        .collect()
}

#[async_trait]
impl FootageSearch for PexelsSearch {
    async fn search(&self, phrase: &str) -> Result<Vec<FootageCandidate>, ProviderError> {
        let url = self.search_url(phrase)?;
        let response = self
            .client
            .get(url)
            .header("Authorization", &self.api_key)
            .header("User-Agent", "storyforge")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to get error response text".to_string());
            error!("Pexels API error ({}): {}", status, error_text);
            return Err(ProviderError::from_status(status.as_u16(), error_text));
        }

        let parsed = response
            .json::<VideoSearchResponse>()
            .await
            .map_err(|e| ProviderError::ParseError(format!("Failed to parse Pexels response: {}", e)))?;
        let candidates = candidates_from_response(parsed, self.orientation);
        debug!("Pexels '{}': {} candidates", phrase, candidates.len());
        Ok(candidates)
    }
}
