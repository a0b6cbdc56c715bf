/*!
 * OpenAI-compatible API client.
 *
 * Groq, OpenAI and LM Studio all expose the same chat completions, speech
 * and transcription endpoints, so one client serves the script writer, the
 * phrase generator, the narrator and the transcriber.
 */

use async_trait::async_trait;
use log::{debug, error, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{multipart, Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;

use crate::errors::ProviderError;
use crate::providers::ffmpeg::probe_duration_ms;
use crate::providers::{Narrator, QueryGenerator, ScriptWriter, Transcriber};
use crate::timeline::{secs_to_ms, NarrationAudio, Transcript, Word};

// @const: Last-resort extraction of the script string from broken JSON
static SCRIPT_FIELD_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""script"\s*:\s*"((?:[^"\\]|\\.)*)""#).unwrap());

// @const: Bullet or numbering in front of a listed phrase
static LIST_MARKER_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r#"^\s*(?:[-*•]|\d+[.)])\s*"#).unwrap());

/// OpenAI-compatible client
#[derive(Debug, Clone)]
pub struct OpenAICompatible {
    /// HTTP client for making requests
    client: Client,
    /// API key, empty for local servers
    api_key: String,
    /// Base URL including the version prefix, e.g. `https://api.groq.com/openai/v1`
    endpoint: String,
}

/// Chat message object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message sender (system, user or assistant)
    pub role: String,
    /// Content of the message
    pub content: String,
}

/// Chat completion request
#[derive(Debug, Serialize)]
pub struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

impl ChatRequest {
    /// Create a new chat request
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: Vec::new(),
            temperature: None,
            max_tokens: None,
        }
    }

    /// Add a message to the request
    pub fn add_message(mut self, role: impl Into<String>, content: impl Into<String>) -> Self {
        self.messages.push(ChatMessage {
            role: role.into(),
            content: content.into(),
        });
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Chat completion response
#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
}

/// Speech synthesis request
#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'a str,
}

/// Verbose transcription response with word timestamps
#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    words: Option<Vec<TranscribedWord>>,
}

#[derive(Debug, Deserialize)]
struct TranscribedWord {
    word: String,
    start: f64,
    end: f64,
}

impl OpenAICompatible {
    /// Create a new client
    pub fn new(api_key: impl Into<String>, endpoint: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .build()
                .unwrap_or_default(),
            api_key: api_key.into(),
            endpoint: endpoint.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint.trim_end_matches('/'), path)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        if self.api_key.is_empty() {
            builder
        } else {
            builder.bearer_auth(&self.api_key)
        }
    }

    async fn check_status(response: Response, service: &str) -> Result<Response, ProviderError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to get error response text".to_string());
        error!("{} API error ({}): {}", service, status, error_text);
        Err(ProviderError::from_status(status.as_u16(), error_text))
    }

    /// Complete a chat request and return the first choice's text
    pub async fn chat(&self, request: ChatRequest) -> Result<String, ProviderError> {
        let response = self
            .authorized(self.client.post(self.url("chat/completions")))
            .json(&request)
            .send()
            .await?;
        let response = Self::check_status(response, "Chat").await?;

        let chat_response = response
            .json::<ChatResponse>()
            .await
            .map_err(|e| ProviderError::ParseError(format!("Failed to parse chat response: {}", e)))?;

        chat_response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| ProviderError::ParseError("Chat response has no choices".to_string()))
    }

    /// Synthesize speech and return the encoded audio
    pub async fn speech(&self, model: &str, voice: &str, input: &str) -> Result<Vec<u8>, ProviderError> {
        let request = SpeechRequest {
            model,
            input,
            voice,
            response_format: "mp3",
        };
        let response = self
            .authorized(self.client.post(self.url("audio/speech")))
            .json(&request)
            .send()
            .await?;
        let response = Self::check_status(response, "Speech").await?;
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(ProviderError::ParseError("Speech endpoint returned no audio".to_string()));
        }
        Ok(bytes.to_vec())
    }

    /// Transcribe audio with word-level timestamps
    pub async fn transcription(&self, model: &str, audio_path: &Path) -> Result<Vec<Word>, ProviderError> {
        let audio = tokio::fs::read(audio_path).await.map_err(|e| {
            ProviderError::ProcessFailed(format!("Failed to read {}: {}", audio_path.display(), e))
        })?;
        let file_name = audio_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "audio.mp3".to_string());

        let part = multipart::Part::bytes(audio)
            .file_name(file_name)
            .mime_str("audio/mpeg")
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;
        let form = multipart::Form::new()
            .part("file", part)
            .text("model", model.to_string())
            .text("response_format", "verbose_json")
            .text("timestamp_granularities[]", "word");

        let response = self
            .authorized(self.client.post(self.url("audio/transcriptions")))
            .multipart(form)
            .send()
            .await?;
        let response = Self::check_status(response, "Transcription").await?;
        let text = response.text().await?;
        parse_transcription(&text)
    }
}

/// Convert a verbose transcription payload into words
pub fn parse_transcription(body: &str) -> Result<Vec<Word>, ProviderError> {
    let parsed: TranscriptionResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::ParseError(format!("Failed to parse transcription: {}", e)))?;
    let words = parsed
        .words
        .ok_or_else(|| ProviderError::ParseError("Transcription has no word timestamps".to_string()))?;
    Ok(words
        .into_iter()
        .map(|w| Word::new(w.word, secs_to_ms(w.start), secs_to_ms(w.end)))
        .collect())
}

fn strip_code_fences(text: &str) -> String {
    text.replace("```json", "").replace("```", "").trim().to_string()
}

/// Replace typographic quotes that break JSON parsing
fn fix_quotes(text: &str) -> String {
    text.replace(['\u{201C}', '\u{201D}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'")
}

fn script_from_value(value: &Value) -> Option<String> {
    value
        .get("script")
        .and_then(|s| s.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Extract the story script from a model response.
///
/// Accepts the requested `{"script": ...}` object, the same object wrapped
/// in prose or code fences, or plain prose without any JSON at all.
pub fn parse_script_response(response: &str) -> Result<String, ProviderError> {
    let content = strip_code_fences(response);

    if let Ok(value) = serde_json::from_str::<Value>(&content) {
        if let Some(script) = script_from_value(&value) {
            return Ok(script);
        }
    }

    let fixed = fix_quotes(&content);
    if let (Some(start), Some(end)) = (fixed.find('{'), fixed.rfind('}')) {
        if end > start {
            if let Ok(value) = serde_json::from_str::<Value>(&fixed[start..=end]) {
                if let Some(script) = script_from_value(&value) {
                    debug!("Parsed script after extracting the JSON object");
                    return Ok(script);
                }
            }
        }
    }

    if let Some(captures) = SCRIPT_FIELD_REGEX.captures(&fixed) {
        let raw = &captures[1];
        let script = serde_json::from_str::<String>(&format!("\"{}\"", raw)).unwrap_or_else(|_| raw.to_string());
        if !script.trim().is_empty() {
            warn!("Extracted script from malformed JSON response");
            return Ok(script.trim().to_string());
        }
    }

    if !content.contains('{') && !content.trim().is_empty() {
        warn!("Script response was not JSON, using it verbatim");
        return Ok(content.trim().to_string());
    }

    Err(ProviderError::ParseError(format!(
        "No script found in response: {}",
        content.chars().take(200).collect::<String>()
    )))
}

fn collect_phrases(value: &Value, phrases: &mut Vec<String>) {
    match value {
        Value::String(s) => phrases.push(s.clone()),
        Value::Array(items) => {
            for item in items {
                collect_phrases(item, phrases);
            }
        }
        _ => {}
    }
}

/// Extract search phrases from a model response.
///
/// Accepts a JSON array of strings (possibly nested, fenced or surrounded by
/// prose); falls back to one phrase per listed line.
pub fn parse_phrase_response(response: &str) -> Vec<String> {
    let content = fix_quotes(&strip_code_fences(response));

    if let (Some(start), Some(end)) = (content.find('['), content.rfind(']')) {
        if end > start {
            if let Ok(value) = serde_json::from_str::<Value>(&content[start..=end]) {
                let mut phrases = Vec::new();
                collect_phrases(&value, &mut phrases);
                return phrases;
            }
        }
    }

    warn!("Phrase response was not a JSON array, reading it line by line");
    content
        .lines()
        .map(|line| LIST_MARKER_REGEX.replace(line, "").trim().trim_matches(['"', '\'', ',']).to_string())
        .filter(|line| !line.is_empty() && line.split_whitespace().count() <= 5)
        .collect()
}

/// Prompt settings for script writing
#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Story script writer backed by a chat model
#[derive(Debug, Clone)]
pub struct ChatScriptWriter {
    client: OpenAICompatible,
    settings: ChatSettings,
}

impl ChatScriptWriter {
    pub fn new(client: OpenAICompatible, settings: ChatSettings) -> Self {
        Self { client, settings }
    }

    fn system_prompt(topic: &str, target_duration_secs: u32) -> String {
        let words_low = target_duration_secs * 2;
        let words_high = target_duration_secs * 8 / 3;
        format!(
            "You are an expert storyteller creating captivating short-form video narratives.\n\n\
             Write a story script that is:\n\
             - about {secs} seconds when narrated (approximately {low}-{high} words)\n\
             - emotionally engaging with a clear beginning, middle and satisfying end\n\
             - rich in concrete visual moments that stock footage can illustrate\n\
             - written to flow naturally when spoken aloud\n\n\
             Topic: '{topic}'\n\n\
             Output your response in this exact JSON format:\n\
             {{\"script\": \"Your complete story script here...\"}}\n\n\
             Only return the JSON object, nothing else.",
            secs = target_duration_secs,
            low = words_low,
            high = words_high,
            topic = topic
        )
    }
}

#[async_trait]
impl ScriptWriter for ChatScriptWriter {
    async fn generate_script(&self, topic: &str, target_duration_secs: u32) -> Result<String, ProviderError> {
        let request = ChatRequest::new(&self.settings.model)
            .add_message("system", Self::system_prompt(topic, target_duration_secs))
            .add_message("user", format!("Create a story about: {}", topic))
            .temperature(self.settings.temperature)
            .max_tokens(self.settings.max_tokens);

        let content = self.client.chat(request).await?;
        parse_script_response(&content)
    }
}

/// Search phrase generator backed by a chat model
#[derive(Debug, Clone)]
pub struct ChatQueryGenerator {
    client: OpenAICompatible,
    settings: ChatSettings,
}

impl ChatQueryGenerator {
    pub fn new(client: OpenAICompatible, settings: ChatSettings) -> Self {
        Self { client, settings }
    }

    fn system_prompt(k: usize) -> String {
        format!(
            "You pick background footage for a narrated story video.\n\
             Given one passage of the story, suggest {k} stock video search phrases, best first.\n\n\
             Guidelines:\n\
             - each phrase is 1-3 English words and visually concrete\n\
             - focus on what the audience would see: characters, actions, settings, lighting, weather\n\
             - prefer cinematic, atmospheric footage over abstract ideas\n\n\
             Examples:\n\
             'She felt sad remembering her friend' -> [\"woman crying\", \"nostalgic moment\", \"old photograph\"]\n\
             'The old house stood empty' -> [\"abandoned house\", \"empty rooms\", \"dusty interior\"]\n\n\
             Return ONLY a JSON array of strings. No explanations, no markdown.",
            k = k
        )
    }
}

#[async_trait]
impl QueryGenerator for ChatQueryGenerator {
    async fn suggest_queries(&self, segment_text: &str, k: usize) -> Result<Vec<String>, ProviderError> {
        let request = ChatRequest::new(&self.settings.model)
            .add_message("system", Self::system_prompt(k))
            .add_message("user", segment_text)
            .temperature(self.settings.temperature)
            .max_tokens(self.settings.max_tokens);

        let content = self.client.chat(request).await?;
        Ok(parse_phrase_response(&content))
    }
}

/// Narrator using the speech endpoint, measuring the result with ffprobe
#[derive(Debug, Clone)]
pub struct SpeechNarrator {
    client: OpenAICompatible,
    model: String,
    ffprobe_path: String,
}

impl SpeechNarrator {
    pub fn new(client: OpenAICompatible, model: impl Into<String>, ffprobe_path: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            ffprobe_path: ffprobe_path.into(),
        }
    }
}

#[async_trait]
impl Narrator for SpeechNarrator {
    async fn synthesize(&self, text: &str, voice: &str, output_path: &Path) -> Result<NarrationAudio, ProviderError> {
        let audio = self.client.speech(&self.model, voice, text).await?;
        tokio::fs::write(output_path, &audio).await.map_err(|e| {
            ProviderError::ProcessFailed(format!("Failed to write {}: {}", output_path.display(), e))
        })?;

        let duration_ms = probe_duration_ms(&self.ffprobe_path, output_path).await?;
        Ok(NarrationAudio::new(output_path, duration_ms))
    }
}

/// Transcriber using the transcription endpoint
#[derive(Debug, Clone)]
pub struct WhisperTranscriber {
    client: OpenAICompatible,
    model: String,
}

impl WhisperTranscriber {
    pub fn new(client: OpenAICompatible, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    async fn transcribe(&self, audio_path: &Path) -> Result<Transcript, ProviderError> {
        let words = self.client.transcription(&self.model, audio_path).await?;
        Transcript::from_words(words)
    }
}
