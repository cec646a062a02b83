//! HTTP-backed refiner for Ollama-compatible generation endpoints.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use wikiseek_core::{QueryRefiner, RefinerConfig, Result, WikiseekError};

/// Prefixes models tend to echo despite instructions; stripped from
/// responses.
const ECHOED_PREFIXES: &[&str] = &[
    "technical search query:",
    "search terms:",
    "refined query:",
    "query:",
];

/// Longest refined query kept; anything beyond this is model rambling.
const MAX_REFINED_LEN: usize = 200;

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Refiner that prompts a local LLM over HTTP.
pub struct HttpRefiner {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    name: String,
}

impl HttpRefiner {
    /// Build a refiner from configuration. The request deadline doubles as
    /// the refinement timeout; the engine treats expiry as a failure and
    /// falls back to the original query.
    pub fn new(config: &RefinerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| WikiseekError::refinement(format!("Failed to build client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            name: format!("ollama:{}", config.model),
        })
    }

    /// Few-shot prompt teaching the colloquial-to-technical rewrite.
    fn build_prompt(query: &str) -> String {
        format!(
            "You are an expert system for Linux documentation search. \
             Expand user queries into technical terms.\n\
             \n\
             Examples:\n\
             User query: wifi broken\n\
             Technical search query: wireless network configuration NetworkManager iwctl troubleshooting connection issues\n\
             \n\
             User query: sound not working\n\
             Technical search query: audio configuration ALSA PulseAudio sound card driver troubleshooting\n\
             \n\
             User query: package won't install\n\
             Technical search query: pacman package manager installation dependencies conflicts\n\
             \n\
             User query: {}\n\
             Technical search query:",
            query
        )
    }
}

/// Normalize a raw model completion into a usable search string.
///
/// Strips surrounding quotes, keeps only the first line, drops echoed
/// prompt prefixes, collapses repeated words, and caps the length.
pub(crate) fn clean_response(raw: &str) -> String {
    let mut response = raw.trim().to_string();

    if response.len() >= 2 && response.starts_with('"') && response.ends_with('"') {
        response = response[1..response.len() - 1].to_string();
    }

    if let Some(first_line) = response.split('\n').next() {
        response = first_line.to_string();
    }

    for prefix in ECHOED_PREFIXES {
        let matches = response
            .get(..prefix.len())
            .map(|head| head.eq_ignore_ascii_case(prefix))
            .unwrap_or(false);
        if matches {
            response = response[prefix.len()..].trim().to_string();
        }
    }

    // Collapse word repetition the sampler sometimes produces.
    let mut seen = std::collections::HashSet::new();
    let mut kept: Vec<&str> = Vec::new();
    for word in response.split_whitespace() {
        let canon = word.trim_matches(|c| matches!(c, '"' | ',' | '.')).to_lowercase();
        if seen.insert(canon) {
            kept.push(word);
        }
    }
    let mut response = kept.join(" ");

    if response.len() > MAX_REFINED_LEN {
        let mut cut = MAX_REFINED_LEN;
        while !response.is_char_boundary(cut) {
            cut -= 1;
        }
        response.truncate(cut);
        response = response.trim().to_string();
    }

    response
}

#[async_trait]
impl QueryRefiner for HttpRefiner {
    async fn refine(&self, query: &str) -> Result<String> {
        let request = GenerateRequest {
            model: &self.model,
            prompt: Self::build_prompt(query),
            stream: false,
            options: GenerateOptions {
                temperature: self.temperature,
                num_predict: self.max_tokens,
            },
        };

        let url = format!("{}/api/generate", self.endpoint);
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| WikiseekError::refinement(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(WikiseekError::refinement(format!(
                "Endpoint returned {}",
                response.status()
            )));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| WikiseekError::refinement(format!("Malformed response: {}", e)))?;

        let refined = clean_response(&body.response);
        if refined.is_empty() {
            return Err(WikiseekError::refinement("Model returned an empty rewrite"));
        }

        debug!("Refined {:?} -> {:?}", query, refined);
        Ok(refined)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
