use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::core::model::{ModelConsumer, ModelReply};
use crate::error::ModelError;
use crate::models::ModelConfig;

/// Ollama API client, the default `ModelConsumer`
pub struct OllamaClient {
    client: Client,
    config: ModelConfig,
    stream_to_stdout: bool,
}

/// Chat message for Ollama chat API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }
}

/// Request body for Ollama chat endpoint
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
}

/// Response line from Ollama chat endpoint (streaming)
#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<ChatMessageResponse>,
    done: bool,
    #[serde(default)]
    eval_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    #[serde(default)]
    content: String,
}

impl OllamaClient {
    pub fn new(config: ModelConfig, stream_to_stdout: bool) -> Result<Self, ModelError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| ModelError::RequestFailed(e.to_string()))?;

        Ok(Self { client, config, stream_to_stdout })
    }

    pub fn model_name(&self) -> &str {
        &self.config.model
    }

    /// Stream a chat completion and return the full text
    pub async fn generate(&self, system_prompt: Option<&str>, prompt: &str) -> Result<String, ModelError> {
        let url = format!("{}/api/chat", self.config.url);

        let mut messages = Vec::new();
        if let Some(sys) = system_prompt {
            messages.push(ChatMessage::system(sys));
        }
        messages.push(ChatMessage::user(prompt));

        let request = ChatRequest {
            model: self.config.model.clone(),
            messages,
            stream: true,
        };

        debug!("Sending chat request to {} with model {}", url, self.config.model);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    ModelError::ConnectionRefused(format!(
                        "Could not connect to Ollama at {}. Is Ollama running?",
                        self.config.url
                    ))
                } else if e.is_timeout() {
                    ModelError::Timeout(self.config.timeout_seconds)
                } else {
                    ModelError::from(e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ModelError::HttpError { status, message });
        }

        let mut full_response = String::new();
        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        let mut last_progress_log = Instant::now();
        let progress_interval = Duration::from_secs(10);

        'outer: while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result.map_err(|e| ModelError::StreamError(e.to_string()))?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            // Newline-delimited JSON
            while let Some(newline_pos) = buffer.find('\n') {
                let line: String = buffer.drain(..=newline_pos).collect();
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let parsed: ChatResponse = match serde_json::from_str(line) {
                    Ok(p) => p,
                    Err(e) if !full_response.is_empty() => {
                        debug!("Ignoring parse error on trailing chunk: {}", e);
                        continue;
                    }
                    Err(e) => {
                        let preview: String = line.chars().take(200).collect();
                        return Err(ModelError::ParseError(format!("{} - {}", preview, e)));
                    }
                };

                let content = parsed.message.as_ref().map(|m| m.content.as_str()).unwrap_or("");
                full_response.push_str(content);

                if self.stream_to_stdout {
                    print!("{}", content);
                    io::stdout().flush().ok();
                } else if last_progress_log.elapsed() > progress_interval {
                    info!("Generation in progress: {} chars so far...", full_response.len());
                    last_progress_log = Instant::now();
                }

                if parsed.done {
                    if self.stream_to_stdout {
                        println!();
                    }
                    if let Some(count) = parsed.eval_count {
                        debug!("Tokens generated: {}", count);
                    }
                    break 'outer;
                }
            }
        }

        info!("Generated {} characters", full_response.len());
        Ok(full_response)
    }

    /// Check if Ollama is reachable and the configured model is installed
    pub async fn check_model(&self) -> Result<bool, ModelError> {
        let url = format!("{}/api/tags", self.config.url);
        let response = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    ModelError::ConnectionRefused(format!("Could not connect to Ollama at {}", self.config.url))
                } else {
                    ModelError::from(e)
                }
            })?;

        if !response.status().is_success() {
            return Ok(false);
        }

        #[derive(Deserialize)]
        struct TagsResponse {
            models: Vec<ModelInfo>,
        }

        #[derive(Deserialize)]
        struct ModelInfo {
            name: String,
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| ModelError::ParseError(e.to_string()))?;

        let model_name = &self.config.model;
        let found = tags
            .models
            .iter()
            .any(|m| m.name == *model_name || m.name.starts_with(&format!("{}:", model_name)));

        if !found {
            warn!(
                "Model '{}' not found. Available models: {:?}",
                model_name,
                tags.models.iter().map(|m| &m.name).collect::<Vec<_>>()
            );
        }

        Ok(found)
    }
}

#[async_trait]
impl ModelConsumer for OllamaClient {
    async fn send(
        &self,
        context: &str,
        instruction: &str,
        target_path: Option<&Path>,
    ) -> Result<ModelReply, ModelError> {
        if let Some(path) = target_path {
            debug!("Requesting edit for {}", path.display());
        }
        let text = self.generate(Some(context), instruction).await?;
        Ok(ModelReply {
            text,
            model: self.config.model.clone(),
        })
    }
}
