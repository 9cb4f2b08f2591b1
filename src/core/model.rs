//! Seams to the external collaborators the engine calls out to.

use async_trait::async_trait;
use std::path::Path;

use crate::error::ModelError;

/// Text returned by a model together with the name of the model that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelReply {
    pub text: String,
    pub model: String,
}

/// Something that turns a context and an instruction into model output.
///
/// `context` carries the standing prompt plus any file content, `instruction`
/// the request for this call. `target_path` names the file being edited, when
/// there is exactly one.
#[async_trait]
pub trait ModelConsumer: Send + Sync {
    async fn send(
        &self,
        context: &str,
        instruction: &str,
        target_path: Option<&Path>,
    ) -> Result<ModelReply, ModelError>;
}

/// Supplies a relevance-ranked summary of the repository for `#WS`
#[async_trait]
pub trait WorkspaceContextProvider: Send + Sync {
    async fn get_context(&self, instruction: &str) -> String;
}

/// Runs a web or document search for `#SG`
#[async_trait]
pub trait SearchGroundingProvider: Send + Sync {
    async fn search(&self, query: &str) -> Result<String, String>;
}

/// Fetches the body of an `http(s)://` directive target
#[async_trait]
pub trait UrlFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, String>;
}

/// `UrlFetcher` backed by reqwest
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: std::time::Duration) -> Result<Self, ModelError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ModelError::RequestFailed(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl UrlFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, String> {
        let response = self.client.get(url).send().await.map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("HTTP {}", response.status().as_u16()));
        }
        response.text().await.map_err(|e| e.to_string())
    }
}
