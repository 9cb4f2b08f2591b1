//! Generation bridge: one model call, three parse passes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::core::model::{ModelConsumer, ModelReply};
use crate::core::parser::{
    apply_edits, apply_patch, extract_code_files, extract_snippet, is_partial_content, parse_edit_instructions,
    parse_unified_diff,
};
use crate::core::prompts::assemble_file_context;
use crate::error::{EditLoopError, ModelError, Result};
use crate::models::GenerationResult;

/// Sends instructions to the model consumer and turns replies into file contents
pub struct GenerationBridge {
    model: Arc<dyn ModelConsumer>,
    timeout: Duration,
}

impl GenerationBridge {
    pub fn new(model: Arc<dyn ModelConsumer>, timeout: Duration) -> Self {
        Self { model, timeout }
    }

    /// A single model call bounded by the configured timeout
    pub async fn request(
        &self,
        context: &str,
        instruction: &str,
        target: Option<&Path>,
    ) -> std::result::Result<ModelReply, ModelError> {
        debug!("Model request: {} chars of context, {} chars of instruction", context.len(), instruction.len());
        tokio::time::timeout(self.timeout, self.model.send(context, instruction, target))
            .await
            .map_err(|_| ModelError::Timeout(self.timeout.as_secs()))?
    }

    /// Ask for an edit of `files` and parse the reply.
    ///
    /// An empty `files_changed` without an error means the model declined or
    /// answered in prose.
    pub async fn generate(
        &self,
        files: &[(PathBuf, String)],
        instruction: &str,
        target: Option<&Path>,
    ) -> Result<GenerationResult> {
        let listed: Vec<(&Path, &str)> = files.iter().map(|(p, c)| (p.as_path(), c.as_str())).collect();
        let context = assemble_file_context(&listed);
        let reply = self.request(&context, instruction, target).await?;

        let originals: BTreeMap<PathBuf, String> = files.iter().cloned().collect();
        let files_changed = parse_response(&reply.text, &originals, target).map_err(|message| {
            EditLoopError::Generation {
                path: target
                    .map(Path::to_path_buf)
                    .or_else(|| files.first().map(|(p, _)| p.clone()))
                    .unwrap_or_default(),
                message,
            }
        })?;

        info!("Model {} proposed changes to {} file(s)", reply.model, files_changed.len());
        Ok(GenerationResult {
            files_changed,
            raw_response: reply.text,
            model: reply.model,
        })
    }
}

/// Run the patch, full-file and bare passes over `response`.
///
/// The first pass that yields files wins. `Err` only when nothing was
/// extracted and the patch pass hit a patch it could not apply.
pub fn parse_response(
    response: &str,
    originals: &BTreeMap<PathBuf, String>,
    target: Option<&Path>,
) -> std::result::Result<BTreeMap<PathBuf, String>, String> {
    let (patched, patch_error) = patch_pass(response, originals);
    if !patched.is_empty() {
        if let Some(err) = &patch_error {
            warn!("Some patches were not applied: {}", err);
        }
        return Ok(patched);
    }

    let mut files = BTreeMap::new();
    for file in extract_code_files(response) {
        if is_partial_content(&file.content) {
            warn!("Discarding {}: reply contains placeholder lines instead of full content", file.path.display());
            continue;
        }
        files.insert(normalize_path(&file.path), file.content);
    }
    if !files.is_empty() {
        return Ok(files);
    }

    if let Some(target) = target {
        if let Some(body) = extract_snippet(response, "") {
            if is_partial_content(&body) {
                warn!("Discarding unnamed block for {}: placeholder lines found", target.display());
            } else {
                debug!("Keyed unnamed block to {}", target.display());
                files.insert(target.to_path_buf(), body);
                return Ok(files);
            }
        }
    }

    match patch_error {
        Some(err) => Err(err),
        None => Ok(files),
    }
}

/// Materialize edit blocks and unified diffs against the original content
fn patch_pass(
    response: &str,
    originals: &BTreeMap<PathBuf, String>,
) -> (BTreeMap<PathBuf, String>, Option<String>) {
    let mut files = BTreeMap::new();
    let mut errors = Vec::new();

    let edits = parse_edit_instructions(response);
    for raw in &edits.affected_files {
        let path = normalize_path(raw);
        let base = files
            .get(&path)
            .or_else(|| originals.get(&path))
            .cloned()
            .unwrap_or_default();
        match apply_edits(&base, &edits.edits_for_file(raw)) {
            Ok(content) => {
                files.insert(path, content);
            }
            Err(e) => errors.push(e),
        }
    }

    for patch in parse_unified_diff(response) {
        let path = normalize_path(&patch.file_path);
        let base = if patch.creates {
            String::new()
        } else {
            files.get(&path).or_else(|| originals.get(&path)).cloned().unwrap_or_default()
        };
        match apply_patch(&base, &patch) {
            Ok(content) => {
                files.insert(path, content);
            }
            Err(e) => errors.push(e),
        }
    }

    let error = (!errors.is_empty()).then(|| errors.join("; "));
    (files, error)
}

fn normalize_path(path: &Path) -> PathBuf {
    path.strip_prefix("./").map(Path::to_path_buf).unwrap_or_else(|_| path.to_path_buf())
}
