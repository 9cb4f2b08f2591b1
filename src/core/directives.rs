//! Expansion of in-text directives into plain context.
//!
//! Recognized directives:
//! - `#path/to/file.ext`, optionally `:<start>-<end>` or `:<start>,<end>` (1-based, inclusive)
//! - `#https://...` fetched over HTTP
//! - `#WS` / `#WORKSPACE` for workspace context
//! - `#SG "query"` or bare `#SG` for search grounding
//!
//! Expansion never fails. A directive that cannot be resolved is removed from
//! the text and logged.

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::core::model::{ModelConsumer, SearchGroundingProvider, UrlFetcher, WorkspaceContextProvider};
use crate::core::prompts::{fence_language, SYSTEM_PROMPT_SEARCH_QUERY};
use crate::models::LimitsConfig;

static WORKSPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(^|\s)#(?:WORKSPACE|WS)\b").expect("workspace directive regex"));

static SEARCH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(^|\s)#SG\b(?:[ \t]*"([^"]*)")?"#).expect("search directive regex"));

static FILE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(^|\s)#(https?://\S+|[A-Za-z][\w./-]*)(?::(\d+)[-,](\d+))?").expect("file directive regex")
});

static QUOTED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"]{2,})""#).expect("quoted query regex"));

/// Placeholder marker for search results held out of the file-directive pass
const SEARCH_SLOT: char = '\u{1}';

/// Rewrites an instruction by resolving its directives
pub struct DirectiveExpander {
    project_root: PathBuf,
    limits: LimitsConfig,
    timeout: Duration,
    workspace: Option<Arc<dyn WorkspaceContextProvider>>,
    search: Option<Arc<dyn SearchGroundingProvider>>,
    query_model: Option<Arc<dyn ModelConsumer>>,
    fetcher: Option<Arc<dyn UrlFetcher>>,
}

impl DirectiveExpander {
    pub fn new(project_root: PathBuf, limits: LimitsConfig, timeout: Duration) -> Self {
        Self {
            project_root,
            limits,
            timeout,
            workspace: None,
            search: None,
            query_model: None,
            fetcher: None,
        }
    }

    pub fn with_workspace_provider(mut self, provider: Arc<dyn WorkspaceContextProvider>) -> Self {
        self.workspace = Some(provider);
        self
    }

    pub fn with_search_provider(mut self, provider: Arc<dyn SearchGroundingProvider>) -> Self {
        self.search = Some(provider);
        self
    }

    /// Model used to synthesize a query for a bare `#SG`
    pub fn with_query_model(mut self, model: Arc<dyn ModelConsumer>) -> Self {
        self.query_model = Some(model);
        self
    }

    pub fn with_url_fetcher(mut self, fetcher: Arc<dyn UrlFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn set_workspace_provider(&mut self, provider: Arc<dyn WorkspaceContextProvider>) {
        self.workspace = Some(provider);
    }

    pub fn set_search_provider(&mut self, provider: Arc<dyn SearchGroundingProvider>) {
        self.search = Some(provider);
    }

    pub fn set_url_fetcher(&mut self, fetcher: Arc<dyn UrlFetcher>) {
        self.fetcher = Some(fetcher);
    }

    pub fn has_search_provider(&self) -> bool {
        self.search.is_some()
    }

    /// Resolve every directive in `instruction`
    pub async fn expand(&self, instruction: &str) -> String {
        let (text, wants_workspace) = strip_workspace_tags(instruction);
        let (text, search_blocks) = self.resolve_search(&text).await;
        let mut text = self.resolve_files(&text).await;

        for (i, block) in search_blocks.iter().enumerate() {
            text = text.replacen(&search_slot(i), block, 1);
        }

        if wants_workspace {
            match self.workspace_context(&text).await {
                Some(context) => {
                    text = format!("{}\n\n## Workspace context\n{}", text.trim_end(), context.trim());
                }
                None => warn!("Workspace context unavailable; dropping #WS"),
            }
        }

        text.trim_end().to_string()
    }

    async fn workspace_context(&self, instruction: &str) -> Option<String> {
        let provider = self.workspace.as_ref()?;
        match tokio::time::timeout(self.timeout, provider.get_context(instruction)).await {
            Ok(context) if !context.trim().is_empty() => Some(context),
            Ok(_) => None,
            Err(_) => {
                warn!("Workspace context timed out after {:?}", self.timeout);
                None
            }
        }
    }

    /// Replace every `#SG` with a slot marker; returns the text and the slot contents
    async fn resolve_search(&self, text: &str) -> (String, Vec<String>) {
        let matches: Vec<(String, String, Option<String>)> = SEARCH_RE
            .captures_iter(text)
            .map(|caps| {
                let whole = caps[0].to_string();
                let lead = caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_default();
                let query = caps.get(2).map(|m| m.as_str().trim().to_string());
                (whole, lead, query)
            })
            .collect();

        if matches.is_empty() {
            return (text.to_string(), Vec::new());
        }

        let fallback_query = truncate_chars(SEARCH_RE.replace_all(text, "$1").trim(), self.limits.max_query_chars);

        let mut out = text.to_string();
        let mut blocks = Vec::new();
        for (whole, lead, query) in matches {
            let replacement = match self.search_block(query, &fallback_query).await {
                Some(block) => {
                    let slot = search_slot(blocks.len());
                    blocks.push(block);
                    format!("{}{}", lead, slot)
                }
                None => lead,
            };
            out = out.replacen(&whole, &replacement, 1);
        }
        (out, blocks)
    }

    async fn search_block(&self, explicit: Option<String>, fallback_query: &str) -> Option<String> {
        let Some(provider) = self.search.as_ref() else {
            warn!("No search provider configured; dropping #SG");
            return None;
        };

        let mut queries: Vec<String> = Vec::new();
        match explicit.filter(|q| !q.is_empty()) {
            Some(q) => queries.push(q),
            None => {
                if let Some(q) = self.synthesize_query(fallback_query).await {
                    queries.push(q);
                }
                if !fallback_query.is_empty() {
                    queries.push(fallback_query.to_string());
                }
            }
        }
        queries.dedup();

        for query in queries.into_iter().take(self.limits.max_searches) {
            debug!("Running search grounding query: {}", query);
            match tokio::time::timeout(self.timeout, provider.search(&query)).await {
                Ok(Ok(results)) if !results.trim().is_empty() => {
                    info!("Search grounding returned {} chars for \"{}\"", results.len(), query);
                    return Some(format!("\n\nSearch results for \"{}\":\n{}\n", query, results.trim()));
                }
                Ok(Ok(_)) => warn!("Search for \"{}\" returned nothing", query),
                Ok(Err(e)) => warn!("Search for \"{}\" failed: {}", query, e),
                Err(_) => warn!("Search for \"{}\" timed out after {:?}", query, self.timeout),
            }
        }
        None
    }

    async fn synthesize_query(&self, text: &str) -> Option<String> {
        let model = self.query_model.as_ref()?;
        let call = model.send(SYSTEM_PROMPT_SEARCH_QUERY, text, None);
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(reply)) => extract_query(&reply.text),
            Ok(Err(e)) => {
                warn!("Search query generation failed: {}", e);
                None
            }
            Err(_) => {
                warn!("Search query generation timed out");
                None
            }
        }
    }

    async fn resolve_files(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;

        for caps in FILE_RE.captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            let lead = caps.get(1).map(|m| m.as_str()).unwrap_or("");
            let raw_target = &caps[2];
            let range = match (caps.get(3), caps.get(4)) {
                (Some(a), Some(b)) => a.as_str().parse::<usize>().ok().zip(b.as_str().parse::<usize>().ok()),
                _ => None,
            };

            out.push_str(&text[last..whole.start()]);
            last = whole.end();

            if matches!(raw_target, "SG" | "WS" | "WORKSPACE") {
                out.push_str(whole.as_str());
                continue;
            }

            if is_url(raw_target) {
                match self.fetch_url(raw_target).await {
                    Some(body) => out.push_str(&format!("{}\n\n### URL: {}\n{}\n", lead, raw_target, body.trim())),
                    None => out.push_str(lead),
                }
                continue;
            }

            let target = raw_target.trim_end_matches('.');
            let path = self.project_root.join(target);
            if !looks_like_path(target) && range.is_none() && !path.is_file() {
                out.push_str(whole.as_str());
                continue;
            }

            match self.include_file(target, &path, range) {
                Some(block) => out.push_str(&format!("{}{}", lead, block)),
                None => {
                    warn!("Could not resolve directive #{}; dropping it", raw_target);
                    out.push_str(lead);
                }
            }
        }

        out.push_str(&text[last..]);
        out
    }

    async fn fetch_url(&self, url: &str) -> Option<String> {
        let Some(fetcher) = self.fetcher.as_ref() else {
            warn!("No URL fetcher configured; dropping #{}", url);
            return None;
        };
        match tokio::time::timeout(self.timeout, fetcher.fetch(url)).await {
            Ok(Ok(body)) => Some(body),
            Ok(Err(e)) => {
                warn!("Failed to fetch {}: {}", url, e);
                None
            }
            Err(_) => {
                warn!("Fetching {} timed out", url);
                None
            }
        }
    }

    fn include_file(&self, shown_path: &str, path: &Path, range: Option<(usize, usize)>) -> Option<String> {
        let content = std::fs::read_to_string(path).ok()?;
        let lines: Vec<&str> = content.lines().collect();

        let (selected, label) = match range {
            Some((start, end)) => {
                let start = start.max(1);
                let end = end.min(lines.len());
                if start > end {
                    return None;
                }
                (lines[start - 1..end].to_vec(), format!(" (lines {}-{})", start, end))
            }
            None => (lines, String::new()),
        };

        let max = self.limits.max_directive_lines;
        let mut body = selected.iter().take(max).copied().collect::<Vec<_>>().join("\n");
        if selected.len() > max {
            body.push_str(&format!("\n... [truncated after {} lines]", max));
        }

        debug!("Inlined #{}{} ({} lines)", shown_path, label, selected.len().min(max));
        Some(format!(
            "\n\n### File: {}{}\n```{}\n{}\n```\n",
            shown_path,
            label,
            fence_language(path),
            body
        ))
    }
}

/// Remove every workspace tag; report whether one was present
fn strip_workspace_tags(text: &str) -> (String, bool) {
    if !WORKSPACE_RE.is_match(text) {
        return (text.to_string(), false);
    }
    let stripped = WORKSPACE_RE.replace_all(text, "$1");
    (stripped.trim_end().to_string(), true)
}

/// Remove a trailing workspace tag from an instruction
pub fn strip_trailing_workspace_tag(instruction: &str) -> String {
    let trimmed = instruction.trim_end();
    for tag in ["#WORKSPACE", "#WS"] {
        if let Some(rest) = trimmed.strip_suffix(tag) {
            return rest.trim_end().to_string();
        }
    }
    trimmed.to_string()
}

fn search_slot(index: usize) -> String {
    format!("{}search-{}{}", SEARCH_SLOT, index, SEARCH_SLOT)
}

fn is_url(target: &str) -> bool {
    target.starts_with("http://") || target.starts_with("https://")
}

fn looks_like_path(target: &str) -> bool {
    target.contains('.') || target.contains('/')
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Pull a query out of a model reply, preferring a quoted string
pub(crate) fn extract_query(reply: &str) -> Option<String> {
    if let Some(caps) = QUOTED_RE.captures(reply) {
        return Some(caps[1].trim().to_string());
    }
    let line = reply.lines().map(str::trim).find(|l| !l.is_empty())?;
    Some(line.trim_matches('"').to_string())
}
