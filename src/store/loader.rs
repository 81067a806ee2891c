//! Source loading for ingestion: local files and web pages.

use std::fs;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::{Error, Result};

/// File extensions picked up when walking a directory.
pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["txt", "md", "html"];

/// Pages indexed when no source is given.
pub const DEFAULT_URLS: [&str; 3] = [
    "https://lilianweng.github.io/posts/2023-06-23-agent/",
    "https://lilianweng.github.io/posts/2023-03-15-prompt-engineering/",
    "https://lilianweng.github.io/posts/2023-10-25-adv-attack-llm/",
];

static SCRIPT_OR_STYLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style|noscript)\b[^>]*>.*?</(script|style|noscript)>")
        .expect("script regex is valid")
});
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]+>").expect("tag regex is valid"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("whitespace regex is valid"));

/// Reduce an HTML page to its visible text.
pub fn strip_html(html: &str) -> String {
    let without_scripts = SCRIPT_OR_STYLE.replace_all(html, " ");
    let without_tags = TAG.replace_all(&without_scripts, " ");
    let decoded = without_tags
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    WHITESPACE.replace_all(&decoded, " ").trim().to_string()
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn read_document(path: &Path) -> Result<String> {
    let content = fs::read_to_string(path)?;
    let is_html = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("html"));
    Ok(if is_html { strip_html(&content) } else { content })
}

/// Load every supported file under `root` as `(path, text)`.
/// A single file path is loaded directly.
pub fn load_path(root: &Path) -> Result<Vec<(String, String)>> {
    if root.is_file() {
        return Ok(vec![(root.display().to_string(), read_document(root)?)]);
    }
    if !root.exists() {
        return Err(Error::InvalidArgument(format!(
            "source path does not exist: {}",
            root.display()
        )));
    }

    let mut docs = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_supported(e.path()))
    {
        match read_document(entry.path()) {
            Ok(text) => {
                debug!(path = %entry.path().display(), chars = text.len(), "Loaded file");
                docs.push((entry.path().display().to_string(), text));
            }
            Err(e) => warn!(path = %entry.path().display(), error = %e, "Skipping unreadable file"),
        }
    }

    info!(root = %root.display(), files = docs.len(), "Loaded documents");
    Ok(docs)
}

/// Fetch pages and return their visible text as `(url, text)`.
pub async fn fetch_urls(urls: &[String]) -> Result<Vec<(String, String)>> {
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(60))
        .build()
        .map_err(|e| Error::Index(format!("failed to build HTTP client: {}", e)))?;

    let mut docs = Vec::with_capacity(urls.len());
    for url in urls {
        let response = http
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Index(format!("failed to fetch {}: {}", url, e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Index(format!("failed to fetch {}: HTTP {}", url, status)));
        }
        let body = response
            .text()
            .await
            .map_err(|e| Error::Index(format!("failed to read {}: {}", url, e)))?;

        let text = strip_html(&body);
        info!(url = %url, chars = text.len(), "Fetched page");
        docs.push((url.clone(), text));
    }
    Ok(docs)
}
