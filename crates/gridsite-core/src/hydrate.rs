//! Decoding of the JSON blobs the dashboard page embeds for first render.

use crate::{QuerySnapshot, Template};
use regex::Regex;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const INITIAL_DATA_ID: &str = "initial-data";
pub const TEMPLATES_DATA_ID: &str = "templates-data";

#[derive(Debug, Error)]
pub enum HydrateError {
    #[error("invalid json in `{origin}`: {source}")]
    Json {
        origin: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InitialPayload {
    pub queries: Vec<QuerySnapshot>,
    pub templates: Vec<Template>,
}

/// Text content of `<script id="{element_id}" ...>`, if the page carries one.
pub fn extract_json_script(html: &str, element_id: &str) -> Option<String> {
    let pattern = format!(
        r#"(?is)<script[^>]*\bid\s*=\s*["']{}["'][^>]*>(.*?)</script>"#,
        regex::escape(element_id)
    );
    let re = Regex::new(&pattern).ok()?;
    re.captures(html)
        .and_then(|caps| caps.get(1))
        .map(|body| body.as_str().trim().to_string())
}

/// Missing blocks hydrate as empty lists; malformed blocks are errors.
pub fn from_page(html: &str) -> Result<InitialPayload, HydrateError> {
    let queries = match extract_json_script(html, INITIAL_DATA_ID) {
        Some(raw) => decode_queries(&raw, INITIAL_DATA_ID)?,
        None => Vec::new(),
    };
    let templates = match extract_json_script(html, TEMPLATES_DATA_ID) {
        Some(raw) => decode_templates(&raw, TEMPLATES_DATA_ID)?,
        None => Vec::new(),
    };
    Ok(InitialPayload { queries, templates })
}

pub fn decode_queries(raw: &str, origin: &str) -> Result<Vec<QuerySnapshot>, HydrateError> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(raw).map_err(|source| HydrateError::Json {
        origin: origin.to_string(),
        source,
    })
}

pub fn decode_templates(raw: &str, origin: &str) -> Result<Vec<Template>, HydrateError> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(raw).map_err(|source| HydrateError::Json {
        origin: origin.to_string(),
        source,
    })
}

pub fn read_blob(path: &Path) -> Result<String, HydrateError> {
    std::fs::read_to_string(path).map_err(|source| HydrateError::Io {
        path: path.to_path_buf(),
        source,
    })
}
