//! Source-to-source instrumentation of route modules.
//!
//! Pipeline: tokenize → classify exports → splice in wrapper calls and
//! their imports. The transform is pure and per-module: no state is shared
//! across files, identical input yields byte-identical output, and running
//! the transform over its own output is a no-op.
//!
//! A module the scanner cannot tokenize (or whose surface the classifier
//! cannot model) is returned unchanged with `modified: false`; the host
//! build must never fail because of this subsystem.

pub mod classify;
pub mod lexer;
pub mod middleware;
pub mod rewrite;

use tracing::debug;

pub use classify::{ExportBinding, ExportShape, RecognizedExport};
pub use lexer::ParseError;

/// Host-facing configuration for the transform.
#[derive(Debug, Clone)]
pub struct TransformConfig {
    /// Application directory stripped from module paths when deriving route
    /// ids.
    pub app_dir: String,
    /// Import source for server-kind wrappers.
    pub server_source: String,
    /// Import source for client-kind wrappers.
    pub client_source: String,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            app_dir: "app".to_string(),
            server_source: "route-devtools/server".to_string(),
            client_source: "route-devtools/client".to_string(),
        }
    }
}

/// Result handed back to the build pipeline. When `modified` is false,
/// `code` is byte-identical to the input.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformOutput {
    pub code: String,
    /// Reserved for hosts that compose source maps; splice-based rewriting
    /// keeps untouched code at its original offsets, so none is produced.
    pub map: Option<serde_json::Value>,
    pub modified: bool,
}

impl TransformOutput {
    fn unmodified(source: &str) -> Self {
        TransformOutput {
            code: source.to_string(),
            map: None,
            modified: false,
        }
    }
}

/// Instrument the recognized exports of one route module.
pub fn transform(source: &str, file_path: &str, config: &TransformConfig) -> TransformOutput {
    let toks = match lexer::tokenize(source) {
        Ok(toks) => toks,
        Err(err) => {
            debug!(file_path, %err, "module not tokenizable, skipping transform");
            return TransformOutput::unmodified(source);
        }
    };

    let classified = classify::classify(source, &toks);
    if classified.bindings.is_empty() {
        return TransformOutput::unmodified(source);
    }

    let route_id = route_id_from_path(file_path, &config.app_dir);
    match rewrite::rewrite_module(source, &classified, &route_id, config) {
        Some(code) => TransformOutput { code, map: None, modified: true },
        None => TransformOutput::unmodified(source),
    }
}

const SOURCE_EXTENSIONS: &[&str] = &["tsx", "ts", "jsx", "js", "mjs", "cjs", "mts", "cts"];

/// Derive the stable route identifier from a module path: normalize
/// separators, strip the app-dir prefix and the source extension.
/// Deterministic across rebuilds; this is the correlation key between
/// compile-time wrapping and runtime events.
pub fn route_id_from_path(path: &str, app_dir: &str) -> String {
    let normalized = path.replace('\\', "/");
    let mut id = normalized.as_str();

    let prefix = app_dir.trim_end_matches('/');
    if !prefix.is_empty() {
        if let Some(rest) = id.strip_prefix(prefix) {
            id = rest;
        } else if let Some(pos) = id.find(&format!("/{prefix}/")) {
            id = &id[pos + prefix.len() + 1..];
        }
    }
    let id = id.trim_start_matches('/');

    let id = match id.rsplit_once('.') {
        Some((stem, ext)) if SOURCE_EXTENSIONS.contains(&ext) => stem,
        _ => id,
    };

    if id.is_empty() {
        "root".to_string()
    } else {
        id.to_string()
    }
}
