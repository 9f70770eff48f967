//! Port for configuration layer providers.
//!
//! A provider (file tree, VCS checkout, future secret stores) exposes one
//! operation: produce an immutable [`ConfigSnapshot`] of a label's layers.
//! The merge algorithm in `core::config_resolver` is provider-agnostic and
//! reads every layer from a single snapshot, so a concurrent repository
//! refresh can never tear one resolution.
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use async_trait::async_trait;
use thiserror::Error;

/// A configuration document flattened to dotted string keys
/// (`server.port = "8080"`, `features[0] = "audit"`).
pub type FlatDocument = BTreeMap<String, String>;

/// Errors surfaced by configuration sources and resolution.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// No layer matched the (application, profile, label) triple.
    #[error("no configuration for application '{application}' profile '{profile}' label '{label}'")]
    NotFound {
        application: String,
        profile: String,
        label: String,
    },

    /// The requested label does not exist in the repository.
    #[error("unknown configuration label '{0}'")]
    UnknownLabel(String),

    /// The underlying repository failed (I/O, parse, ...).
    #[error("configuration repository error: {0}")]
    Repository(String),
}

/// One consistent revision of all layers under a single label.
///
/// Layers are shared via `Arc`, so taking a snapshot is cheap and the data
/// stays immutable for the lifetime of the resolution that holds it.
#[derive(Debug, Clone)]
pub struct ConfigSnapshot {
    revision: String,
    layers: Arc<HashMap<String, FlatDocument>>,
}

impl ConfigSnapshot {
    pub fn new(revision: String, layers: Arc<HashMap<String, FlatDocument>>) -> Self {
        Self { revision, layers }
    }

    pub fn revision(&self) -> &str {
        &self.revision
    }

    /// Fetch one layer by its file stem (e.g. `application-dev`).
    pub fn fetch(&self, stem: &str) -> Option<&FlatDocument> {
        self.layers.get(stem)
    }
}

/// ConfigSource defines the port (interface) for configuration repositories.
#[async_trait]
pub trait ConfigSource: Send + Sync + 'static {
    /// Take a consistent snapshot of the given label's layers.
    async fn snapshot(&self, label: &str) -> Result<ConfigSnapshot, ConfigError>;
}

/// Flatten a hierarchical document into dotted key/value pairs.
///
/// Scalars become their string form, nested maps are joined with `.`, and
/// sequences are indexed with `[i]` so list-valued keys survive the merge.
pub fn flatten_document(value: &serde_json::Value) -> FlatDocument {
    let mut flat = FlatDocument::new();
    flatten_into(&mut flat, "", value);
    flat
}

fn flatten_into(flat: &mut FlatDocument, prefix: &str, value: &serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten_into(flat, &path, child);
            }
        }
        serde_json::Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                flatten_into(flat, &format!("{prefix}[{index}]"), child);
            }
        }
        serde_json::Value::String(s) => {
            flat.insert(prefix.to_string(), s.clone());
        }
        serde_json::Value::Null => {
            flat.insert(prefix.to_string(), String::new());
        }
        other => {
            flat.insert(prefix.to_string(), other.to_string());
        }
    }
}
