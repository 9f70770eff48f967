//! Layered configuration resolution.
//!
//! Resolves an (application, profile, label) triple into one merged
//! document. Layers are read from a single [`ConfigSnapshot`] so the result
//! reflects exactly one repository revision. Precedence, lowest to highest:
//!
//! 1. `application` — shared defaults
//! 2. `application-{profile}` — shared, profile-specific
//! 3. `{application}` — app-specific
//! 4. `{application}-{profile}` — app + profile specific
//!
//! Higher layers override conflicting keys; non-conflicting keys from every
//! present layer are kept. Missing layers are skipped silently; if all four
//! are missing the resolution fails with `NotFound`.
use std::sync::Arc;

use serde::Serialize;

use crate::ports::config_source::{ConfigError, ConfigSource, FlatDocument};

/// A merged configuration document tagged with its coordinates.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    pub application: String,
    pub profile: String,
    pub label: String,
    /// Repository revision the snapshot was taken from.
    pub revision: String,
    /// Names of the layers that contributed, lowest precedence first.
    pub layers: Vec<String>,
    pub properties: FlatDocument,
}

/// Resolves merged configuration documents from a [`ConfigSource`].
pub struct ConfigResolver {
    source: Arc<dyn ConfigSource>,
    default_label: String,
}

impl ConfigResolver {
    pub fn new(source: Arc<dyn ConfigSource>, default_label: impl Into<String>) -> Self {
        Self {
            source,
            default_label: default_label.into(),
        }
    }

    pub fn default_label(&self) -> &str {
        &self.default_label
    }

    /// Resolve the merged document for an application and profile. `label`
    /// falls back to the configured default when omitted.
    pub async fn resolve(
        &self,
        application: &str,
        profile: &str,
        label: Option<&str>,
    ) -> Result<ResolvedConfig, ConfigError> {
        let label = label.unwrap_or(&self.default_label);
        let not_found = || ConfigError::NotFound {
            application: application.to_string(),
            profile: profile.to_string(),
            label: label.to_string(),
        };

        let snapshot = match self.source.snapshot(label).await {
            Ok(snapshot) => snapshot,
            // An absent label means no layer can match; callers observe the
            // same NotFound they would get for an unknown application.
            Err(ConfigError::UnknownLabel(_)) => return Err(not_found()),
            Err(e) => return Err(e),
        };

        let mut properties = FlatDocument::new();
        let mut applied = Vec::new();
        for stem in layer_stems(application, profile) {
            if let Some(layer) = snapshot.fetch(&stem) {
                for (key, value) in layer {
                    properties.insert(key.clone(), value.clone());
                }
                applied.push(stem);
            }
        }

        if applied.is_empty() {
            return Err(not_found());
        }

        tracing::debug!(
            application,
            profile,
            label,
            revision = snapshot.revision(),
            layers = ?applied,
            "resolved configuration"
        );

        Ok(ResolvedConfig {
            application: application.to_string(),
            profile: profile.to_string(),
            label: label.to_string(),
            revision: snapshot.revision().to_string(),
            layers: applied,
            properties,
        })
    }
}

/// Candidate layer stems in merge order (lowest precedence first).
fn layer_stems(application: &str, profile: &str) -> Vec<String> {
    let candidates = [
        "application".to_string(),
        format!("application-{profile}"),
        application.to_string(),
        format!("{application}-{profile}"),
    ];
    // An application literally named "application" would repeat stems.
    let mut stems: Vec<String> = Vec::with_capacity(candidates.len());
    for stem in candidates {
        if !stems.contains(&stem) {
            stems.push(stem);
        }
    }
    stems
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;

    use super::*;
    use crate::ports::config_source::ConfigSnapshot;

    struct FixedSource {
        label: String,
        layers: Arc<HashMap<String, FlatDocument>>,
    }

    impl FixedSource {
        fn new(label: &str, layers: Vec<(&str, Vec<(&str, &str)>)>) -> Self {
            let layers = layers
                .into_iter()
                .map(|(stem, pairs)| {
                    let doc = pairs
                        .into_iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect::<FlatDocument>();
                    (stem.to_string(), doc)
                })
                .collect();
            Self {
                label: label.to_string(),
                layers: Arc::new(layers),
            }
        }
    }

    #[async_trait]
    impl ConfigSource for FixedSource {
        async fn snapshot(&self, label: &str) -> Result<ConfigSnapshot, ConfigError> {
            if label == self.label {
                Ok(ConfigSnapshot::new("r1".to_string(), self.layers.clone()))
            } else {
                Err(ConfigError::UnknownLabel(label.to_string()))
            }
        }
    }

    fn resolver(layers: Vec<(&str, Vec<(&str, &str)>)>) -> ConfigResolver {
        ConfigResolver::new(Arc::new(FixedSource::new("main", layers)), "main")
    }

    #[tokio::test]
    async fn precedence_fills_gaps_and_overrides_conflicts() {
        let resolver = resolver(vec![
            ("application", vec![("a", "1"), ("b", "1")]),
            ("application-dev", vec![("b", "2")]),
            ("svc", vec![("c", "3")]),
            ("svc-dev", vec![("c", "4")]),
        ]);

        let doc = resolver.resolve("svc", "dev", None).await.unwrap();
        assert_eq!(doc.properties.get("a").map(String::as_str), Some("1"));
        assert_eq!(doc.properties.get("b").map(String::as_str), Some("2"));
        assert_eq!(doc.properties.get("c").map(String::as_str), Some("4"));
        assert_eq!(
            doc.layers,
            vec!["application", "application-dev", "svc", "svc-dev"]
        );
        assert_eq!(doc.revision, "r1");
    }

    #[tokio::test]
    async fn missing_layers_are_skipped_silently() {
        let resolver = resolver(vec![("svc", vec![("c", "3")])]);

        let doc = resolver.resolve("svc", "prod", None).await.unwrap();
        assert_eq!(doc.properties.get("c").map(String::as_str), Some("3"));
        assert_eq!(doc.layers, vec!["svc"]);
    }

    #[tokio::test]
    async fn all_layers_missing_is_not_found() {
        let resolver = resolver(vec![("other", vec![("x", "1")])]);

        let err = resolver.resolve("svc", "dev", None).await.unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }

    #[tokio::test]
    async fn unknown_label_resolves_to_not_found() {
        let resolver = resolver(vec![("svc", vec![("c", "3")])]);

        let err = resolver
            .resolve("svc", "dev", Some("feature-x"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }

    #[tokio::test]
    async fn label_defaults_to_configured_default() {
        let resolver = resolver(vec![("svc", vec![("c", "3")])]);

        let doc = resolver.resolve("svc", "dev", None).await.unwrap();
        assert_eq!(doc.label, "main");
    }

    #[test]
    fn stems_deduplicate_for_application_named_application() {
        let stems = layer_stems("application", "dev");
        assert_eq!(stems, vec!["application", "application-dev"]);
    }
}
