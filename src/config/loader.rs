use std::path::Path;

use config::{Config, File, FileFormat};
use eyre::{Context, Result};

use crate::config::models::NodeConfig;

/// Load node configuration from a file using the config crate.
/// Supports multiple formats: YAML, JSON, TOML, etc.
pub async fn load_config(config_path: &str) -> Result<NodeConfig> {
    load_config_sync(config_path)
}

/// Load node configuration synchronously.
pub fn load_config_sync(config_path: &str) -> Result<NodeConfig> {
    let config_path = Path::new(config_path);

    // Determine file format based on extension
    let format = match config_path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => FileFormat::Yaml,
        Some("json") => FileFormat::Json,
        Some("toml") => FileFormat::Toml,
        Some("ini") => FileFormat::Ini,
        _ => FileFormat::Yaml, // Default to YAML
    };

    let settings = Config::builder()
        .add_source(File::new(
            config_path
                .to_str()
                .ok_or_else(|| eyre::eyre!("Invalid UTF-8 path: {}", config_path.display()))?,
            format,
        ))
        .build()
        .with_context(|| format!("Failed to build config from {}", config_path.display()))?;

    let node_config: NodeConfig = settings.try_deserialize().with_context(|| {
        format!(
            "Failed to deserialize config from {}",
            config_path.display()
        )
    })?;

    Ok(node_config)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    #[tokio::test]
    async fn test_load_yaml_config() {
        let yaml_content = r#"
listen_addr: "127.0.0.1:3000"
control_addr: "127.0.0.1:3761"
registry:
  lease_timeout: "45s"
routes:
  - id: "tasks"
    path_prefix: "/api/tasks"
    service: "task-service"
    filters:
      - kind: "strip_prefix"
        parts: 1
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "{}", yaml_content).unwrap();

        let config = load_config(temp_file.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:3000");
        assert_eq!(config.control_addr, "127.0.0.1:3761");
        assert_eq!(config.registry.lease_timeout, "45s");
        assert_eq!(config.routes.len(), 1);
        assert_eq!(config.routes[0].service, "task-service");
        assert_eq!(config.routes[0].filters.len(), 1);
    }

    #[tokio::test]
    async fn test_load_toml_config() {
        let toml_content = r#"
listen_addr = "127.0.0.1:3000"

[[routes]]
id = "users"
order = 5
path_prefix = "/api/users"
service = "user-service"
strategy = "random"
"#;

        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        write!(temp_file, "{}", toml_content).unwrap();

        let config = load_config(temp_file.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:3000");
        assert_eq!(config.routes.len(), 1);
        assert_eq!(config.routes[0].order, 5);
        assert_eq!(
            config.routes[0].strategy,
            crate::config::models::LoadBalanceStrategy::Random
        );
    }
}
