//! File-backed configuration repository.
//!
//! The repository is a directory tree: files at the root belong to the
//! default label, each subdirectory is an additional label (a branch/version
//! selector). Every file becomes one layer named by its stem, parsed by
//! extension (yaml / yml / json / toml) and flattened.
//!
//! The whole tree is parsed into an immutable `RepoState` published through
//! an `ArcSwap`: snapshots are a cheap pointer load, a re-scan swaps the
//! pointer, and an in-flight resolution keeps reading the revision it
//! started with — a refresh can never tear a document.
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use arc_swap::ArcSwap;
use async_trait::async_trait;
use config::{Config, File, FileFormat};
use eyre::{Context, Result};
use notify::{RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::ports::config_source::{ConfigError, ConfigSnapshot, ConfigSource, FlatDocument};

type LabelLayers = Arc<HashMap<String, FlatDocument>>;

struct RepoState {
    revision: u64,
    labels: HashMap<String, LabelLayers>,
}

/// Configuration source backed by a local directory, with change watching.
pub struct FileConfigSource {
    root: PathBuf,
    default_label: String,
    state: ArcSwap<RepoState>,
    // We keep the watcher alive by storing it, even though we don't access it directly after init
    _watcher: Option<notify::RecommendedWatcher>,
    update_tx: mpsc::Sender<()>,
    // The receiver is handed out once via `watch()`
    update_rx: std::sync::Mutex<Option<mpsc::Receiver<()>>>,
}

impl FileConfigSource {
    /// Scan the repository and start watching it for changes.
    pub fn new(root: impl Into<PathBuf>, default_label: impl Into<String>) -> Result<Self> {
        let root = root.into();
        let default_label = default_label.into();
        let (tx, rx) = mpsc::channel(1);

        let labels = scan_repository(&root, &default_label)
            .with_context(|| format!("failed to scan config repository {}", root.display()))?;

        let mut source = Self {
            root,
            default_label,
            state: ArcSwap::from_pointee(RepoState {
                revision: 1,
                labels,
            }),
            _watcher: None,
            update_tx: tx,
            update_rx: std::sync::Mutex::new(Some(rx)),
        };
        source.init_watcher()?;
        Ok(source)
    }

    fn init_watcher(&mut self) -> Result<()> {
        let tx = self.update_tx.clone();
        let mut watcher =
            notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
                match res {
                    Ok(event) => {
                        if event.kind.is_modify()
                            || event.kind.is_create()
                            || event.kind.is_remove()
                        {
                            tracing::debug!(kind = ?event.kind, "config repository changed");
                            // Coalesced by the refresh task; dropping the
                            // signal when the channel is full is fine.
                            let _ = tx.try_send(());
                        }
                    }
                    Err(e) => tracing::error!("config repository watch error: {e:?}"),
                }
            })?;

        watcher
            .watch(&self.root, RecursiveMode::Recursive)
            .wrap_err("failed to watch config repository")?;
        self._watcher = Some(watcher);
        Ok(())
    }

    /// Receiver signalling that the repository changed on disk. Each signal
    /// should trigger a [`rescan`](Self::rescan). Can only be taken once.
    pub fn watch(&self) -> Option<mpsc::Receiver<()>> {
        self.update_rx
            .lock()
            .ok()
            .and_then(|mut guard| guard.take())
    }

    /// Re-read the repository from disk and publish a new revision.
    /// In-flight snapshots keep the revision they started with.
    pub fn rescan(&self) -> Result<u64> {
        let labels = scan_repository(&self.root, &self.default_label)
            .with_context(|| format!("failed to re-scan {}", self.root.display()))?;
        let revision = self.state.load().revision + 1;
        self.state.store(Arc::new(RepoState { revision, labels }));
        tracing::info!(revision, "config repository re-scanned");
        Ok(revision)
    }

    /// Current repository revision.
    pub fn revision(&self) -> u64 {
        self.state.load().revision
    }
}

#[async_trait]
impl ConfigSource for FileConfigSource {
    async fn snapshot(&self, label: &str) -> Result<ConfigSnapshot, ConfigError> {
        let state = self.state.load();
        match state.labels.get(label) {
            Some(layers) => Ok(ConfigSnapshot::new(
                state.revision.to_string(),
                layers.clone(),
            )),
            None => Err(ConfigError::UnknownLabel(label.to_string())),
        }
    }
}

/// Parse the repository tree into per-label layer maps.
fn scan_repository(root: &Path, default_label: &str) -> Result<HashMap<String, LabelLayers>> {
    let mut labels: HashMap<String, HashMap<String, FlatDocument>> = HashMap::new();
    labels.insert(default_label.to_string(), scan_label_dir(root)?);

    for entry in std::fs::read_dir(root)
        .with_context(|| format!("cannot read repository root {}", root.display()))?
    {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir()
            && let Some(label) = path.file_name().and_then(|n| n.to_str())
        {
            labels.insert(label.to_string(), scan_label_dir(&path)?);
        }
    }

    Ok(labels
        .into_iter()
        .map(|(label, layers)| (label, Arc::new(layers)))
        .collect())
}

/// Parse every recognized file directly inside `dir` into a layer.
fn scan_label_dir(dir: &Path) -> Result<HashMap<String, FlatDocument>> {
    let mut layers = HashMap::new();
    for entry in
        std::fs::read_dir(dir).with_context(|| format!("cannot read {}", dir.display()))?
    {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let Some(format) = file_format(&path) else {
            continue;
        };
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        layers.insert(stem.to_string(), parse_layer_file(&path, format)?);
    }
    Ok(layers)
}

fn file_format(path: &Path) -> Option<FileFormat> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => Some(FileFormat::Yaml),
        Some("json") => Some(FileFormat::Json),
        Some("toml") => Some(FileFormat::Toml),
        _ => None,
    }
}

fn parse_layer_file(path: &Path, format: FileFormat) -> Result<FlatDocument> {
    let path_str = path
        .to_str()
        .ok_or_else(|| eyre::eyre!("invalid UTF-8 path: {}", path.display()))?;
    let value: serde_json::Value = Config::builder()
        .add_source(File::new(path_str, format))
        .build()
        .with_context(|| format!("failed to parse layer {}", path.display()))?
        .try_deserialize()
        .with_context(|| format!("failed to deserialize layer {}", path.display()))?;
    Ok(crate::ports::config_source::flatten_document(&value))
}

/// Spawn the task that re-scans the repository whenever the watcher fires.
/// Events are coalesced with a short settle delay; a failed re-scan keeps
/// the previous revision.
pub fn spawn_refresh_task(source: Arc<FileConfigSource>) -> Option<tokio::task::JoinHandle<()>> {
    let mut rx = source.watch()?;
    Some(tokio::spawn(async move {
        tracing::info!("config repository refresh task started");
        while rx.recv().await.is_some() {
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            while rx.try_recv().is_ok() {}
            if let Err(e) = source.rescan() {
                tracing::error!("config repository re-scan failed: {e:#}; keeping old revision");
            }
        }
        tracing::info!("config repository refresh task shutting down");
    }))
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn write(dir: &Path, name: &str, content: &str) {
        std::fs::write(dir.join(name), content).unwrap();
    }

    fn seeded_repo() -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        write(dir.path(), "application.yml", "a: 1\nb: 1\n");
        write(dir.path(), "application-dev.yml", "b: 2\n");
        write(dir.path(), "svc.yml", "c: 3\n");
        write(dir.path(), "svc-dev.yml", "c: 4\n");
        dir
    }

    #[tokio::test]
    async fn parses_layers_from_root_into_default_label() {
        let dir = seeded_repo();
        let source = FileConfigSource::new(dir.path(), "main").unwrap();

        let snapshot = source.snapshot("main").await.unwrap();
        assert_eq!(
            snapshot
                .fetch("application")
                .and_then(|l| l.get("a"))
                .map(String::as_str),
            Some("1")
        );
        assert_eq!(
            snapshot
                .fetch("svc-dev")
                .and_then(|l| l.get("c"))
                .map(String::as_str),
            Some("4")
        );
        assert!(snapshot.fetch("missing").is_none());
    }

    #[tokio::test]
    async fn subdirectories_become_labels() {
        let dir = seeded_repo();
        let label_dir = dir.path().join("feature-x");
        std::fs::create_dir(&label_dir).unwrap();
        write(&label_dir, "svc.yml", "c: 99\n");

        let source = FileConfigSource::new(dir.path(), "main").unwrap();
        let snapshot = source.snapshot("feature-x").await.unwrap();
        assert_eq!(
            snapshot
                .fetch("svc")
                .and_then(|l| l.get("c"))
                .map(String::as_str),
            Some("99")
        );
    }

    #[tokio::test]
    async fn unknown_label_is_an_error() {
        let dir = seeded_repo();
        let source = FileConfigSource::new(dir.path(), "main").unwrap();
        assert!(matches!(
            source.snapshot("nope").await,
            Err(ConfigError::UnknownLabel(_))
        ));
    }

    #[tokio::test]
    async fn rescan_bumps_revision_and_picks_up_changes() {
        let dir = seeded_repo();
        let source = FileConfigSource::new(dir.path(), "main").unwrap();
        assert_eq!(source.revision(), 1);

        write(dir.path(), "svc.yml", "c: 42\n");
        let revision = source.rescan().unwrap();
        assert_eq!(revision, 2);

        let snapshot = source.snapshot("main").await.unwrap();
        assert_eq!(snapshot.revision(), "2");
        assert_eq!(
            snapshot
                .fetch("svc")
                .and_then(|l| l.get("c"))
                .map(String::as_str),
            Some("42")
        );
    }

    #[tokio::test]
    async fn held_snapshot_is_isolated_from_rescans() {
        let dir = seeded_repo();
        let source = FileConfigSource::new(dir.path(), "main").unwrap();

        let before = source.snapshot("main").await.unwrap();
        write(dir.path(), "svc.yml", "c: 42\n");
        source.rescan().unwrap();

        // The earlier snapshot still reads the revision it started with.
        assert_eq!(
            before
                .fetch("svc")
                .and_then(|l| l.get("c"))
                .map(String::as_str),
            Some("3")
        );
    }

    #[tokio::test]
    async fn watcher_signals_changes_on_disk() {
        let dir = seeded_repo();
        let source = FileConfigSource::new(dir.path(), "main").unwrap();
        let mut rx = source.watch().expect("first watch() returns the receiver");
        assert!(source.watch().is_none());

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        write(dir.path(), "svc.yml", "c: 7\n");

        let signal = tokio::time::timeout(std::time::Duration::from_secs(2), rx.recv()).await;
        assert!(signal.is_ok(), "timed out waiting for repository change");
    }
}
