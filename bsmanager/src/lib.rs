pub mod core;
pub mod error;
pub mod install;
pub mod library;
pub mod logger;
pub mod manifest;
pub mod models;

use anyhow::Context;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::config::{self, AppConfig};
use crate::core::path_utils::resolve_direct_child;
use crate::error::{ApiError, ApiResult, ToHostError};
use crate::install::extraction::extract_archive;
use crate::install::{
    BatchOptions, BatchScheduler, Fetcher, HttpFetcher, InstallWorker, LogProgressSink,
    ProgressSink,
};
use crate::library::MetadataCache;
use crate::models::{BatchSummary, LibraryEntry};

/// What a single downloaded file turned into
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DownloadHandled {
    Playlist(BatchSummary),
    #[serde(rename_all = "camelCase")]
    Map {
        folder_name: String,
    },
    Ignored,
}

/// Shared state behind the host operations
pub struct AppState {
    library_root: PathBuf,
    cache: Arc<MetadataCache>,
    scheduler: BatchScheduler,
    sink: Arc<dyn ProgressSink>,
}

impl AppState {
    pub fn new(
        library_root: PathBuf,
        fetcher: Arc<dyn Fetcher>,
        sink: Arc<dyn ProgressSink>,
        cdn_base: impl Into<String>,
    ) -> Self {
        let cache = Arc::new(MetadataCache::new());
        let worker = InstallWorker::new(fetcher, Arc::clone(&cache), cdn_base);
        Self {
            library_root,
            cache,
            scheduler: BatchScheduler::new(Arc::new(worker)),
            sink,
        }
    }

    /// Build the state for the configured game folder
    pub fn from_config(config: &AppConfig, sink: Arc<dyn ProgressSink>) -> ApiResult<Self> {
        let library_root = config.library_root()?.ok_or_else(|| {
            ApiError::not_configured("Beat Saber folder is not configured or missing")
        })?;
        let fetcher = HttpFetcher::new()?;
        Ok(Self::new(
            library_root,
            Arc::new(fetcher),
            sink,
            config::cdn_base(),
        ))
    }

    pub fn library_root(&self) -> &Path {
        &self.library_root
    }

    pub fn cache(&self) -> &Arc<MetadataCache> {
        &self.cache
    }

    /// Install every map named by a playlist file
    pub async fn run_batch(&self, manifest_path: &Path) -> ApiResult<BatchSummary> {
        self.run_batch_with(manifest_path, BatchOptions::default())
            .await
    }

    async fn run_batch_with(
        &self,
        manifest_path: &Path,
        options: BatchOptions,
    ) -> ApiResult<BatchSummary> {
        let manifest = manifest::read_manifest(manifest_path)?;
        fs::create_dir_all(&self.library_root)?;
        Ok(self
            .scheduler
            .run_batch(&manifest, &self.library_root, Arc::clone(&self.sink), options)
            .await)
    }

    pub async fn list_library(&self) -> ApiResult<Vec<LibraryEntry>> {
        let root = self.library_root.clone();
        let cache = Arc::clone(&self.cache);
        tokio::task::spawn_blocking(move || library::list_library(&root, &cache))
            .await
            .map_err(|e| ApiError::internal(format!("Task join error: {}", e)))?
            .map_err(ApiError::from)
    }

    pub fn delete_entry(&self, folder_name: &str) -> ApiResult<()> {
        library::delete_entry(&self.library_root, folder_name, &self.cache)?;
        Ok(())
    }

    /// Cover art of one installed map as a `data:` URL
    pub fn cover_image(&self, folder_name: &str) -> ApiResult<Option<String>> {
        Ok(library::load_cover_image(
            &self.library_root,
            folder_name,
            &self.cache,
        )?)
    }

    /// Route a file the browsing surface downloaded
    ///
    /// Playlists run as a batch with the indicator left visible and are
    /// deleted afterwards. Map archives are extracted into a folder named
    /// after the archive and deleted on success. Anything else is ignored.
    pub async fn handle_downloaded_file(&self, path: &Path) -> ApiResult<DownloadHandled> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        match extension.as_deref() {
            Some("bplist") => {
                let summary = self
                    .run_batch_with(
                        path,
                        BatchOptions {
                            keep_progress_visible: true,
                        },
                    )
                    .await;
                if let Err(e) = fs::remove_file(path) {
                    logger::log_debug(
                        &format!("Failed to remove playlist {}: {}", path.display(), e),
                        Some("download"),
                    );
                }
                Ok(DownloadHandled::Playlist(summary?))
            }
            Some("zip") => {
                let folder_name = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .ok_or_else(|| ApiError::validation("Archive name is not valid UTF-8"))?
                    .to_string();
                let target = resolve_direct_child(&self.library_root, &folder_name)?;
                tokio::fs::create_dir_all(&target).await?;

                extract_archive(path, &target).await?;
                self.cache.invalidate_folder(&target);

                if let Err(e) = fs::remove_file(path) {
                    logger::log_debug(
                        &format!("Failed to remove archive {}: {}", path.display(), e),
                        Some("download"),
                    );
                }
                logger::log_info(
                    &format!("Installed downloaded map {}", folder_name),
                    Some("download"),
                );
                Ok(DownloadHandled::Map { folder_name })
            }
            _ => {
                logger::log_debug(
                    &format!("Ignoring download {}", path.display()),
                    Some("download"),
                );
                Ok(DownloadHandled::Ignored)
            }
        }
    }
}

/// Command-line entry: `bsmanager [--root <game folder>] [files...]`
pub fn run() -> anyhow::Result<()> {
    let _log_guard = logger::init()?;
    logger::log_info(
        &format!("bsmanager {} started", env!("CARGO_PKG_VERSION")),
        Some("app"),
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    runtime.block_on(run_cli(args))
}

async fn run_cli(args: Vec<String>) -> anyhow::Result<()> {
    let mut config = AppConfig::load();
    let mut files: Vec<PathBuf> = Vec::new();

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        if arg == "--root" {
            let root = iter.next().context("--root needs a folder")?;
            config.beat_saber_root = Some(PathBuf::from(root));
            config.save()?;
            logger::log_info("Saved Beat Saber folder", Some("config"));
        } else {
            files.push(PathBuf::from(arg));
        }
    }

    let state = AppState::from_config(&config, Arc::new(LogProgressSink))
        .to_host_error()
        .map_err(anyhow::Error::msg)?;

    if files.is_empty() {
        let entries = state.list_library().await?;
        logger::log_info(
            &format!(
                "{} maps installed in {}",
                entries.len(),
                state.library_root().display()
            ),
            Some("library"),
        );
        for entry in entries {
            logger::log_info(
                &format!(
                    "{} | {} | {} [{}]",
                    entry.title,
                    entry.artist,
                    entry.level_author,
                    entry.difficulties.join(", ")
                ),
                Some("library"),
            );
        }
        return Ok(());
    }

    for file in files {
        match state.handle_downloaded_file(&file).await {
            Ok(DownloadHandled::Playlist(summary)) => {
                for failed in &summary.failed {
                    logger::log_error(
                        &format!(
                            "{} ({}): [{}] {}",
                            failed.id,
                            failed.key.as_deref().unwrap_or("-"),
                            failed.code,
                            failed.cause
                        ),
                        Some("installer"),
                    );
                }
            }
            Ok(DownloadHandled::Map { .. }) => {}
            Ok(DownloadHandled::Ignored) => logger::log_info(
                &format!("Nothing to do for {}", file.display()),
                Some("app"),
            ),
            Err(e) => logger::log_error(
                &format!("Failed to process {}: {}", file.display(), e),
                Some("app"),
            ),
        }
    }
    Ok(())
}
