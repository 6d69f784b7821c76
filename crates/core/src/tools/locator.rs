//! Tool discovery and fetch.

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use super::types::{ToolKind, ToolsConfig};
use super::ToolError;

/// Locates the external binaries, fetching missing ones when allowed.
///
/// Resolution order: configured override, process-lifetime cache, PATH,
/// managed tools directory, download. Fetches are serialized per tool so
/// concurrent startup requests share one download.
pub struct ToolLocator {
    config: ToolsConfig,
    cache: RwLock<HashMap<ToolKind, PathBuf>>,
    fetch_locks: HashMap<ToolKind, Mutex<()>>,
    http: reqwest::Client,
}

impl ToolLocator {
    pub fn new(config: ToolsConfig) -> Self {
        let fetch_locks = ToolKind::ALL
            .into_iter()
            .map(|kind| (kind, Mutex::new(())))
            .collect();
        Self {
            config,
            cache: RwLock::new(HashMap::new()),
            fetch_locks,
            http: reqwest::Client::new(),
        }
    }

    /// Resolve the absolute path of a tool, fetching it if necessary.
    pub async fn locate(&self, kind: ToolKind) -> Result<PathBuf, ToolError> {
        if let Some(path) = self.cache.read().await.get(&kind) {
            return Ok(path.clone());
        }

        if let Some(override_path) = self.config.override_path(kind) {
            if override_path.is_file() {
                return Ok(self.remember(kind, override_path.clone()).await);
            }
            return Err(ToolError::MissingDependency {
                tool: kind,
                hint: format!(
                    "configured path {} does not exist",
                    override_path.display()
                ),
            });
        }

        if let Some(path) = find_in_path(kind.binary_name()) {
            return Ok(self.remember(kind, path).await);
        }

        let managed = self.managed_path(kind);
        if managed.is_file() {
            return Ok(self.remember(kind, managed).await);
        }

        if !self.config.allow_fetch {
            return Err(ToolError::MissingDependency {
                tool: kind,
                hint: "not on PATH and automatic fetch is disabled; install it or set tools.allow_fetch = true".to_string(),
            });
        }

        let path = self.fetch(kind).await?;
        Ok(self.remember(kind, path).await)
    }

    /// Resolve every tool up front. Called once at startup by the binaries.
    pub async fn ensure_all(&self) -> Result<(), ToolError> {
        for kind in ToolKind::ALL {
            let path = self.locate(kind).await?;
            info!(tool = %kind, path = %path.display(), "tool located");
        }
        Ok(())
    }

    async fn remember(&self, kind: ToolKind, path: PathBuf) -> PathBuf {
        self.cache.write().await.insert(kind, path.clone());
        path
    }

    fn managed_path(&self, kind: ToolKind) -> PathBuf {
        self.config.dir.join(kind.binary_name())
    }

    /// Download a tool into the managed directory. Serialized per tool; the
    /// winner installs, the rest find the finished binary on re-check.
    async fn fetch(&self, kind: ToolKind) -> Result<PathBuf, ToolError> {
        let _guard = self
            .fetch_locks
            .get(&kind)
            .expect("every kind has a lock")
            .lock()
            .await;

        let target = self.managed_path(kind);
        if target.is_file() {
            return Ok(target);
        }

        let url = self
            .config
            .fetch_url(kind)
            .ok_or_else(|| ToolError::MissingDependency {
                tool: kind,
                hint: "not on PATH and no fetch URL is known for this platform; install it or configure tools.*_url".to_string(),
            })?;

        info!(tool = %kind, %url, "fetching missing tool");
        tokio::fs::create_dir_all(&self.config.dir).await?;

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ToolError::FetchFailed {
                tool: kind,
                reason: e.to_string(),
            })?;

        let payload = response
            .bytes()
            .await
            .map_err(|e| ToolError::FetchFailed {
                tool: kind,
                reason: e.to_string(),
            })?;

        // Install via a temp name so a crashed fetch never leaves a partial
        // binary at the final path.
        let staging = target.with_extension("part");
        if url.ends_with(".zip") {
            extract_binary_from_zip(&payload, kind.binary_name(), &staging).map_err(|reason| {
                ToolError::FetchFailed { tool: kind, reason }
            })?;
        } else {
            tokio::fs::write(&staging, &payload).await?;
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = tokio::fs::metadata(&staging).await?.permissions();
            perms.set_mode(0o755);
            tokio::fs::set_permissions(&staging, perms).await?;
        }

        tokio::fs::rename(&staging, &target).await?;
        info!(tool = %kind, path = %target.display(), "tool installed");
        Ok(target)
    }
}

/// Find an executable on PATH.
fn find_in_path(binary: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join(binary);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

/// Pull one named binary out of a zip archive.
fn extract_binary_from_zip(
    payload: &[u8],
    binary_name: &str,
    target: &Path,
) -> Result<(), String> {
    let reader = std::io::Cursor::new(payload);
    let mut archive = zip::ZipArchive::new(reader).map_err(|e| e.to_string())?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| e.to_string())?;
        let matches = Path::new(entry.name())
            .file_name()
            .map(|n| n == binary_name)
            .unwrap_or(false);
        if !matches {
            continue;
        }
        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut bytes).map_err(|e| e.to_string())?;
        std::fs::write(target, bytes).map_err(|e| e.to_string())?;
        return Ok(());
    }

    warn!(binary = binary_name, "archive did not contain the binary");
    Err(format!("{binary_name} not found in archive"))
}
