use crate::collaborators::{ItemSource, PathSink, PeerDirectory};
use crate::error::{DiscoveryError, Result};
use async_trait::async_trait;
use serendipity_protocol::{AccountId, Item, ResolvedPath};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

const ACCOUNT_FILE_EXT: &str = "json";

/// Accounts stored as `<dir>/<account>.json`, each a JSON array of items.
#[derive(Debug, Clone)]
pub struct DirectoryItemSource {
    dir: PathBuf,
}

impl DirectoryItemSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn account_path(&self, account: &AccountId) -> PathBuf {
        self.dir.join(format!("{}.{ACCOUNT_FILE_EXT}", account.as_str()))
    }

    /// Every account with a data file, sorted.
    pub async fn accounts(&self) -> Result<Vec<AccountId>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut accounts = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ACCOUNT_FILE_EXT) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                accounts.push(AccountId::from(stem));
            }
        }
        accounts.sort();
        Ok(accounts)
    }
}

#[async_trait]
impl ItemSource for DirectoryItemSource {
    async fn load_items(&self, account: &AccountId) -> Result<Vec<Item>> {
        let path = self.account_path(account);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No data file for {account} at {}", path.display());
                return Ok(Vec::new());
            }
            Err(e) => return Err(DiscoveryError::source_failed(account, e.to_string())),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        serde_json::from_slice(&bytes).map_err(|e| {
            DiscoveryError::source_failed(account, format!("{}: {e}", path.display()))
        })
    }
}

/// Peers are the other accounts of the same directory.
#[derive(Debug, Clone)]
pub struct DirectoryPeers {
    source: DirectoryItemSource,
}

impl DirectoryPeers {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            source: DirectoryItemSource::new(dir),
        }
    }
}

#[async_trait]
impl PeerDirectory for DirectoryPeers {
    async fn peers_of(&self, account: &AccountId) -> Result<Vec<AccountId>> {
        Ok(self
            .source
            .accounts()
            .await?
            .into_iter()
            .filter(|peer| peer != account)
            .collect())
    }
}

/// Appends resolved paths to a JSON Lines file.
#[derive(Debug)]
pub struct JsonlPathSink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlPathSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl PathSink for JsonlPathSink {
    async fn persist(&self, paths: &[ResolvedPath]) -> Result<()> {
        let mut buf = Vec::new();
        for path in paths {
            serde_json::to_writer(&mut buf, path)?;
            buf.push(b'\n');
        }

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| DiscoveryError::Sink(format!("{}: {e}", self.path.display())))?;
        file.write_all(&buf)
            .await
            .map_err(|e| DiscoveryError::Sink(format!("{}: {e}", self.path.display())))?;
        file.flush().await?;
        log::debug!("Persisted {} paths to {}", paths.len(), self.path.display());
        Ok(())
    }
}
