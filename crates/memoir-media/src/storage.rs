use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{info, warn};
use uuid::Uuid;

/// URL prefix under which stored assets are served.
pub const PUBLIC_PREFIX: &str = "/uploads";

/// On-disk store for normalized photos plus a spool area for raw uploads.
///
/// Assets live flat at `{asset_dir}/{name}` and are write-once; raw parts are
/// spooled to `{spool_dir}/{uuid}` until the pipeline has consumed them.
pub struct AssetStore {
    asset_dir: PathBuf,
    spool_dir: PathBuf,
}

impl AssetStore {
    pub async fn new(asset_dir: PathBuf, spool_dir: PathBuf) -> io::Result<Self> {
        fs::create_dir_all(&asset_dir).await?;
        fs::create_dir_all(&spool_dir).await?;
        info!(
            "Asset directory: {}, spool directory: {}",
            asset_dir.display(),
            spool_dir.display()
        );
        Ok(Self {
            asset_dir,
            spool_dir,
        })
    }

    pub fn asset_dir(&self) -> &Path {
        &self.asset_dir
    }

    pub fn spool_dir(&self) -> &Path {
        &self.spool_dir
    }

    pub fn asset_path(&self, name: &str) -> PathBuf {
        self.asset_dir.join(name)
    }

    pub fn public_url(&self, name: &str) -> String {
        format!("{PUBLIC_PREFIX}/{name}")
    }

    /// Write raw upload bytes to a fresh spool file and return its path.
    pub async fn spool(&self, data: &[u8]) -> io::Result<PathBuf> {
        let (path, mut file) = self.open_spool().await?;
        write_or_remove(&path, &mut file, data).await?;
        Ok(path)
    }

    /// Open a fresh, empty spool file for an upload that arrives in chunks.
    pub async fn open_spool(&self) -> io::Result<(PathBuf, fs::File)> {
        let path = self.spool_dir.join(Uuid::new_v4().to_string());
        let file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        Ok((path, file))
    }

    /// Store a normalized asset under a newly generated name.
    /// Returns the name (not the full path).
    pub async fn put(&self, bytes: &[u8], extension: &str) -> io::Result<String> {
        let name = format!("{}.{}", Uuid::new_v4(), extension);
        let path = self.asset_path(&name);
        // create_new: assets are never overwritten
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        write_or_remove(&path, &mut file, bytes).await?;
        Ok(name)
    }

    pub async fn delete(&self, name: &str) -> io::Result<()> {
        remove_quietly(&self.asset_path(name)).await
    }
}

/// Write and flush `bytes` into the file at `path`; on failure the partial
/// file is removed before the error is returned.
async fn write_or_remove<W>(path: &Path, out: &mut W, bytes: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let written = async {
        out.write_all(bytes).await?;
        out.flush().await
    }
    .await;
    if written.is_err() {
        if let Err(e) = remove_quietly(path).await {
            warn!("Failed to remove partial file {}: {}", path.display(), e);
        }
    }
    written
}

/// Remove a file, treating "already gone" as success.
pub async fn remove_quietly(path: &Path) -> io::Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!("{} already gone", path.display());
            Ok(())
        }
        Err(e) => Err(e),
    }
}
