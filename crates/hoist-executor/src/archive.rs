//! Checkpoint image archiving.

use std::ffi::OsStr;
use std::path::Path;

use async_trait::async_trait;
use tracing::debug;

use crate::command::run_command;
use crate::error::ExecResult;

/// Packs a checkpoint directory into a single compressed file and back.
#[async_trait]
pub trait Archiver: Send + Sync {
    async fn pack(&self, src_dir: &Path, archive: &Path) -> ExecResult<()>;

    /// Unpack into `dest_dir`, which must already exist.
    async fn unpack(&self, archive: &Path, dest_dir: &Path) -> ExecResult<()>;
}

/// gzip'd tar through the `tar` binary. Paths inside the archive are
/// relative to the checkpoint directory.
#[derive(Debug, Clone)]
pub struct TarArchiver {
    bin: String,
}

impl TarArchiver {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }
}

impl Default for TarArchiver {
    fn default() -> Self {
        Self::new("tar")
    }
}

#[async_trait]
impl Archiver for TarArchiver {
    async fn pack(&self, src_dir: &Path, archive: &Path) -> ExecResult<()> {
        run_command(
            &self.bin,
            [
                OsStr::new("czf"),
                archive.as_os_str(),
                OsStr::new("-C"),
                src_dir.as_os_str(),
                OsStr::new("."),
            ],
        )
        .await?;
        debug!(src = %src_dir.display(), archive = %archive.display(), "checkpoint archived");
        Ok(())
    }

    async fn unpack(&self, archive: &Path, dest_dir: &Path) -> ExecResult<()> {
        run_command(
            &self.bin,
            [
                OsStr::new("xzf"),
                archive.as_os_str(),
                OsStr::new("-C"),
                dest_dir.as_os_str(),
            ],
        )
        .await?;
        debug!(archive = %archive.display(), dest = %dest_dir.display(), "checkpoint unpacked");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docker::CHECKPOINT_ID as CHECKPOINT_DIR;

    #[tokio::test]
    async fn tar_archive_restores_tree() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("image");
        std::fs::create_dir_all(src.join(CHECKPOINT_DIR)).unwrap();
        std::fs::write(src.join(CHECKPOINT_DIR).join("pages-1.img"), b"\x00\x01memory").unwrap();
        std::fs::write(src.join("config.json"), b"{}").unwrap();

        let archive = tmp.path().join("checkpoint.tar.gz");
        let tar = TarArchiver::default();
        tar.pack(&src, &archive).await.unwrap();

        let dest = tmp.path().join("restored");
        std::fs::create_dir_all(&dest).unwrap();
        tar.unpack(&archive, &dest).await.unwrap();

        assert_eq!(
            std::fs::read(dest.join(CHECKPOINT_DIR).join("pages-1.img")).unwrap(),
            b"\x00\x01memory"
        );
        assert!(dest.join("config.json").exists());
    }

    #[tokio::test]
    async fn unpack_of_missing_archive_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let err = TarArchiver::default()
            .unpack(&tmp.path().join("absent.tar.gz"), tmp.path())
            .await
            .unwrap_err();
        assert!(!err.is_transient());
    }
}
