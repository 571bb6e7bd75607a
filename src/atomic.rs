//! 暂存写入与独占发布：上传内容先写入隐藏临时文件，再以硬链接占用目标名。

use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

pub const STAGED_PREFIX: &str = ".staged-";
pub const STAGED_SUFFIX: &str = ".tmp";

/// 判断文件名是否为月份目录中的暂存上传文件。
pub fn is_staged_name(name: &str) -> bool {
    name.starts_with(STAGED_PREFIX) && name.ends_with(STAGED_SUFFIX)
}

/// 已完整写入并同步的临时文件。
pub struct StagedFile {
    path: PathBuf,
}

impl StagedFile {
    /// 在 `dir` 中写入 `bytes` 并落盘。
    pub async fn write(dir: &Path, bytes: &[u8]) -> io::Result<Self> {
        let path = dir.join(format!("{STAGED_PREFIX}{}{STAGED_SUFFIX}", Uuid::new_v4()));
        let staged = Self { path };
        if let Err(err) = staged.fill(bytes).await {
            staged.cleanup().await;
            return Err(err);
        }
        Ok(staged)
    }

    async fn fill(&self, bytes: &[u8]) -> io::Result<()> {
        let mut file = File::create(&self.path).await?;
        file.write_all(bytes).await?;
        file.sync_all().await
    }

    /// 仅当 `target` 不存在时以硬链接发布暂存内容。
    ///
    /// 目标名已被占用时返回 `Ok(false)`，暂存文件保留供调用方尝试下一个名称。
    pub async fn publish_new(&self, target: &Path) -> io::Result<bool> {
        match fs::hard_link(&self.path, target).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// 删除临时文件。
    pub async fn cleanup(self) {
        let _ = fs::remove_file(&self.path).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn publish_never_replaces_existing_file() {
        let temp = tempdir().expect("tempdir");
        let target = temp.path().join("taken.png");
        std::fs::write(&target, b"original").expect("write target");

        let staged = StagedFile::write(temp.path(), b"new").await.expect("stage");
        assert!(!staged.publish_new(&target).await.expect("publish"));
        assert_eq!(std::fs::read(&target).expect("read"), b"original");

        let free = temp.path().join("free.png");
        assert!(staged.publish_new(&free).await.expect("publish"));
        staged.cleanup().await;
        assert_eq!(std::fs::read(&free).expect("read"), b"new");

        let leftovers: Vec<_> = std::fs::read_dir(temp.path())
            .expect("read dir")
            .filter_map(|entry| entry.ok())
            .filter(|entry| is_staged_name(&entry.file_name().to_string_lossy()))
            .collect();
        assert!(leftovers.is_empty());
    }
}
