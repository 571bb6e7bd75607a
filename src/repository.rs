use chrono::{Datelike, Local};
use serde::Serialize;
use std::fmt;
use std::fs::FileType;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs;
use tracing::{debug, warn};

use crate::atomic::{StagedFile, is_staged_name};
use crate::path_safety::{is_allowed_extension, sanitize_filename, split_extension};

/// 静态服务器暴露上传根目录的公开 URL 前缀。
pub const URL_PREFIX: &str = "/assets/upload/";
const MAX_NAME_ATTEMPTS: u32 = 10_000;
const FALLBACK_BASE: &str = "file";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ImageRecord {
    pub path: String,
    pub url: String,
    pub name: String,
    pub folder: String,
}

impl ImageRecord {
    fn new(folder: &str, name: &str) -> Self {
        let path = if folder.is_empty() {
            name.to_string()
        } else {
            format!("{folder}/{name}")
        };
        Self {
            url: format!("{URL_PREFIX}{path}"),
            path,
            name: name.to_string(),
            folder: folder.to_string(),
        }
    }
}

/// 作为上传分桶目录名的两位月份。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MonthFolder(u32);

impl MonthFolder {
    pub fn current() -> Self {
        Self(Local::now().month())
    }

    #[cfg(test)]
    pub fn new(month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self(month))
    }

    pub fn name(self) -> String {
        format!("{:02}", self.0)
    }
}

/// 上传根目录下一级条目的类别。
enum RootEntry {
    MonthBucket,
    LooseFile,
    Ignored,
}

impl RootEntry {
    fn classify(name: &str, file_type: FileType) -> Self {
        if name.starts_with('.') {
            RootEntry::Ignored
        } else if file_type.is_dir() && is_bucket_name(name) {
            RootEntry::MonthBucket
        } else if file_type.is_file() {
            RootEntry::LooseFile
        } else {
            RootEntry::Ignored
        }
    }
}

fn is_bucket_name(name: &str) -> bool {
    name.len() == 2 && name.bytes().all(|b| b.is_ascii_digit())
}

fn is_listed_file(name: &str, file_type: FileType) -> bool {
    file_type.is_file() && !name.starts_with('.') && is_allowed_extension(name)
}

#[derive(Clone, Debug)]
pub struct ImageRepository {
    root: PathBuf,
    pinned_month: Option<MonthFolder>,
}

impl ImageRepository {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            pinned_month: None,
        }
    }

    #[cfg(test)]
    pub fn with_month(mut self, month: MonthFolder) -> Self {
        self.pinned_month = Some(month);
        self
    }

    pub async fn ensure_root(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root).await
    }

    pub fn root_path(&self) -> &Path {
        &self.root
    }

    /// 列出月份目录与根目录散放的图片，按 `path` 排序。
    pub async fn list(&self) -> Result<Vec<ImageRecord>, RepositoryError> {
        let mut records = Vec::new();
        let mut dir = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(records),
            Err(err) => return Err(RepositoryError::Io(err)),
        };

        while let Some(entry) = dir.next_entry().await? {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            let file_type = entry.file_type().await?;
            match RootEntry::classify(&name, file_type) {
                RootEntry::MonthBucket => self.list_bucket(&name, &mut records).await?,
                RootEntry::LooseFile if is_allowed_extension(&name) => {
                    records.push(ImageRecord::new("", &name));
                }
                RootEntry::LooseFile | RootEntry::Ignored => {}
            }
        }

        records.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(records)
    }

    async fn list_bucket(
        &self,
        folder: &str,
        records: &mut Vec<ImageRecord>,
    ) -> Result<(), RepositoryError> {
        let mut dir = match fs::read_dir(self.root.join(folder)).await {
            Ok(dir) => dir,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(RepositoryError::Io(err)),
        };
        while let Some(entry) = dir.next_entry().await? {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if is_listed_file(&name, entry.file_type().await?) {
                records.push(ImageRecord::new(folder, &name));
            }
        }
        Ok(())
    }

    /// 将内容存入当月目录，依次尝试 `base.ext`、`base-1.ext`、`base-2.ext` 等空闲名称。
    pub async fn store(&self, filename: &str, bytes: &[u8]) -> Result<ImageRecord, RepositoryError> {
        let basename = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
        if !is_allowed_extension(basename) {
            return Err(RepositoryError::ExtensionNotAllowed);
        }
        let (base, ext) = split_extension(basename);
        let base = sanitize_filename(base);
        let base = match base.trim_start_matches('.') {
            "" => FALLBACK_BASE,
            trimmed => trimmed,
        };

        let folder = self.pinned_month.unwrap_or_else(MonthFolder::current).name();
        let dir = self.root.join(&folder);
        fs::create_dir_all(&dir).await?;
        self.ensure_no_symlink_components(&dir).await?;

        let staged = StagedFile::write(&dir, bytes).await?;
        let published = publish_first_free(&staged, &dir, base, ext).await;
        staged.cleanup().await;
        let name = published?;

        Ok(ImageRecord::new(&folder, &name))
    }

    /// 在原目录内重命名文件。
    pub async fn rename(
        &self,
        relative: &str,
        new_name: &str,
    ) -> Result<ImageRecord, RepositoryError> {
        let relative = normalize(relative)?;
        let new_name = sanitize_filename(new_name);
        let (_, ext) = split_extension(&new_name);
        if ext.is_empty() || new_name.starts_with('.') {
            return Err(RepositoryError::InvalidName);
        }
        if !is_allowed_extension(&new_name) {
            return Err(RepositoryError::ExtensionNotAllowed);
        }

        let source = self.root.join(&relative);
        self.ensure_no_symlink_components(&source).await?;
        let metadata = fs::symlink_metadata(&source).await?;
        if !metadata.is_file() {
            return Err(RepositoryError::NotAFile);
        }

        let parent = relative.parent().unwrap_or_else(|| Path::new(""));
        let target_relative = parent.join(&new_name);
        let target = self.root.join(&target_relative);
        if target != source {
            match fs::symlink_metadata(&target).await {
                Ok(_) => return Err(RepositoryError::TargetExists),
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(RepositoryError::Io(err)),
            }
        }
        fs::rename(&source, &target).await?;

        Ok(ImageRecord::new(&to_slash(parent), &new_name))
    }

    /// 删除单个文件。
    pub async fn delete(&self, relative: &str) -> Result<(), RepositoryError> {
        let target = self.root.join(normalize(relative)?);
        self.ensure_no_symlink_components(&target).await?;
        let metadata = fs::symlink_metadata(&target).await?;
        if !metadata.is_file() {
            return Err(RepositoryError::NotAFile);
        }
        fs::remove_file(&target).await?;
        Ok(())
    }

    /// 路径是否指向可公开访问的文件：不含隐藏段，沿途无符号链接。
    pub async fn is_public_asset(&self, relative: &str) -> bool {
        let Ok(relative) = normalize(relative) else {
            return false;
        };
        let hidden = relative
            .components()
            .any(|component| component.as_os_str().to_string_lossy().starts_with('.'));
        if hidden {
            return false;
        }
        let target = self.root.join(&relative);
        if self.ensure_no_symlink_components(&target).await.is_err() {
            return false;
        }
        fs::symlink_metadata(&target)
            .await
            .is_ok_and(|metadata| metadata.is_file())
    }

    /// 删除月份目录中超过 `ttl` 的暂存文件，返回删除数量。
    pub async fn sweep_staged(&self, ttl: Duration) -> io::Result<usize> {
        let mut removed = 0;
        let mut root = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(err),
        };
        let now = SystemTime::now();

        while let Some(bucket) = root.next_entry().await? {
            let Ok(folder) = bucket.file_name().into_string() else {
                continue;
            };
            if !matches!(
                RootEntry::classify(&folder, bucket.file_type().await?),
                RootEntry::MonthBucket
            ) {
                continue;
            }
            let mut dir = fs::read_dir(bucket.path()).await?;
            while let Some(entry) = dir.next_entry().await? {
                if !is_staged_name(&entry.file_name().to_string_lossy()) {
                    continue;
                }
                let Ok(modified) = entry.metadata().await.and_then(|m| m.modified()) else {
                    continue;
                };
                let Ok(age) = now.duration_since(modified) else {
                    continue;
                };
                if age < ttl {
                    continue;
                }
                let path = entry.path();
                match fs::remove_file(&path).await {
                    Ok(()) => {
                        debug!(path = ?path, "removed stale staged upload");
                        removed += 1;
                    }
                    Err(err) => warn!(path = ?path, error = %err, "failed to remove staged upload"),
                }
            }
        }

        Ok(removed)
    }

    async fn ensure_no_symlink_components(&self, target: &Path) -> Result<(), RepositoryError> {
        let relative = target
            .strip_prefix(&self.root)
            .map_err(|_| RepositoryError::InvalidPath)?;
        let mut current = PathBuf::from(&self.root);
        let mut components = relative.components().peekable();

        while let Some(component) = components.next() {
            current.push(component.as_os_str());
            let metadata = fs::symlink_metadata(&current).await?;
            if metadata.file_type().is_symlink() {
                return Err(RepositoryError::InvalidPath);
            }
            if components.peek().is_some() && !metadata.is_dir() {
                return Err(RepositoryError::InvalidPath);
            }
        }

        Ok(())
    }
}

async fn publish_first_free(
    staged: &StagedFile,
    dir: &Path,
    base: &str,
    ext: &str,
) -> Result<String, RepositoryError> {
    for suffix in 0..MAX_NAME_ATTEMPTS {
        let name = if suffix == 0 {
            format!("{base}.{ext}")
        } else {
            format!("{base}-{suffix}.{ext}")
        };
        if staged.publish_new(&dir.join(&name)).await? {
            return Ok(name);
        }
    }
    Err(RepositoryError::Io(io::Error::other("no free file name")))
}

/// 将解码后的路径参数规范化为相对上传根目录的路径。
fn normalize(relative: &str) -> Result<PathBuf, RepositoryError> {
    let trimmed = relative.trim_start_matches(['/', '\\']);
    let mut normalized = PathBuf::new();
    for component in Path::new(trimmed).components() {
        match component {
            Component::Normal(segment) => normalized.push(segment),
            Component::CurDir => continue,
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(RepositoryError::InvalidPath);
            }
        }
    }
    if normalized.as_os_str().is_empty() {
        return Err(RepositoryError::MissingPath);
    }
    Ok(normalized)
}

fn to_slash(path: &Path) -> String {
    path.components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[derive(Debug)]
pub enum RepositoryError {
    MissingPath,
    InvalidPath,
    InvalidName,
    ExtensionNotAllowed,
    NotFound,
    NotAFile,
    TargetExists,
    Io(io::Error),
}

impl fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepositoryError::MissingPath => f.write_str("Missing path"),
            RepositoryError::InvalidPath => f.write_str("Invalid path"),
            RepositoryError::InvalidName => f.write_str("Invalid newName"),
            RepositoryError::ExtensionNotAllowed => f.write_str("Extension not allowed"),
            RepositoryError::NotFound => f.write_str("Not found"),
            RepositoryError::NotAFile => f.write_str("Not a file"),
            RepositoryError::TargetExists => f.write_str("Target name already exists"),
            RepositoryError::Io(err) => write!(f, "io error: {err}"),
        }
    }
}

impl From<io::Error> for RepositoryError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => RepositoryError::NotFound,
            _ => RepositoryError::Io(err),
        }
    }
}
