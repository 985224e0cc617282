//! The filesystem collaborator boundary.
//!
//! The engine performs no filesystem calls of its own: directory listings,
//! file contents and recursive directory walks arrive as ordinary products,
//! produced by rules that delegate to a [`FileSystem`] implementation.
//! [`OsFileSystem`] is the in-tree implementation, rooted at a build root
//! directory; all paths it speaks are repo-relative with `/` separators, and
//! the build root itself is the empty string.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::task;
use walkdir::WalkDir;

use crate::error::ResolveError;

/// The immediate file entries of one directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
  pub dir: String,
  /// Repo-relative paths of the plain files in the directory, sorted.
  pub files: Vec<String>,
}

/// The byte content of one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContent {
  pub path: String,
  pub content: Vec<u8>,
}

/// A recursive enumeration of directories, root inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubDirs {
  /// Repo-relative directory paths, sorted.
  pub dirs: Vec<String>,
}

/// Async filesystem access as the engine consumes it.
#[async_trait]
pub trait FileSystem: Send + Sync {
  /// List the plain files directly inside `dir`.
  async fn list_dir(&self, dir: &str) -> Result<Listing, ResolveError>;

  /// Read the contents of the named files, returned sorted by path.
  async fn read_files(&self, paths: &[String]) -> Result<Vec<FileContent>, ResolveError>;

  /// Enumerate `dir` and every directory below it, sorted.
  async fn walk_dirs(&self, dir: &str) -> Result<SubDirs, ResolveError>;
}

/// [`FileSystem`] backed by the OS, rooted at a build root directory.
#[derive(Debug, Clone)]
pub struct OsFileSystem {
  root: PathBuf,
}

impl OsFileSystem {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  fn absolute(&self, rel: &str) -> PathBuf {
    if rel.is_empty() {
      self.root.clone()
    } else {
      self.root.join(rel)
    }
  }
}

#[async_trait]
impl FileSystem for OsFileSystem {
  async fn list_dir(&self, dir: &str) -> Result<Listing, ResolveError> {
    let path = self.absolute(dir);
    let mut entries = tokio::fs::read_dir(&path)
      .await
      .map_err(|e| io_error(&path, e))?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|e| io_error(&path, e))? {
      let file_type = entry.file_type().await.map_err(|e| io_error(&path, e))?;
      if !file_type.is_file() {
        continue;
      }
      let name = entry.file_name().to_string_lossy().into_owned();
      files.push(join_rel(dir, &name));
    }
    files.sort();
    Ok(Listing {
      dir: dir.to_string(),
      files,
    })
  }

  async fn read_files(&self, paths: &[String]) -> Result<Vec<FileContent>, ResolveError> {
    let mut contents = Vec::with_capacity(paths.len());
    for path in paths {
      let absolute = self.absolute(path);
      let content = tokio::fs::read(&absolute)
        .await
        .map_err(|e| io_error(&absolute, e))?;
      contents.push(FileContent {
        path: path.clone(),
        content,
      });
    }
    contents.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(contents)
  }

  async fn walk_dirs(&self, dir: &str) -> Result<SubDirs, ResolveError> {
    let root = self.absolute(dir);
    let prefix = dir.to_string();
    let base = self.root.clone();
    task::spawn_blocking(move || {
      let mut dirs = Vec::new();
      let walk = WalkDir::new(&root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.file_name()));
      for entry in walk {
        let entry = entry.map_err(|e| ResolveError::Io {
          path: prefix.clone(),
          detail: e.to_string(),
        })?;
        if !entry.file_type().is_dir() {
          continue;
        }
        dirs.push(relative_to(&base, entry.path()));
      }
      dirs.sort();
      Ok(SubDirs { dirs })
    })
    .await
    .map_err(|e| ResolveError::Internal(format!("walk task failed: {e}")))?
  }
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
  name.to_string_lossy().starts_with('.')
}

fn io_error(path: &Path, err: std::io::Error) -> ResolveError {
  ResolveError::Io {
    path: path.to_string_lossy().into_owned(),
    detail: err.to_string(),
  }
}

fn join_rel(dir: &str, name: &str) -> String {
  if dir.is_empty() {
    name.to_string()
  } else {
    format!("{dir}/{name}")
  }
}

/// A path under `base`, expressed repo-relative with `/` separators.
fn relative_to(base: &Path, path: &Path) -> String {
  let rel = path.strip_prefix(base).unwrap_or(path);
  rel
    .components()
    .map(|c| c.as_os_str().to_string_lossy())
    .collect::<Vec<_>>()
    .join("/")
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  fn scratch() -> (TempDir, OsFileSystem) {
    let temp = TempDir::new().unwrap();
    let fs = OsFileSystem::new(temp.path());
    (temp, fs)
  }

  #[tokio::test]
  async fn list_dir_returns_sorted_files_only() {
    let (temp, fs) = scratch();
    std::fs::create_dir(temp.path().join("sub")).unwrap();
    std::fs::write(temp.path().join("b.txt"), b"b").unwrap();
    std::fs::write(temp.path().join("a.txt"), b"a").unwrap();

    let listing = fs.list_dir("").await.unwrap();
    assert_eq!(listing.files, vec!["a.txt", "b.txt"]);
  }

  #[tokio::test]
  async fn list_dir_missing_directory_is_io_error() {
    let (_temp, fs) = scratch();
    let err = fs.list_dir("nope").await.unwrap_err();
    assert!(matches!(err, ResolveError::Io { .. }));
  }

  #[tokio::test]
  async fn read_files_returns_sorted_contents() {
    let (temp, fs) = scratch();
    std::fs::write(temp.path().join("one"), b"1").unwrap();
    std::fs::write(temp.path().join("two"), b"2").unwrap();

    let contents = fs
      .read_files(&["two".to_string(), "one".to_string()])
      .await
      .unwrap();
    assert_eq!(contents[0].path, "one");
    assert_eq!(contents[0].content, b"1");
    assert_eq!(contents[1].path, "two");
  }

  #[tokio::test]
  async fn walk_dirs_is_root_inclusive_and_skips_hidden() {
    let (temp, fs) = scratch();
    std::fs::create_dir_all(temp.path().join("a/b")).unwrap();
    std::fs::create_dir_all(temp.path().join(".git/objects")).unwrap();

    let subdirs = fs.walk_dirs("").await.unwrap();
    assert_eq!(subdirs.dirs, vec!["".to_string(), "a".to_string(), "a/b".to_string()]);
  }
}
