//! Directory listings for the file browser.
//!
//! A listing only shows subdirectories and markdown files, skips hidden
//! entries, and sorts directories before files (each group by lowercase
//! name). Directories are annotated with whether any markdown exists beneath
//! them; that search is bounded in depth and entry count and does not follow
//! symlinked directories.

use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::error::GuardError;
use crate::guard::{PathKind, SafePath, has_markdown_extension};

/// How many directory levels the markdown search descends.
const MARKDOWN_SEARCH_DEPTH: usize = 6;

/// How many entries the markdown search inspects per listed directory.
const MARKDOWN_SEARCH_BUDGET: usize = 5_000;

/// One row in a directory listing.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Entry {
    Directory {
        name: String,
        path: String,
        has_markdown: bool,
    },
    File {
        name: String,
        path: String,
        size: u64,
    },
}

impl Entry {
    /// The entry's file name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Directory { name, .. } | Self::File { name, .. } => name,
        }
    }

    fn sort_key(&self) -> (bool, String) {
        (matches!(self, Self::File { .. }), self.name().to_lowercase())
    }
}

/// The contents of one directory.
#[derive(Debug, Clone, Serialize)]
pub struct DirectoryListing {
    pub current_path: String,
    /// Absent when listing the root itself.
    pub parent: Option<String>,
    pub items: Vec<Entry>,
}

/// List a validated directory.
///
/// The work runs on the blocking pool because the markdown search touches
/// many inodes.
///
/// # Errors
///
/// - [`GuardError::UnsupportedType`] if `dir` was validated as a file.
/// - [`GuardError::PermissionDenied`] if the directory cannot be read.
/// - [`GuardError::Io`] for other read failures.
pub async fn list_directory(dir: &SafePath, root: &Path) -> Result<DirectoryListing, GuardError> {
    if dir.kind() != PathKind::Directory {
        return Err(GuardError::UnsupportedType {
            resolved: dir.resolved().to_path_buf(),
            expected: PathKind::Directory,
        });
    }

    let dir_path = dir.resolved().to_path_buf();
    let root = root.to_path_buf();
    let join_path = dir_path.clone();

    tokio::task::spawn_blocking(move || list_blocking(&dir_path, &root))
        .await
        .map_err(|e| GuardError::Io {
            path: join_path,
            source: io::Error::other(e),
        })?
}

fn list_blocking(dir: &Path, root: &Path) -> Result<DirectoryListing, GuardError> {
    let read = std::fs::read_dir(dir).map_err(|e| match e.kind() {
        io::ErrorKind::PermissionDenied => GuardError::PermissionDenied {
            path: dir.to_path_buf(),
        },
        _ => GuardError::Io {
            path: dir.to_path_buf(),
            source: e,
        },
    })?;

    let mut items = Vec::new();
    for entry in read.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }

        let path = entry.path();
        // Follows symlinks; dangling links are skipped.
        let Ok(meta) = std::fs::metadata(&path) else {
            continue;
        };

        if meta.is_dir() {
            // A linked directory outside the root is listed but never searched.
            let has_markdown = if escapes_root(&entry, root) {
                false
            } else {
                let mut budget = MARKDOWN_SEARCH_BUDGET;
                contains_markdown(&path, MARKDOWN_SEARCH_DEPTH, &mut budget)
            };
            items.push(Entry::Directory {
                name,
                path: path.display().to_string(),
                has_markdown,
            });
        } else if meta.is_file() && has_markdown_extension(&path) {
            items.push(Entry::File {
                name,
                path: path.display().to_string(),
                size: meta.len(),
            });
        }
    }

    items.sort_by_key(Entry::sort_key);

    let parent = if dir == root {
        None
    } else {
        dir.parent().map(|p| p.display().to_string())
    };

    debug!(dir = %dir.display(), count = items.len(), "directory listed");

    Ok(DirectoryListing {
        current_path: dir.display().to_string(),
        parent,
        items,
    })
}

/// Whether `entry` is a symlink whose target resolves outside `root`.
fn escapes_root(entry: &std::fs::DirEntry, root: &Path) -> bool {
    if !entry.file_type().is_ok_and(|t| t.is_symlink()) {
        return false;
    }
    !std::fs::canonicalize(entry.path()).is_ok_and(|target| target.starts_with(root))
}

/// Whether any `.md` file exists under `dir` within `depth` levels.
fn contains_markdown(dir: &Path, depth: usize, budget: &mut usize) -> bool {
    let Ok(read) = std::fs::read_dir(dir) else {
        return false;
    };

    let mut subdirs: Vec<PathBuf> = Vec::new();
    for entry in read.flatten() {
        if *budget == 0 {
            return false;
        }
        *budget -= 1;

        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        let path = entry.path();
        if file_type.is_dir() {
            subdirs.push(path);
        } else if has_markdown_extension(&path)
            && std::fs::metadata(&path).is_ok_and(|m| m.is_file())
        {
            return true;
        }
    }

    if depth == 0 {
        return false;
    }
    subdirs
        .iter()
        .any(|sub| contains_markdown(sub, depth - 1, budget))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::guard::{Guard, GuardConfig};
    use std::fs;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, Guard) {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("Docs/nested/deeper")).unwrap();
        fs::create_dir_all(root.join("empty")).unwrap();
        fs::create_dir_all(root.join(".hidden")).unwrap();
        fs::write(root.join("Docs/nested/deeper/note.md"), "# n").unwrap();
        fs::write(root.join("b.md"), "# b").unwrap();
        fs::write(root.join("A.md"), "# a").unwrap();
        fs::write(root.join("image.png"), [0u8; 4]).unwrap();
        fs::write(root.join(".secret.md"), "# s").unwrap();
        let guard = Guard::new(GuardConfig::new(root)).await.unwrap();
        (tmp, guard)
    }

    #[tokio::test]
    async fn lists_dirs_first_then_markdown_files() {
        let (_tmp, guard) = setup().await;
        let root = guard.root().to_str().unwrap().to_owned();
        let dir = guard.validate_path(&root, PathKind::Directory).await.unwrap();

        let listing = list_directory(&dir, guard.root()).await.unwrap();
        let names: Vec<&str> = listing.items.iter().map(Entry::name).collect();
        assert_eq!(names, vec!["Docs", "empty", "A.md", "b.md"]);
        assert_eq!(listing.parent, None);
    }

    #[tokio::test]
    async fn marks_directories_containing_markdown() {
        let (_tmp, guard) = setup().await;
        let root = guard.root().to_str().unwrap().to_owned();
        let dir = guard.validate_path(&root, PathKind::Directory).await.unwrap();

        let listing = list_directory(&dir, guard.root()).await.unwrap();
        let flags: Vec<(String, bool)> = listing
            .items
            .iter()
            .filter_map(|e| match e {
                Entry::Directory { name, has_markdown, .. } => Some((name.clone(), *has_markdown)),
                Entry::File { .. } => None,
            })
            .collect();
        assert_eq!(
            flags,
            vec![("Docs".to_owned(), true), ("empty".to_owned(), false)]
        );
    }

    #[tokio::test]
    async fn file_entries_carry_size() {
        let (_tmp, guard) = setup().await;
        let root = guard.root().to_str().unwrap().to_owned();
        let dir = guard.validate_path(&root, PathKind::Directory).await.unwrap();

        let listing = list_directory(&dir, guard.root()).await.unwrap();
        let size = listing.items.iter().find_map(|e| match e {
            Entry::File { name, size, .. } if name == "b.md" => Some(*size),
            _ => None,
        });
        assert_eq!(size, Some(3));
    }

    #[tokio::test]
    async fn subdirectory_reports_parent() {
        let (_tmp, guard) = setup().await;
        let dir = guard.validate_path("Docs", PathKind::Directory).await.unwrap();

        let listing = list_directory(&dir, guard.root()).await.unwrap();
        assert_eq!(
            listing.parent.as_deref(),
            Some(guard.root().to_str().unwrap())
        );
        assert_eq!(listing.items.len(), 1);
    }

    #[test]
    fn entries_serialize_with_type_tag() {
        let entry = Entry::File {
            name: "a.md".to_owned(),
            path: "/h/a.md".to_owned(),
            size: 1,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "file");
        assert_eq!(json["size"], 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn linked_directory_outside_root_is_not_searched() {
        let (tmp, guard) = setup().await;
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("private.md"), "# p").unwrap();
        std::os::unix::fs::symlink(outside.path(), tmp.path().join("elsewhere")).unwrap();
        std::os::unix::fs::symlink(tmp.path().join("Docs"), tmp.path().join("docs-link"))
            .unwrap();

        let root = guard.root().to_str().unwrap().to_owned();
        let dir = guard.validate_path(&root, PathKind::Directory).await.unwrap();
        let listing = list_directory(&dir, guard.root()).await.unwrap();

        let flag = |wanted: &str| {
            listing.items.iter().find_map(|e| match e {
                Entry::Directory { name, has_markdown, .. } if name == wanted => {
                    Some(*has_markdown)
                }
                _ => None,
            })
        };
        assert_eq!(flag("elsewhere"), Some(false));
        assert_eq!(flag("docs-link"), Some(true));
    }

    #[tokio::test]
    async fn file_path_cannot_be_listed() {
        let (_tmp, guard) = setup().await;
        let file = guard.validate_path("b.md", PathKind::File).await.unwrap();
        let err = list_directory(&file, guard.root()).await.unwrap_err();
        assert!(matches!(err, GuardError::UnsupportedType { .. }));
    }
}
