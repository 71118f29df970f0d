//! CSS theme catalogue.
//!
//! Themes are plain `*.css` files in one directory. A theme may start with a
//! header comment whose first line is the display name and whose remaining
//! lines form the description:
//!
//! ```css
//! /*
//! Solarized Light
//! Low-contrast warm palette
//! */
//! ```

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ThemeError;

/// URL prefix the server mounts the themes directory under.
pub const THEME_URL_PREFIX: &str = "/static/css/themes";

/// Largest CSS body accepted by [`ThemeStore::save`].
pub const MAX_THEME_CSS_BYTES: usize = 1024 * 1024;

/// A theme available to the browser.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Theme {
    pub id: String,
    pub name: String,
    pub description: String,
    pub file: String,
}

/// A theme submitted for saving.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SaveTheme {
    #[serde(default)]
    pub id: String,
    pub name: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub css: String,
}

/// Reads and writes theme files in one directory.
#[derive(Debug, Clone)]
pub struct ThemeStore {
    dir: PathBuf,
}

impl ThemeStore {
    /// Create a store over `dir`. The directory need not exist yet.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The themes directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// List all themes, sorted by file name. A missing directory yields an
    /// empty list.
    ///
    /// # Errors
    ///
    /// Returns [`ThemeError::Io`] if the directory or a theme file cannot be
    /// read.
    pub async fn list(&self) -> Result<Vec<Theme>, ThemeError> {
        let mut read = match tokio::fs::read_dir(&self.dir).await {
            Ok(read) => read,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(&self.dir, e)),
        };

        let mut files = Vec::new();
        while let Some(entry) = read
            .next_entry()
            .await
            .map_err(|e| io_error(&self.dir, e))?
        {
            let path = entry.path();
            let is_css = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("css"));
            if is_css && entry.file_type().await.is_ok_and(|t| t.is_file()) {
                files.push(path);
            }
        }
        files.sort();

        let mut themes = Vec::with_capacity(files.len());
        for path in files {
            let content = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| io_error(&path, e))?;
            themes.push(describe(&path, &content));
        }
        Ok(themes)
    }

    /// Validate and write a theme, returning its sanitized id.
    ///
    /// The file is written to a temporary name and renamed into place.
    ///
    /// # Errors
    ///
    /// - [`ThemeError::Invalid`] if the id is empty after sanitizing, the
    ///   header fields would break the comment block, or the CSS is too big.
    /// - [`ThemeError::Io`] if the file cannot be written.
    pub async fn save(&self, theme: SaveTheme) -> Result<String, ThemeError> {
        let id = sanitize_id(&theme.id);
        if id.is_empty() {
            return Err(invalid("theme id is required"));
        }

        let name = theme
            .name
            .map(|n| n.trim().to_owned())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| id.clone());
        let description = theme.description.trim().to_owned();

        if name.contains('\n') || name.contains('\r') {
            return Err(invalid("theme name must be a single line"));
        }
        if name.contains("*/") || description.contains("*/") {
            return Err(invalid("theme name and description must not contain '*/'"));
        }
        if theme.css.len() > MAX_THEME_CSS_BYTES {
            return Err(invalid("theme css is too large"));
        }

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| io_error(&self.dir, e))?;

        let full = format!("/*\n{name}\n{description}\n*/\n\n{}", theme.css);
        let target = self.dir.join(format!("{id}.css"));
        let staging = self.dir.join(format!(".{id}.css.tmp"));

        tokio::fs::write(&staging, full.as_bytes())
            .await
            .map_err(|e| io_error(&staging, e))?;
        tokio::fs::rename(&staging, &target)
            .await
            .map_err(|e| io_error(&target, e))?;

        info!(theme = %id, "theme saved");
        Ok(id)
    }
}

fn io_error(path: &Path, source: io::Error) -> ThemeError {
    ThemeError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Keep ASCII alphanumerics, `-` and `_`, lowercased.
#[must_use]
pub fn sanitize_id(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn invalid(reason: &str) -> ThemeError {
    ThemeError::Invalid {
        reason: reason.to_owned(),
    }
}

/// Build a [`Theme`] from a file's path and content.
fn describe(path: &Path, content: &str) -> Theme {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = path
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let (name, description) =
        header_comment(content).unwrap_or_else(|| (title_case(&stem), String::new()));

    Theme {
        id: stem,
        name,
        description,
        file: format!("{THEME_URL_PREFIX}/{file_name}"),
    }
}

/// Split a leading `/* ... */` block into (name, description).
fn header_comment(content: &str) -> Option<(String, String)> {
    let body = content.strip_prefix("/*")?;
    let end = body.find("*/")?;
    let comment = body[..end].trim();

    let mut lines = comment.lines();
    let name = lines.next().unwrap_or_default().trim().to_owned();
    let description = lines
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    Some((name, description))
}

/// `solarized-light_v2` → `Solarized Light V2`.
fn title_case(stem: &str) -> String {
    stem.split(['-', '_', ' '])
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}
