//! Read-only filesystem tools: index, snippet and search.
//!
//! All operations are blocking; handlers run them on the blocking pool.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use kilo_protocol::{FileIndex, FileIndexRequest, FileKind, IndexedFile};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::config::Config;
use crate::error::FileToolError;

fn default_path() -> String {
    ".".to_string()
}

fn default_start_line() -> usize {
    1
}

fn default_max_lines() -> usize {
    50
}

/// Body of `POST /tools/fs/snippet`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SnippetRequest {
    pub path: String,
    #[serde(default = "default_start_line")]
    pub start_line: usize,
    #[serde(default = "default_max_lines")]
    pub max_lines: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snippet {
    pub file_path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub total_lines: usize,
    pub content: String,
    pub truncated: bool,
}

/// Body of `POST /tools/fs/search`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default = "default_path")]
    pub path: String,
    /// Restrict to these extensions (".rs" or "rs").
    #[serde(default)]
    pub extensions: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchMatch {
    pub line: usize,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMatches {
    pub file_path: String,
    pub matches: Vec<SearchMatch>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResults {
    pub query: String,
    pub results: Vec<FileMatches>,
}

/// Filesystem tools confined to a set of allowed roots.
#[derive(Debug, Clone)]
pub struct FileTools {
    roots: Vec<PathBuf>,
    config: Arc<Config>,
}

impl FileTools {
    /// Relative request paths resolve against the first root.
    pub fn new(roots: Vec<PathBuf>, config: Arc<Config>) -> Result<Self, FileToolError> {
        if roots.is_empty() {
            return Err(FileToolError::InvalidRequest(
                "at least one allowed root is required".to_string(),
            ));
        }
        let roots = roots
            .iter()
            .map(|root| root.canonicalize())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { roots, config })
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Resolve a requested path to a canonical path inside an allowed root.
    pub fn resolve(&self, requested: &str) -> Result<PathBuf, FileToolError> {
        let trimmed = requested.trim();
        if trimmed.contains('\0') {
            return Err(FileToolError::InvalidRequest("path contains a null byte".into()));
        }
        let candidate = Path::new(if trimmed.is_empty() { "." } else { trimmed });
        let joined = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.roots[0].join(candidate)
        };

        let canonical = joined.canonicalize().map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => FileToolError::NotFound(requested.to_string()),
            _ => FileToolError::Io(err),
        })?;

        if !self.roots.iter().any(|root| canonical.starts_with(root)) {
            warn!("Rejected path outside allowed roots: {:?}", canonical);
            return Err(FileToolError::AccessDenied(requested.to_string()));
        }
        Ok(canonical)
    }

    /// List files down to `max_depth` directory levels below `path`.
    pub fn index(&self, request: &FileIndexRequest) -> Result<FileIndex, FileToolError> {
        let base = self.resolve(&request.path)?;
        if !base.is_dir() {
            return Err(FileToolError::NotADirectory(request.path.clone()));
        }

        let mut index = FileIndex::default();
        let walker = WalkDir::new(&base)
            .min_depth(1)
            .max_depth(request.max_depth.saturating_add(1))
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !self.is_hidden_entry(entry));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    debug!("Skipping unreadable entry: {}", err);
                    continue;
                }
            };

            if entry.file_type().is_dir() {
                if entry.depth() <= request.max_depth {
                    index.total_dirs += 1;
                }
                continue;
            }
            if !entry.file_type().is_file() {
                continue;
            }

            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            index.files.push(IndexedFile {
                path: display_path(&request.path, &base, entry.path()),
                size,
                kind: self.file_kind(entry.path()),
            });
        }

        index.total_files = index.files.len();
        debug!(
            "Indexed {} files and {} directories under {}",
            index.total_files,
            index.total_dirs,
            base.display()
        );
        Ok(index)
    }

    /// Read a window of lines from a text file.
    pub fn snippet(&self, request: &SnippetRequest) -> Result<Snippet, FileToolError> {
        let path = self.resolve(&request.path)?;
        let content = self.read_text(&path, &request.path)?;

        let lines: Vec<&str> = content.lines().collect();
        let start = request.start_line.saturating_sub(1).min(lines.len());
        let end = start.saturating_add(request.max_lines).min(lines.len());

        let mut snippet = lines[start..end].join("\n");
        let truncated = snippet.chars().count() > self.config.max_snippet_length;
        if truncated {
            snippet = snippet
                .chars()
                .take(self.config.max_snippet_length)
                .collect::<String>();
            snippet.push_str("\n... (truncated)");
        }

        Ok(Snippet {
            file_path: request.path.clone(),
            start_line: start + 1,
            end_line: end,
            total_lines: lines.len(),
            content: snippet,
            truncated,
        })
    }

    /// Case-insensitive substring search over text files.
    pub fn search(&self, request: &SearchRequest) -> Result<SearchResults, FileToolError> {
        if request.query.trim().is_empty() {
            return Err(FileToolError::InvalidRequest("query must not be empty".into()));
        }
        let base = self.resolve(&request.path)?;
        let needle = request.query.to_lowercase();
        let extensions: Option<Vec<String>> = request.extensions.as_ref().map(|exts| {
            exts.iter()
                .map(|ext| format!(".{}", ext.trim_start_matches('.')))
                .collect()
        });

        let mut results = Vec::new();
        let walker = WalkDir::new(&base)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !self.is_hidden_entry(entry));

        for entry in walker.filter_map(Result::ok) {
            if results.len() >= self.config.max_search_results {
                break;
            }
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if let Some(exts) = &extensions {
                let Some(ext) = dotted_extension(path) else {
                    continue;
                };
                if !exts.iter().any(|e| e.eq_ignore_ascii_case(&ext)) {
                    continue;
                }
            }
            let display = display_path(&request.path, &base, path);
            let Ok(content) = self.read_text(path, &display) else {
                continue;
            };

            let matches: Vec<SearchMatch> = content
                .lines()
                .enumerate()
                .filter(|(_, line)| line.to_lowercase().contains(&needle))
                .take(self.config.max_matches_per_file)
                .map(|(idx, line)| SearchMatch {
                    line: idx + 1,
                    content: line.trim().to_string(),
                })
                .collect();

            if !matches.is_empty() {
                results.push(FileMatches {
                    file_path: display,
                    matches,
                });
            }
        }

        Ok(SearchResults {
            query: request.query.clone(),
            results,
        })
    }

    pub fn file_kind(&self, path: &Path) -> FileKind {
        if let Some(ext) = dotted_extension(path) {
            if self.config.is_text_extension(&ext) {
                return FileKind::Text;
            }
        }
        match mime_guess::from_path(path).first() {
            Some(mime) if mime.type_() == mime_guess::mime::TEXT => FileKind::Text,
            _ => FileKind::Binary,
        }
    }

    fn read_text(&self, path: &Path, label: &str) -> Result<String, FileToolError> {
        let metadata = std::fs::metadata(path)?;
        if !metadata.is_file() {
            return Err(FileToolError::NotAFile(label.to_string()));
        }
        if metadata.len() > self.config.max_file_size {
            return Err(FileToolError::FileTooLarge {
                size: metadata.len(),
                limit: self.config.max_file_size,
            });
        }
        if self.file_kind(path) != FileKind::Text {
            return Err(FileToolError::NotText(label.to_string()));
        }
        let bytes = std::fs::read(path)?;
        String::from_utf8(bytes).map_err(|_| FileToolError::NotText(label.to_string()))
    }

    fn is_hidden_entry(&self, entry: &DirEntry) -> bool {
        entry.file_type().is_dir() && self.config.is_hidden_dir(&entry.file_name().to_string_lossy())
    }
}

fn dotted_extension(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
}

/// Path shown to callers: the requested path joined with the entry's
/// position below it, `/`-separated.
fn display_path(requested: &str, base: &Path, full: &Path) -> String {
    let relative: Vec<String> = full
        .strip_prefix(base)
        .map(|rel| {
            rel.components()
                .filter_map(|c| match c {
                    Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();
    let relative = relative.join("/");

    let prefix = requested.trim().trim_end_matches('/');
    if prefix.is_empty() {
        relative
    } else if relative.is_empty() {
        prefix.to_string()
    } else {
        format!("{prefix}/{relative}")
    }
}
