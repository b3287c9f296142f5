//! File-index request and response shapes.

use serde::{Deserialize, Serialize};

fn default_index_path() -> String {
    ".".to_string()
}

fn default_max_depth() -> usize {
    2
}

/// Body of `POST /tools/fs/index`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileIndexRequest {
    #[serde(default = "default_index_path")]
    pub path: String,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

impl Default for FileIndexRequest {
    fn default() -> Self {
        Self {
            path: default_index_path(),
            max_depth: default_max_depth(),
        }
    }
}

/// Whether a file's contents are readable as text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Text,
    Binary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedFile {
    pub path: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub kind: FileKind,
}

/// Response of `POST /tools/fs/index`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileIndex {
    pub files: Vec<IndexedFile>,
    pub total_files: usize,
    pub total_dirs: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn index_request_defaults() {
        let req: FileIndexRequest = serde_json::from_value(json!({})).unwrap();
        assert_eq!(req, FileIndexRequest::default());
        assert_eq!(serde_json::to_value(&req).unwrap(), json!({"path": ".", "max_depth": 2}));
    }

    #[test]
    fn indexed_file_uses_type_key() {
        let file = IndexedFile {
            path: "./README.md".into(),
            size: 12,
            kind: FileKind::Text,
        };
        assert_eq!(
            serde_json::to_value(&file).unwrap(),
            json!({"path": "./README.md", "size": 12, "type": "text"})
        );
    }
}
