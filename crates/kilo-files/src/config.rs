use std::path::Path;

use serde::{Deserialize, Serialize};

/// File tool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Largest file (in bytes) that snippet and search will read
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Snippets longer than this many characters are cut
    #[serde(default = "default_max_snippet_length")]
    pub max_snippet_length: usize,

    /// Matching lines reported per file by search
    #[serde(default = "default_max_matches_per_file")]
    pub max_matches_per_file: usize,

    /// Files with matches reported by one search
    #[serde(default = "default_max_search_results")]
    pub max_search_results: usize,

    /// Directories never descended into
    #[serde(default = "default_hidden_dirs")]
    pub hidden_dirs: Vec<String>,

    /// Extensions always treated as text, whatever their MIME guess
    #[serde(default = "default_text_extensions")]
    pub text_extensions: Vec<String>,
}

fn default_max_file_size() -> u64 {
    1024 * 1024 // 1 MiB
}

fn default_max_snippet_length() -> usize {
    2000
}

fn default_max_matches_per_file() -> usize {
    5
}

fn default_max_search_results() -> usize {
    100
}

fn default_hidden_dirs() -> Vec<String> {
    [".git", "node_modules", "__pycache__", "target", ".venv"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_text_extensions() -> Vec<String> {
    [
        ".txt", ".md", ".py", ".js", ".ts", ".tsx", ".rs", ".toml", ".html", ".css", ".json",
        ".xml", ".yaml", ".yml", ".ini", ".cfg", ".sh", ".bash", ".sql", ".csv",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            max_snippet_length: default_max_snippet_length(),
            max_matches_per_file: default_max_matches_per_file(),
            max_search_results: default_max_search_results(),
            hidden_dirs: default_hidden_dirs(),
            text_extensions: default_text_extensions(),
        }
    }
}

impl Config {
    /// Load config from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Check if a directory should be skipped
    pub fn is_hidden_dir(&self, name: &str) -> bool {
        self.hidden_dirs.iter().any(|d| d == name)
    }

    /// Check if an extension (with leading dot) is a known text type
    pub fn is_text_extension(&self, ext: &str) -> bool {
        self.text_extensions
            .iter()
            .any(|e| e.eq_ignore_ascii_case(ext))
    }
}
