//! Configuration loading and parsing.
//!
//! Parses `quill.toml` (or an override path provided by the binary):
//!
//! ```toml
//! [session]
//! auto_save = false
//!
//! [files]
//! rich_extensions = ["rtf"]
//! supported = []
//!
//! [encoding]
//! fallback = "utf-8"
//! ```
//!
//! Every field has a default, so a missing file, a missing table or a parse
//! error all yield a usable `Config`. Unknown fields are ignored to allow
//! forward evolution. The encoding fallback label is resolved once by
//! `Config::resolve`; unknown labels degrade to UTF-8 with an info log.

use anyhow::Result;
use core_encoding::TextEncoding;
use serde::Deserialize;
use std::{fs, path::Path, path::PathBuf};
use tracing::{info, warn};

pub const CONFIG_FILE_NAME: &str = "quill.toml";

#[derive(Debug, Deserialize, Default, Clone)]
pub struct SessionConfig {
    /// Persist every real edit immediately instead of marking the session dirty.
    #[serde(default)]
    pub auto_save: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FilesConfig {
    /// Suffixes (without dot, case-insensitive) loaded as structured documents.
    #[serde(default = "FilesConfig::default_rich_extensions")]
    pub rich_extensions: Vec<String>,
    /// Suffixes a session may open. Empty means no restriction.
    #[serde(default)]
    pub supported: Vec<String>,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            rich_extensions: Self::default_rich_extensions(),
            supported: Vec::new(),
        }
    }
}

impl FilesConfig {
    fn default_rich_extensions() -> Vec<String> {
        vec!["rtf".to_string()]
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EncodingConfig {
    #[serde(default = "EncodingConfig::default_fallback")]
    pub fallback: String,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            fallback: Self::default_fallback(),
        }
    }
}

impl EncodingConfig {
    fn default_fallback() -> String {
        "utf-8".to_string()
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct ConfigFile {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub files: FilesConfig,
    #[serde(default)]
    pub encoding: EncodingConfig,
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub raw: Option<String>,                  // original file string (optional)
    pub file: ConfigFile,                     // parsed (or default) data
    pub effective_fallback: TextEncoding,     // resolved from `file.encoding.fallback`
}

/// Best-effort config path: working directory first, then the platform config
/// dir (XDG / AppData Roaming).
pub fn discover() -> PathBuf {
    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.exists() {
        return local;
    }
    if let Some(dir) = dirs::config_dir() {
        return dir.join("quill").join(CONFIG_FILE_NAME);
    }
    PathBuf::from(CONFIG_FILE_NAME)
}

pub fn load_from(path: Option<PathBuf>) -> Result<Config> {
    let path = path.unwrap_or_else(discover);
    let mut cfg = match fs::read_to_string(&path) {
        Ok(content) => match toml::from_str::<ConfigFile>(&content) {
            Ok(file) => Config {
                raw: Some(content),
                file,
                effective_fallback: TextEncoding::UTF8,
            },
            Err(e) => {
                warn!(target: "config", path = %path.display(), error = %e, "config_parse_failed_using_defaults");
                Config::default()
            }
        },
        Err(_) => Config::default(),
    };
    cfg.resolve();
    Ok(cfg)
}

impl Config {
    /// Resolve derived values from the parsed file. Returns the effective
    /// fallback encoding.
    pub fn resolve(&mut self) -> TextEncoding {
        let label = self.file.encoding.fallback.as_str();
        let resolved = match TextEncoding::from_label(label) {
            Some(enc) => enc,
            None => {
                info!(target: "config", label, fallback = TextEncoding::UTF8.label(), "encoding_fallback_label_unknown");
                TextEncoding::UTF8
            }
        };
        self.effective_fallback = resolved;
        resolved
    }

    pub fn auto_save(&self) -> bool {
        self.file.session.auto_save
    }

    /// Whether `path` should be handled as a structured (rich-text) document.
    pub fn is_rich_path(&self, path: &Path) -> bool {
        extension_in(path, &self.file.files.rich_extensions)
    }

    /// Whether a session may open `path`.
    pub fn is_supported_path(&self, path: &Path) -> bool {
        self.file.files.supported.is_empty() || extension_in(path, &self.file.files.supported)
    }
}

fn extension_in(path: &Path, list: &[String]) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    list.iter()
        .any(|candidate| candidate.trim_start_matches('.').eq_ignore_ascii_case(ext))
}
