//! API key discovery for the documentation helper
//!
//! The key is looked up in the environment first, then in a `.context7.env`
//! file in the working directory, then in `~/.context7.env`. Files hold lines
//! of the form `CONTEXT7_API_KEY=value`; surrounding quotes are stripped.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the variable carrying the key, in the environment and in files
pub const API_KEY_VAR: &str = "CONTEXT7_API_KEY";

/// File name searched in the project and home directories
pub const API_KEY_FILE: &str = ".context7.env";

/// Where a key was found
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiKeySource {
    /// `CONTEXT7_API_KEY` environment variable
    Environment,
    /// `./.context7.env`
    ProjectFile(PathBuf),
    /// `~/.context7.env`
    UserFile(PathBuf),
}

impl fmt::Display for ApiKeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiKeySource::Environment => write!(f, "environment variable"),
            ApiKeySource::ProjectFile(p) => write!(f, "project config ({})", p.display()),
            ApiKeySource::UserFile(p) => write!(f, "user config ({})", p.display()),
        }
    }
}

/// A discovered key together with its origin
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey {
    value: String,
    source: ApiKeySource,
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKey")
            .field("value", &self.masked())
            .field("source", &self.source)
            .finish()
    }
}

impl ApiKey {
    /// Raw key; only hand this to the helper process
    pub fn expose(&self) -> &str {
        &self.value
    }

    /// Where the key came from
    pub fn source(&self) -> &ApiKeySource {
        &self.source
    }

    /// Key safe for display
    pub fn masked(&self) -> String {
        mask_key(&self.value)
    }
}

/// Look up the key from the real environment, working directory and home.
pub fn load_api_key() -> Option<ApiKey> {
    let env_value = std::env::var(API_KEY_VAR).ok();
    let cwd = std::env::current_dir().ok();
    let home = dirs_next::home_dir();
    load_api_key_from(env_value.as_deref(), cwd.as_deref(), home.as_deref())
}

/// Look up the key from explicit sources, in priority order.
pub fn load_api_key_from(
    env_value: Option<&str>,
    project_dir: Option<&Path>,
    home_dir: Option<&Path>,
) -> Option<ApiKey> {
    if let Some(value) = env_value.map(str::trim).filter(|v| !v.is_empty()) {
        return Some(ApiKey {
            value: value.to_string(),
            source: ApiKeySource::Environment,
        });
    }

    if let Some(path) = project_dir.map(|d| d.join(API_KEY_FILE)) {
        if let Some(value) = read_key_from_file(&path) {
            return Some(ApiKey {
                value,
                source: ApiKeySource::ProjectFile(path),
            });
        }
    }

    if let Some(path) = home_dir.map(|d| d.join(API_KEY_FILE)) {
        if let Some(value) = read_key_from_file(&path) {
            return Some(ApiKey {
                value,
                source: ApiKeySource::UserFile(path),
            });
        }
    }

    None
}

fn read_key_from_file(path: &Path) -> Option<String> {
    let contents = fs::read_to_string(path).ok()?;
    let prefix = format!("{API_KEY_VAR}=");
    contents.lines().map(str::trim).find_map(|line| {
        let value = line.strip_prefix(&prefix)?;
        let value = value.trim().trim_matches(|c| c == '\'' || c == '"');
        (!value.is_empty()).then(|| value.to_string())
    })
}

/// Mask a key as `first12...last4`; short keys are fully hidden.
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 16 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..12].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}
