//! Documentation queries forwarded to the helper
//!
//! The parameters here are pass-through: the helper does the resolving,
//! searching and ranking. This module only checks that the arguments are
//! well-formed before anything is sent.

use crate::{CoreError, Result};
use std::fmt;
use std::str::FromStr;

/// Topic used when the caller gives none
pub const DEFAULT_TOPIC: &str = "documentation";

/// Kind of content the caller is after
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ContentType {
    /// Code examples
    #[default]
    Examples,
    /// API signatures and reference
    ApiRef,
    /// Installation and setup commands
    Setup,
    /// Conceptual explanations
    Concepts,
    /// Workarounds and debugging
    Troubleshooting,
    /// Upgrade and breaking-change notes
    Migration,
    /// Best practices
    Patterns,
    /// Everything, unqualified
    All,
}

impl ContentType {
    /// Every accepted value, in CLI order
    pub const ALL: [ContentType; 8] = [
        ContentType::Examples,
        ContentType::ApiRef,
        ContentType::Setup,
        ContentType::Concepts,
        ContentType::Troubleshooting,
        ContentType::Migration,
        ContentType::Patterns,
        ContentType::All,
    ];

    /// CLI spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Examples => "examples",
            ContentType::ApiRef => "api-ref",
            ContentType::Setup => "setup",
            ContentType::Concepts => "concepts",
            ContentType::Troubleshooting => "troubleshooting",
            ContentType::Migration => "migration",
            ContentType::Patterns => "patterns",
            ContentType::All => "all",
        }
    }

    /// Words appended to the topic so the helper's search leans this way
    fn qualifier(&self) -> Option<&'static str> {
        match self {
            ContentType::Examples => Some("code examples"),
            ContentType::ApiRef => Some("API reference"),
            ContentType::Setup => Some("installation and setup"),
            ContentType::Concepts => Some("concepts"),
            ContentType::Troubleshooting => Some("troubleshooting"),
            ContentType::Migration => Some("migration guide"),
            ContentType::Patterns => Some("best practices"),
            ContentType::All => None,
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        ContentType::ALL
            .into_iter()
            .find(|ct| ct.as_str() == wanted)
            .ok_or_else(|| {
                let valid: Vec<&str> = ContentType::ALL.iter().map(|c| c.as_str()).collect();
                CoreError::ValidationError(format!(
                    "unknown content type '{}' (expected one of: {})",
                    s,
                    valid.join(", ")
                ))
            })
    }
}

/// Which library the query is about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LibraryRef {
    /// Exact id such as `/vercel/next.js`
    Id(String),
    /// Name the helper has to resolve first
    Name(String),
}

/// A validated documentation query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocsQuery {
    /// Target library
    pub library: LibraryRef,
    /// Topic, possibly empty
    pub topic: String,
    /// Requested content type
    pub content_type: ContentType,
}

impl DocsQuery {
    /// Build a query from raw CLI values.
    ///
    /// Exactly one of `library_id` and `library` must be given. Ids are
    /// un-mangled (see [`normalize_library_id`]) and then validated.
    pub fn new(
        library_id: Option<&str>,
        library: Option<&str>,
        topic: Option<&str>,
        content_type: ContentType,
    ) -> Result<Self> {
        let library_id = library_id.map(str::trim).filter(|s| !s.is_empty());
        let library = library.map(str::trim).filter(|s| !s.is_empty());

        let library = match (library_id, library) {
            (Some(_), Some(_)) => {
                return Err(CoreError::ValidationError(
                    "--library-id and --library are mutually exclusive".to_string(),
                ))
            }
            (None, None) => {
                return Err(CoreError::ValidationError(
                    "must specify --library-id or --library".to_string(),
                ))
            }
            (Some(id), None) => {
                let id = normalize_library_id(id);
                validate_library_id(&id)?;
                LibraryRef::Id(id)
            }
            (None, Some(name)) => LibraryRef::Name(name.to_string()),
        };

        Ok(Self {
            library,
            topic: topic.map(str::trim).unwrap_or_default().to_string(),
            content_type,
        })
    }

    /// Natural-language query text sent to the helper
    pub fn query_text(&self) -> String {
        let topic = if self.topic.is_empty() {
            DEFAULT_TOPIC
        } else {
            self.topic.as_str()
        };
        match self.content_type.qualifier() {
            Some(q) => format!("{topic} {q}"),
            None => topic.to_string(),
        }
    }
}

/// Undo Git-for-Windows shell path conversion of a library id.
///
/// MSYS rewrites `/org/project` into `C:/Program Files/Git/org/project` (or
/// `/c/Program Files/Git/org/project`) before the program sees it.
pub fn normalize_library_id(value: &str) -> String {
    let unified = value.replace('\\', "/");
    let bytes = unified.as_bytes();

    let drive_form = bytes.len() > 2
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && bytes[2] == b'/';
    let msys_form = bytes.len() > 2
        && bytes[0] == b'/'
        && bytes[1].is_ascii_alphabetic()
        && bytes[2] == b'/';

    if drive_form || msys_form {
        // at least one directory must sit between the prefix and `Git`
        let lower = unified[3..].to_ascii_lowercase();
        if let Some(idx) = lower.find("/git/") {
            let rest = &unified[3 + idx + "/git/".len()..];
            if !rest.is_empty() {
                return format!("/{rest}");
            }
        }
    }
    value.to_string()
}

/// Check the `/org/project` or `/org/project/version` shape.
pub fn validate_library_id(id: &str) -> Result<()> {
    let invalid = || {
        CoreError::ValidationError(format!(
            "invalid library ID '{}': expected /org/project or /org/project/version",
            id
        ))
    };

    let rest = id.strip_prefix('/').ok_or_else(invalid)?;
    let segments: Vec<&str> = rest.split('/').collect();
    if !(2..=3).contains(&segments.len()) {
        return Err(invalid());
    }

    let org_ok = |c: char| c.is_ascii_alphanumeric() || c == '_' || c == '-';
    let rest_ok = |c: char| org_ok(c) || c == '.';

    let (org, tail) = segments.split_first().ok_or_else(invalid)?;
    if org.is_empty() || !org.chars().all(org_ok) {
        return Err(invalid());
    }
    if tail.iter().any(|s| s.is_empty() || !s.chars().all(rest_ok)) {
        return Err(invalid());
    }
    Ok(())
}

/// Pull the first `Context7-compatible library ID:` value out of a
/// `resolve-library-id` answer.
pub fn extract_library_id(resolve_text: &str) -> Option<String> {
    const LABEL: &str = "Context7-compatible library ID:";
    resolve_text.lines().find_map(|line| {
        let (_, after) = line.split_once(LABEL)?;
        let id: String = after
            .trim_start()
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '_' | '.' | '-'))
            .collect();
        (!id.is_empty()).then_some(id)
    })
}

/// Title of the first numbered entry (`1. React`) in a resolve answer
pub fn extract_library_title(resolve_text: &str) -> Option<String> {
    resolve_text.lines().find_map(|line| {
        let digits = line.len() - line.trim_start_matches(|c: char| c.is_ascii_digit()).len();
        if digits == 0 {
            return None;
        }
        let title = line[digits..].strip_prefix('.')?.trim();
        (!title.is_empty()).then(|| title.to_string())
    })
}

/// Whether a resolved library plausibly is the one that was asked for.
///
/// The requested name must appear in the id or title, case-insensitively,
/// or in the id once `.`, `-`, `_` and spaces are stripped from both.
pub fn library_matches(name: &str, library_id: &str, title: &str) -> bool {
    let name = name.to_lowercase();
    let id = library_id.to_lowercase();
    if id.contains(&name) || title.to_lowercase().contains(&name) {
        return true;
    }
    let squash = |s: &str| -> String {
        s.chars()
            .filter(|c| !matches!(c, '.' | '-' | '_' | ' '))
            .collect()
    };
    squash(&id).contains(&squash(&name))
}
