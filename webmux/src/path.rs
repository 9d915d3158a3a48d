//! Path translation between derivative requests and stored source objects.
//!
//! MediaWiki publishes remuxed audio under two path shapes that both resolve
//! to the same stored original:
//!
//! ```text
//! flat:  /wiki/4/40/abc.oga.webm                    -> /wiki/4/40/abc.oga
//! tree:  /wiki/transcoded/4/40/abc.oga/abc.oga.webm -> /wiki/4/40/abc.oga
//! ```
//!
//! The tree shape carries a self-referential doubling: the final segment must
//! equal the previous segment with `.webm` appended. Paths that claim the
//! tree shape but violate it are rejected rather than guessed at.

use thiserror::Error;

/// Errors produced while translating a requested path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// The path does not end in a recognized remux suffix.
    #[error("not a webm remux request: {0}")]
    NotDerivative(String),
    /// The path carries a remux suffix but its structure is invalid.
    #[error("invalid path format: {0}")]
    Malformed(String),
}

/// Recognized derivative suffixes: Ogg audio repackaged as WebM.
const REMUX_SUFFIXES: [&str; 2] = [".oga.webm", ".opus.webm"];

/// Returns true when the path names a derivative this proxy serves.
pub fn is_derivative_path(path: &str) -> bool {
    REMUX_SUFFIXES.iter().any(|suffix| path.ends_with(suffix))
}

/// Maps a derivative path to the canonical source object it is produced from.
///
/// Accepts both the flat shape (the source path with `.webm` appended) and
/// MediaWiki's transcoded tree shape
/// (`/wiki/transcoded/<p1>/<p2>/<name>/<name>.webm`).
pub fn derive_source(path: &str) -> Result<String, PathError> {
    if !is_derivative_path(path) {
        return Err(PathError::NotDerivative(path.to_string()));
    }

    // Splitting "/wiki/..." yields a leading empty segment, so segment 2 is
    // the first directory below the root prefix.
    let parts: Vec<&str> = path.split('/').collect();
    if parts.len() > 2 && parts[2] == "transcoded" {
        if parts.len() >= 7 && parts[6] == format!("{}.webm", parts[5]) {
            return Ok(format!(
                "/{}/{}/{}/{}",
                parts[1], parts[3], parts[4], parts[5]
            ));
        }
        return Err(PathError::Malformed(path.to_string()));
    }

    let source = match path.strip_suffix(".webm") {
        Some(source) => source,
        None => return Err(PathError::NotDerivative(path.to_string())),
    };
    // A name like "/.oga.webm" has no stem to remux from.
    match source.rsplit('/').next() {
        Some(name) if name != ".oga" && name != ".opus" => Ok(source.to_string()),
        _ => Err(PathError::Malformed(path.to_string())),
    }
}

/// Canonicalizes a deletion target to its transcoded-tree key.
///
/// A path already inside the transcoded tree passes through unchanged. Any
/// other path is treated as a source object reference whose last three
/// segments (hash prefix, hash subprefix, file name) locate the derivative:
///
/// ```text
/// /wiki/4/40/abc.oga -> /wiki/transcoded/4/40/abc.oga/abc.oga.webm
/// ```
///
/// The reassembly validates nothing beyond the segment count; callers are
/// expected to check the result with [`is_derivative_path`].
pub fn canonical_transcoded_key(path: &str) -> Result<String, PathError> {
    if path.contains("/transcoded/") {
        return Ok(path.to_string());
    }

    let parts: Vec<&str> = path.split('/').collect();
    if parts.len() < 4 {
        return Err(PathError::Malformed(path.to_string()));
    }

    let name = parts[parts.len() - 1];
    Ok(format!(
        "/wiki/transcoded/{}/{}/{}/{}.webm",
        parts[parts.len() - 3],
        parts[parts.len() - 2],
        name,
        name
    ))
}
