//! Layout of the identity-file directory: one `<sanitized-owner>.txt`
//! private key per registered identity.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Lowercases and collapses every run of non-`[a-z0-9]` characters to a
/// single hyphen, trimming hyphens at both ends.
pub fn sanitize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.to_lowercase().chars() {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            out.push(ch);
        } else if !out.is_empty() && !out.ends_with('-') {
            out.push('-');
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

pub fn key_file_path(key_dir: &Path, owner: &str) -> PathBuf {
    key_dir.join(format!("{}.txt", sanitize_name(owner)))
}

pub fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)?;
    Ok(())
}

/// Picks the identity file for an encrypt/decrypt run. An explicit path
/// must exist; otherwise the first `.txt` file in the key directory wins,
/// in lexicographic name order so the choice is stable.
pub fn resolve_identity_file(explicit: Option<&Path>, key_dir: &Path) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if !path.is_file() {
            return Err(Error::KeyFileNotFound(path.to_path_buf()));
        }
        return Ok(path.to_path_buf());
    }

    let entries = match fs::read_dir(key_dir) {
        Ok(entries) => entries,
        Err(_) => return Err(Error::NoIdentityFiles(key_dir.to_path_buf())),
    };

    let mut candidates = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "txt") {
            candidates.push(path);
        }
    }
    candidates.sort();
    candidates
        .into_iter()
        .next()
        .ok_or_else(|| Error::NoIdentityFiles(key_dir.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn sanitize_collapses_and_trims() {
        assert_eq!(sanitize_name("Alice O'Brien"), "alice-o-brien");
        assert_eq!(sanitize_name("  Bob!!Smith  "), "bob-smith");
        assert_eq!(sanitize_name("carol-2"), "carol-2");
        assert_eq!(sanitize_name("---"), "");
    }

    #[test]
    fn key_file_path_uses_sanitized_owner() {
        let path = key_file_path(Path::new(".age-keys"), "Alice O'Brien");
        assert_eq!(path, Path::new(".age-keys").join("alice-o-brien.txt"));
    }

    #[test]
    fn default_identity_is_first_txt_by_name() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("bob.txt"), "key").unwrap();
        fs::write(tmp.path().join("alice.txt"), "key").unwrap();
        fs::write(tmp.path().join("README.md"), "not a key").unwrap();

        let resolved = resolve_identity_file(None, tmp.path()).unwrap();
        assert_eq!(resolved, tmp.path().join("alice.txt"));
    }

    #[test]
    fn explicit_key_file_must_exist() {
        let tmp = tempdir().unwrap();
        let missing = tmp.path().join("nope.txt");
        let err = resolve_identity_file(Some(&missing), tmp.path()).unwrap_err();
        assert!(matches!(err, Error::KeyFileNotFound(path) if path == missing));
    }

    #[test]
    fn empty_or_missing_directory_has_no_identities() {
        let tmp = tempdir().unwrap();
        let err = resolve_identity_file(None, tmp.path()).unwrap_err();
        assert!(matches!(err, Error::NoIdentityFiles(_)));

        let err = resolve_identity_file(None, &tmp.path().join("absent")).unwrap_err();
        assert!(matches!(err, Error::NoIdentityFiles(_)));
    }
}
