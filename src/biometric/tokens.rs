//! Token store
//!
//! Two-line text file holding the current token pair:
//!
//! ```text
//! Access Token: <access>
//! Refresh Token: <refresh>
//! ```
//!
//! The file is replaced whole on every save (write sibling, then rename).

use crate::error::FluxError;
use crate::types::TokenPair;
use std::fs;
use std::path::{Path, PathBuf};

const ACCESS_LABEL: &str = "Access Token";
const REFRESH_LABEL: &str = "Refresh Token";

/// File-backed store for the single valid token pair
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the current token pair
    pub fn load(&self) -> Result<TokenPair, FluxError> {
        let content = fs::read_to_string(&self.path).map_err(|e| {
            FluxError::TokenStore(format!("cannot read {}: {}", self.path.display(), e))
        })?;
        parse_tokens(&content)
    }

    /// Replace the stored token pair
    pub fn save(&self, tokens: &TokenPair) -> Result<(), FluxError> {
        let staging = self.path.with_extension("tmp");
        fs::write(&staging, format_tokens(tokens))?;
        fs::rename(&staging, &self.path)?;
        Ok(())
    }
}

fn parse_tokens(content: &str) -> Result<TokenPair, FluxError> {
    let mut lines = content.lines().filter(|l| !l.trim().is_empty());
    let access_token = token_value(lines.next(), ACCESS_LABEL)?;
    let refresh_token = token_value(lines.next(), REFRESH_LABEL)?;
    Ok(TokenPair {
        access_token,
        refresh_token,
    })
}

fn token_value(line: Option<&str>, label: &str) -> Result<String, FluxError> {
    let line = line.ok_or_else(|| FluxError::TokenStore(format!("missing {} line", label)))?;
    let value = match line.split_once(':') {
        Some((_, value)) => value.trim(),
        None => line.trim(),
    };
    if value.is_empty() {
        return Err(FluxError::TokenStore(format!("empty {}", label)));
    }
    Ok(value.to_string())
}

fn format_tokens(tokens: &TokenPair) -> String {
    format!(
        "{}: {}\n{}: {}\n",
        ACCESS_LABEL, tokens.access_token, REFRESH_LABEL, tokens.refresh_token
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_labelled_lines() {
        let tokens = parse_tokens("Access Token: abc.def\nRefresh Token: r123\n").unwrap();
        assert_eq!(
            tokens,
            TokenPair {
                access_token: "abc.def".to_string(),
                refresh_token: "r123".to_string(),
            }
        );
    }

    #[test]
    fn test_missing_refresh_line() {
        assert!(matches!(
            parse_tokens("Access Token: abc\n"),
            Err(FluxError::TokenStore(_))
        ));
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("tokens.txt"));
        let tokens = TokenPair {
            access_token: "a1".to_string(),
            refresh_token: "r1".to_string(),
        };
        store.save(&tokens).unwrap();

        let written = fs::read_to_string(store.path()).unwrap();
        assert_eq!(written, "Access Token: a1\nRefresh Token: r1\n");
        assert_eq!(store.load().unwrap(), tokens);
        assert!(!dir.path().join("tokens.tmp").exists());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("absent.txt"));
        assert!(matches!(store.load(), Err(FluxError::TokenStore(_))));
    }
}
