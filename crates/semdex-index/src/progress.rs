//! Observable indexing status.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexState {
    #[default]
    Idle,
    Initializing,
    Indexing,
    Ready,
    Error,
    Disabled,
}

impl IndexState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Initializing => "initializing",
            Self::Indexing => "indexing",
            Self::Ready => "ready",
            Self::Error => "error",
            Self::Disabled => "disabled",
        }
    }
}

impl std::fmt::Display for IndexState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot published by the indexer on every state or file change.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct IndexProgress {
    pub state: IndexState,
    pub total_files: usize,
    pub indexed_files: usize,
    pub current_file: Option<String>,
    pub error_message: Option<String>,
}

impl IndexProgress {
    #[must_use]
    pub fn with_state(state: IndexState) -> Self {
        Self {
            state,
            ..Self::default()
        }
    }
}

impl std::fmt::Display for IndexProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.state)?;
        if self.state == IndexState::Indexing {
            write!(f, " {}/{}", self.indexed_files, self.total_files)?;
            if let Some(ref file) = self.current_file {
                write!(f, " ({file})")?;
            }
        }
        if let Some(ref msg) = self.error_message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_idle() {
        let p = IndexProgress::default();
        assert_eq!(p.state, IndexState::Idle);
        assert_eq!(p.to_string(), "idle");
    }

    #[test]
    fn display_indexing_with_file() {
        let p = IndexProgress {
            state: IndexState::Indexing,
            total_files: 10,
            indexed_files: 3,
            current_file: Some("src/lib.rs".into()),
            error_message: None,
        };
        assert_eq!(p.to_string(), "indexing 3/10 (src/lib.rs)");
    }

    #[test]
    fn display_error_message() {
        let p = IndexProgress {
            error_message: Some("disk full".into()),
            ..IndexProgress::with_state(IndexState::Error)
        };
        assert_eq!(p.to_string(), "error: disk full");
    }

    #[test]
    fn serializes_lowercase_state() {
        let json = serde_json::to_string(&IndexProgress::with_state(IndexState::Ready)).unwrap();
        assert!(json.contains("\"state\":\"ready\""));
    }
}
