//! Contract with the external code runner.
//!
//! The crate does not compile or run anything itself. A deployment plugs a
//! [`CodeRunner`] into the server state; the runner must honour
//! [`ExecutionLimits`].

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    Javascript,
    Cpp,
    C,
    Java,
}

impl Language {
    pub const ALL: [Language; 5] = [
        Language::Python,
        Language::Javascript,
        Language::Cpp,
        Language::C,
        Language::Java,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Javascript => "javascript",
            Language::Cpp => "cpp",
            Language::C => "c",
            Language::Java => "java",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Language> {
        Self::ALL.into_iter().find(|l| l.as_str() == s)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub code: String,
    pub language: Language,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResponse {
    pub output: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionLimits {
    pub timeout: Duration,
    pub max_output_bytes: usize,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_output_bytes: 1024 * 1024,
        }
    }
}

#[async_trait]
pub trait CodeRunner: Send + Sync {
    /// Runs `request` within `limits`. Compiler errors and a failing program
    /// are reported in `output`; `Err` means the runner itself failed.
    async fn run(
        &self,
        request: ExecutionRequest,
        limits: ExecutionLimits,
    ) -> Result<ExecutionResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_names() {
        for language in Language::ALL {
            assert_eq!(Language::parse(language.as_str()), Some(language));
        }
        assert_eq!(Language::parse("rust"), None);
        assert_eq!(Language::parse("Python"), None);
    }

    #[test]
    fn test_default_limits() {
        let limits = ExecutionLimits::default();
        assert_eq!(limits.timeout, Duration::from_secs(5));
        assert_eq!(limits.max_output_bytes, 1_048_576);
    }
}
