//! Error types for plainvoice.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlainvoiceError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Missing credential {name}; pass it on the command line or set {env_var}")]
    MissingCredential { name: String, env_var: String },

    #[error("Failed to set up HTTP client: {message}")]
    ClientSetup { message: String },

    // Document errors
    #[error("Unsupported input file {path}; expected a PDF or Markdown file")]
    UnsupportedInput { path: String },

    #[error("Text extraction failed for {path}: {message}")]
    Extraction { path: String, message: String },

    #[error("No text was extracted from {path}")]
    EmptyDocument { path: String },

    // Unit transform errors (absorbed by the dispatcher)
    #[error("Rewrite request failed: {message}")]
    Rewrite { message: String },

    #[error("Rate limited by remote service (retry after {retry_after:?}s)")]
    RateLimited { retry_after: Option<u64> },

    #[error("Invalid response from remote service: {message}")]
    InvalidResponse { message: String },

    #[error("Speech synthesis failed with status {status}: {message}")]
    Synthesis { status: u16, message: String },

    // Audio codec errors
    #[error("Audio decode failed: {message}")]
    AudioDecode { message: String },

    #[error("Audio encode failed: {message}")]
    AudioEncode { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl PlainvoiceError {
    /// Shorthand for a configuration value that failed validation.
    pub fn invalid_value(key: &str, message: impl Into<String>) -> Self {
        Self::ConfigInvalidValue {
            key: key.to_string(),
            message: message.into(),
        }
    }

    /// Whether this error describes a single failed unit rather than the run.
    pub fn is_unit_failure(&self) -> bool {
        matches!(
            self,
            Self::Rewrite { .. }
                | Self::RateLimited { .. }
                | Self::InvalidResponse { .. }
                | Self::Synthesis { .. }
                | Self::AudioDecode { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, PlainvoiceError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_config_invalid_value_display() {
        let error = PlainvoiceError::invalid_value("simplify.max_unit_size", "must be positive");
        assert_eq!(
            error.to_string(),
            "Invalid configuration value for simplify.max_unit_size: must be positive"
        );
    }

    #[test]
    fn test_missing_credential_display() {
        let error = PlainvoiceError::MissingCredential {
            name: "UnrealSpeech API key".to_string(),
            env_var: "UNREAL_SPEECH_API_KEY".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Missing credential UnrealSpeech API key; pass it on the command line or set UNREAL_SPEECH_API_KEY"
        );
    }

    #[test]
    fn test_unsupported_input_display() {
        let error = PlainvoiceError::UnsupportedInput {
            path: "notes.docx".to_string(),
        };
        assert!(error.to_string().contains("notes.docx"));
    }

    #[test]
    fn test_synthesis_display() {
        let error = PlainvoiceError::Synthesis {
            status: 401,
            message: "unauthorized".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Speech synthesis failed with status 401: unauthorized"
        );
    }

    #[test]
    fn test_rate_limited_display() {
        let error = PlainvoiceError::RateLimited {
            retry_after: Some(20),
        };
        assert!(error.to_string().contains("20"));
    }

    #[test]
    fn test_unit_failures_are_classified() {
        assert!(
            PlainvoiceError::Rewrite {
                message: "timeout".into()
            }
            .is_unit_failure()
        );
        assert!(PlainvoiceError::RateLimited { retry_after: None }.is_unit_failure());
        assert!(
            PlainvoiceError::InvalidResponse {
                message: "no choices".into()
            }
            .is_unit_failure()
        );
        assert!(!PlainvoiceError::invalid_value("x", "y").is_unit_failure());
        assert!(
            !PlainvoiceError::EmptyDocument {
                path: "a.md".into()
            }
            .is_unit_failure()
        );
    }

    #[test]
    fn test_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let error: PlainvoiceError = io_error.into();
        assert!(error.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_toml_error() {
        let toml_error = toml::from_str::<toml::Value>("invalid = toml = syntax").unwrap_err();
        let error: PlainvoiceError = toml_error.into();
        assert!(error.to_string().contains("Configuration error"));
    }

    #[test]
    fn test_error_source_chain_io() {
        let io_error = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let error: PlainvoiceError = io_error.into();

        let error_trait: &dyn std::error::Error = &error;
        assert!(error_trait.source().is_some());
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<PlainvoiceError>();
        assert_sync::<PlainvoiceError>();
    }
}
