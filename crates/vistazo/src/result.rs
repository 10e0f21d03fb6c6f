//! Result and error types for Vistazo.

use thiserror::Error;

/// Result type for Vistazo operations
pub type VistazoResult<T> = Result<T, VistazoError>;

/// Errors that can occur in Vistazo
#[derive(Debug, Error)]
pub enum VistazoError {
    /// Configuration error (malformed URL, contradictory or unparsable settings)
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Browser launch error
    #[error("Failed to launch browser: {message}")]
    BrowserLaunchError {
        /// Error message
        message: String,
    },

    /// Navigation error
    #[error("Navigation to {url} failed: {message}")]
    NavigationError {
        /// URL that failed
        url: String,
        /// Error message
        message: String,
    },

    /// Element lookup failed
    #[error("No element matches {locator}")]
    ElementNotFound {
        /// Locator that found nothing
        locator: String,
    },

    /// Page interaction failed (click, typing, reading text)
    #[error("Page error: {message}")]
    PageError {
        /// Error message
        message: String,
    },

    /// Operation timed out
    #[error("Operation timed out after {ms}ms waiting for {waited_for}")]
    Timeout {
        /// Timeout in milliseconds
        ms: u64,
        /// Description of the awaited condition
        waited_for: String,
    },

    /// No binding and no way to construct a type
    #[error("Cannot construct {type_name}: {message}")]
    Construction {
        /// Type that could not be built
        type_name: String,
        /// Error message
        message: String,
    },

    /// A type was asked for page binding but declares none
    #[error("Page binding failed for {type_name}: {message}")]
    PageBinding {
        /// Type being bound
        type_name: String,
        /// Error message
        message: String,
    },

    /// Missing named value in the injector
    #[error("No value bound under name '{name}' for {type_name}")]
    MissingNamed {
        /// Binding name
        name: String,
        /// Requested type
        type_name: String,
    },

    /// Dependency graph recursion exceeded the allowed depth
    #[error("Dependency cycle suspected while constructing {type_name}")]
    DependencyCycle {
        /// Type at which recursion was cut off
        type_name: String,
    },

    /// Screenshot capture error
    #[error("Screenshot failed: {message}")]
    ScreenshotError {
        /// Error message
        message: String,
    },

    /// Image comparison error
    #[error("Image comparison failed: {message}")]
    ImageComparisonError {
        /// Error message
        message: String,
    },

    /// Captured screenshot diverged from its baseline beyond tolerance
    #[error("{message}")]
    ScreenshotDivergence {
        /// Human readable message naming the diff image
        message: String,
        /// Measured divergence (0.0-1.0)
        divergence: f64,
        /// Diff image path
        diff_path: std::path::PathBuf,
    },

    /// Assertion failed inside a test body
    #[error("Assertion failed: {message}")]
    AssertionFailed {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Image codec error
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// YAML settings file error
    #[error("Settings file error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VistazoError {
    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a construction error
    #[must_use]
    pub fn construction(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Construction {
            type_name: type_name.into(),
            message: message.into(),
        }
    }

    /// Create a page error
    #[must_use]
    pub fn page(message: impl Into<String>) -> Self {
        Self::PageError {
            message: message.into(),
        }
    }

    /// Create a screenshot error
    #[must_use]
    pub fn screenshot(message: impl Into<String>) -> Self {
        Self::ScreenshotError {
            message: message.into(),
        }
    }

    /// Create an assertion failure, for use in test bodies
    #[must_use]
    pub fn assertion(message: impl Into<String>) -> Self {
        Self::AssertionFailed {
            message: message.into(),
        }
    }

    /// Whether this error is a configuration error
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. })
    }

    /// Whether this error is the visual divergence policy failure
    #[must_use]
    pub const fn is_divergence(&self) -> bool {
        matches!(self, Self::ScreenshotDivergence { .. })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_message() {
        let err = VistazoError::config("port out of range");
        assert!(err.is_config());
        assert!(err.to_string().contains("Configuration"));
        assert!(err.to_string().contains("port out of range"));
    }

    #[test]
    fn test_divergence_message_is_verbatim() {
        let err = VistazoError::ScreenshotDivergence {
            message: "Screen shots diverged".to_string(),
            divergence: 0.5,
            diff_path: "x-diff.png".into(),
        };
        assert!(err.is_divergence());
        assert_eq!(err.to_string(), "Screen shots diverged");
    }

    #[test]
    fn test_io_error_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: VistazoError = io_err.into();
        assert!(err.to_string().contains("I/O"));
    }
}
