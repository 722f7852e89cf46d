//! Error types for the tw-core crate.
//!
//! This module provides the [`ConfigError`] type for failures that happen
//! while a watcher is being configured, before anything is watched.

/// Errors that can occur during configuration loading and validation.
///
/// All of these are fatal at construction time.
///
/// # Examples
///
/// ```
/// use tw_core::ConfigError;
///
/// let error = ConfigError::MissingCallback;
/// assert!(error.to_string().contains("callback"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// No notification callback was supplied.
    #[error("a notify callback is required")]
    MissingCallback,

    /// A configuration option has an invalid value.
    #[error("invalid configuration option '{option}': {reason}")]
    InvalidOption {
        /// The name of the invalid option.
        option: String,
        /// Explanation of why the option is invalid.
        reason: String,
    },

    /// An I/O error occurred while reading configuration.
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_callback_display() {
        assert_eq!(
            ConfigError::MissingCallback.to_string(),
            "a notify callback is required"
        );
    }

    #[test]
    fn test_invalid_option_display() {
        let error = ConfigError::InvalidOption {
            option: "command_capacity".to_owned(),
            reason: "must be greater than zero".to_owned(),
        };
        let msg = error.to_string();
        assert!(msg.contains("command_capacity"));
        assert!(msg.contains("greater than zero"));
    }
}
