//! Configuration and startup error types

use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No API keys configured: {0}")]
    NoCredentials(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result alias using common Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_includes_context() {
        let config_err = Error::Config("max_attempts must be greater than 0".into());
        assert_eq!(
            config_err.to_string(),
            "Configuration error: max_attempts must be greater than 0"
        );

        let io_err = Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "file not found",
        ));
        assert!(
            io_err.to_string().starts_with("I/O error:"),
            "got: {}",
            io_err
        );
    }

    #[test]
    fn no_credentials_names_the_source() {
        let err = Error::NoCredentials("set GOOGLE_API_KEY or api_keys_file".into());
        let msg = err.to_string();
        assert!(msg.starts_with("No API keys configured"), "got: {msg}");
        assert!(msg.contains("GOOGLE_API_KEY"), "got: {msg}");
    }

    #[test]
    fn toml_error_converts() {
        let parse: std::result::Result<toml::Value, toml::de::Error> = toml::from_str("[[[");
        let err: Error = parse.unwrap_err().into();
        let debug = format!("{:?}", err);
        assert!(
            debug.contains("Toml"),
            "Debug should include variant name, got: {debug}"
        );
    }
}
