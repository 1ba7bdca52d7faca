//! Error types for Presscast

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PresscastError>;

#[derive(Error, Debug)]
pub enum PresscastError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Authorization error: {0}")]
    Auth(#[from] AuthError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl PresscastError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            PresscastError::InvalidInput(_) => 3,
            PresscastError::Auth(_) => 2,
            PresscastError::Config(_) => 1,
            PresscastError::Api(_) => 1,
            PresscastError::Media(_) => 1,
            PresscastError::Database(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("OAuth state parameter does not match the stored value")]
    StateMismatch,

    #[error("No PKCE challenge stored for this authorization")]
    MissingChallenge,

    #[error("Token exchange rejected: {0}")]
    ExchangeRejected(String),

    #[error("API credentials not configured")]
    NotConfigured,

    #[error("Credential storage failed: {0}")]
    Storage(String),

    #[error("Invalid endpoint URL: {0}")]
    InvalidEndpoint(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Media upload failed: {0}")]
    Upload(String),

    #[error("Post creation failed: {0}")]
    Post(String),

    #[error("Connection test failed: {0}")]
    Connection(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Optimization failed: {0}")]
    OptimizationFailed(String),

    #[error("Image IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_invalid_input() {
        let error = PresscastError::InvalidInput("Empty message".to_string());
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_auth_errors() {
        assert_eq!(PresscastError::Auth(AuthError::StateMismatch).exit_code(), 2);
        assert_eq!(
            PresscastError::Auth(AuthError::MissingChallenge).exit_code(),
            2
        );
        assert_eq!(
            PresscastError::Auth(AuthError::ExchangeRejected("invalid_grant".to_string()))
                .exit_code(),
            2
        );
    }

    #[test]
    fn test_exit_code_api_and_media_errors() {
        let upload = PresscastError::Api(ApiError::Upload("bad media".to_string()));
        assert_eq!(upload.exit_code(), 1);

        let post = PresscastError::Api(ApiError::Post("missing id".to_string()));
        assert_eq!(post.exit_code(), 1);

        let media = PresscastError::Media(MediaError::OptimizationFailed(
            "still over the size limit".to_string(),
        ));
        assert_eq!(media.exit_code(), 1);
    }

    #[test]
    fn test_exit_code_config_and_database_errors() {
        let config = PresscastError::Config(ConfigError::MissingField("database.path".to_string()));
        assert_eq!(config.exit_code(), 1);

        let db = PresscastError::Database(DbError::IoError(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "File not found",
        )));
        assert_eq!(db.exit_code(), 1);
    }

    #[test]
    fn test_error_message_formatting_auth() {
        let error = PresscastError::Auth(AuthError::StateMismatch);
        assert_eq!(
            format!("{}", error),
            "Authorization error: OAuth state parameter does not match the stored value"
        );
    }

    #[test]
    fn test_error_message_formatting_api() {
        let error = PresscastError::Api(ApiError::Post("status 403: Forbidden".to_string()));
        assert_eq!(
            format!("{}", error),
            "API error: Post creation failed: status 403: Forbidden"
        );
    }

    #[test]
    fn test_error_message_formatting_media() {
        let error = MediaError::InvalidImage("height is zero".to_string());
        assert_eq!(format!("{}", error), "Invalid image: height is zero");
    }

    #[test]
    fn test_error_conversion_from_component_errors() {
        let auth: PresscastError = AuthError::MissingChallenge.into();
        assert!(matches!(auth, PresscastError::Auth(_)));

        let api: PresscastError = ApiError::Upload("test".to_string()).into();
        assert!(matches!(api, PresscastError::Api(_)));

        let media: PresscastError = MediaError::OptimizationFailed("test".to_string()).into();
        assert!(matches!(media, PresscastError::Media(_)));

        let config: PresscastError = ConfigError::MissingField("test".to_string()).into();
        assert!(matches!(config, PresscastError::Config(_)));
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_ok() -> Result<String> {
            Ok("success".to_string())
        }

        fn returns_err() -> Result<String> {
            Err(PresscastError::InvalidInput("test".to_string()))
        }

        assert!(returns_ok().is_ok());
        assert!(returns_err().is_err());
    }
}
