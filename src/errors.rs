use thiserror::Error;

#[derive(Debug, Error)]
pub enum InjectorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("Element not found within {timeout_ms}ms (locators: {locators:?})")]
    ElementTimeout {
        locators: Vec<String>,
        timeout_ms: u64,
    },

    #[error("Text injection failed: {0}")]
    InjectionFailed(String),

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    #[error("URL cleanup error: {0}")]
    UrlCleanup(String),

    #[error("Message channel error: {0}")]
    Channel(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

impl serde::Serialize for InjectorError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

pub type InjectorResult<T> = Result<T, InjectorError>;
