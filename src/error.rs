use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("metrics error: {0}")]
    Prometheus(#[from] prometheus::Error),
    #[error("invalid validator address")]
    InvalidValidatorAddress,
    #[error("validator has no consensus public key")]
    MissingConsensusPubkey,
    #[error("unsupported consensus public key type: {0}")]
    UnsupportedPubkeyType(String),
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("bech32 encoding failed: {0}")]
    Bech32(#[from] bech32::Error),
    #[error("invalid integer: {0}")]
    ParseInt(#[from] std::num::ParseIntError),
    #[error("invalid timestamp: {0}")]
    TimeParse(#[from] time::error::Parse),
    #[error("time formatting failed: {0}")]
    TimeFormat(#[from] time::error::Format),
    #[error(transparent)]
    Generic(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match self {
            Error::InvalidValidatorAddress => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, self.to_string()).into_response()
    }
}
