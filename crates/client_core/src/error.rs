use shared::error::ApiError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The REST API rejected the request; carries the server's own message.
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("websocket connect failed: {0}")]
    WsConnect(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("server url must start with http:// or https://: {0}")]
    InvalidServerUrl(String),

    #[error("not connected")]
    NotConnected,
}
