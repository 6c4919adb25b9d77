use std::net::IpAddr;
use thiserror::Error;
use tracing::{debug, error, warn};

/// Coarse classification of a [`PreviewError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Retrying with the same input cannot succeed (4xx, blocked address, bad URL).
    Permanent,
    /// A retry might succeed (5xx, timeout, connection failure).
    Transient,
    /// An optional document was malformed; the stage that needed it is skipped.
    Validation,
    /// Raised by a matched plugin.
    Plugin,
    /// The selected extractor produced no summary at all.
    EmptyResult,
}

#[derive(Debug, Error)]
pub enum PreviewError {
    #[error("Failed to parse URL: {0}")]
    UrlParseError(#[from] url::ParseError),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("URL scheme not allowed: {0}")]
    InvalidUrlScheme(String),

    #[error("Connection to {host} blocked: {addr} is a private address")]
    PrivateAddressBlocked { host: String, addr: IpAddr },

    #[error("Client error {status}: {message}")]
    ClientError { status: u16, message: String },

    #[error("Server error {status}: {message}")]
    ServerError { status: u16, message: String },

    #[error("Request timeout: {0}")]
    TimeoutError(String),

    #[error("Connection failed: {0}")]
    ConnectionError(String),

    #[error("Failed to fetch content: {0}")]
    FetchError(String),

    #[error("Invalid content type: {0}")]
    InvalidContentType(String),

    #[error("Redirect failed: {0}")]
    RedirectError(String),

    #[error("Invalid oEmbed document: {0}")]
    InvalidOEmbed(String),

    #[error("Failed to extract metadata: {0}")]
    ExtractError(String),

    #[error("Plugin {plugin} failed: {message}")]
    PluginError { plugin: String, message: String },

    #[error("failed summarize")]
    EmptyResult,
}

impl PreviewError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PreviewError::UrlParseError(_)
            | PreviewError::InvalidUrl(_)
            | PreviewError::InvalidUrlScheme(_)
            | PreviewError::PrivateAddressBlocked { .. }
            | PreviewError::ClientError { .. }
            | PreviewError::InvalidContentType(_)
            | PreviewError::RedirectError(_)
            | PreviewError::ExtractError(_) => ErrorKind::Permanent,
            PreviewError::ServerError { .. }
            | PreviewError::TimeoutError(_)
            | PreviewError::ConnectionError(_)
            | PreviewError::FetchError(_) => ErrorKind::Transient,
            PreviewError::InvalidOEmbed(_) => ErrorKind::Validation,
            PreviewError::PluginError { .. } => ErrorKind::Plugin,
            PreviewError::EmptyResult => ErrorKind::EmptyResult,
        }
    }

    pub fn is_permanent(&self) -> bool {
        self.kind() == ErrorKind::Permanent
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// Builds the error for a non-2xx response. Only 4xx is permanent.
    pub fn from_status(status: reqwest::StatusCode, url: &str) -> Self {
        let message = format!(
            "{} returned {}",
            url,
            status.canonical_reason().unwrap_or("unknown status")
        );
        if status.is_client_error() {
            PreviewError::ClientError {
                status: status.as_u16(),
                message,
            }
        } else {
            PreviewError::ServerError {
                status: status.as_u16(),
                message,
            }
        }
    }

    /// Maps a transport error, recovering guard rejections raised inside the
    /// connector from the error's source chain.
    pub fn from_reqwest(err: reqwest::Error, url: &str) -> Self {
        if let Some(blocked) = find_blocked_address(&err) {
            return PreviewError::PrivateAddressBlocked {
                host: blocked.host.clone(),
                addr: blocked.addr,
            };
        }
        if err.is_timeout() {
            PreviewError::TimeoutError(format!("{url}: {err}"))
        } else if err.is_redirect() {
            PreviewError::RedirectError(format!("{url}: {err}"))
        } else if err.is_connect() {
            PreviewError::ConnectionError(format!("{url}: {err}"))
        } else if let Some(status) = err.status() {
            PreviewError::from_status(status, url)
        } else {
            PreviewError::FetchError(format!("{url}: {err}"))
        }
    }

    pub fn log(&self) {
        match self {
            PreviewError::UrlParseError(e) => {
                warn!(error = %e, "URL parsing failed");
            }
            PreviewError::InvalidUrl(e) | PreviewError::InvalidUrlScheme(e) => {
                warn!(error = %e, "URL rejected");
            }
            PreviewError::PrivateAddressBlocked { host, addr } => {
                warn!(host = %host, addr = %addr, "Blocked connection to private address");
            }
            PreviewError::ClientError { status, message } => {
                warn!(status = status, error = %message, "Target returned client error");
            }
            PreviewError::ServerError { status, message } => {
                error!(status = status, error = %message, "Target returned server error");
            }
            PreviewError::TimeoutError(e) => {
                warn!(error = %e, "Request timed out");
            }
            PreviewError::ConnectionError(e) | PreviewError::FetchError(e) => {
                error!(error = %e, "Content fetch failed");
            }
            PreviewError::InvalidContentType(e) => {
                warn!(error = %e, "Invalid content type received");
            }
            PreviewError::RedirectError(e) => {
                warn!(error = %e, "Redirect chain rejected");
            }
            PreviewError::InvalidOEmbed(e) => {
                debug!(error = %e, "oEmbed document discarded");
            }
            PreviewError::ExtractError(e) => {
                error!(error = %e, "Metadata extraction failed");
            }
            PreviewError::PluginError { plugin, message } => {
                error!(plugin = %plugin, error = %message, "Plugin failed");
            }
            PreviewError::EmptyResult => {
                error!("Extractor produced no summary");
            }
        }
    }
}

/// Raised by the guarded resolver and redirect policy; travels inside
/// `reqwest::Error` until [`PreviewError::from_reqwest`] unwraps it.
#[derive(Debug, Clone, Error)]
#[error("{host} resolves to private address {addr}")]
pub struct BlockedAddress {
    pub host: String,
    pub addr: IpAddr,
}

fn find_blocked_address(err: &reqwest::Error) -> Option<&BlockedAddress> {
    let mut source: Option<&(dyn std::error::Error + 'static)> = std::error::Error::source(err);
    while let Some(current) = source {
        if let Some(blocked) = current.downcast_ref::<BlockedAddress>() {
            return Some(blocked);
        }
        source = current.source();
    }
    None
}

impl From<BlockedAddress> for PreviewError {
    fn from(blocked: BlockedAddress) -> Self {
        PreviewError::PrivateAddressBlocked {
            host: blocked.host,
            addr: blocked.addr,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn status_permanence_follows_4xx_range() {
        let not_found = PreviewError::from_status(StatusCode::NOT_FOUND, "https://example.com");
        assert!(not_found.is_permanent());
        assert!(matches!(
            not_found,
            PreviewError::ClientError { status: 404, .. }
        ));

        let unavailable =
            PreviewError::from_status(StatusCode::SERVICE_UNAVAILABLE, "https://example.com");
        assert!(unavailable.is_transient());

        let not_modified = PreviewError::from_status(StatusCode::NOT_MODIFIED, "https://example.com");
        assert!(!not_modified.is_permanent());
    }

    #[test]
    fn blocked_address_is_permanent() {
        let err: PreviewError = BlockedAddress {
            host: "internal.test".into(),
            addr: "10.0.0.1".parse().unwrap(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Permanent);
        assert!(err.to_string().contains("10.0.0.1"));
    }

    #[test]
    fn plugin_and_empty_kinds() {
        let plugin = PreviewError::PluginError {
            plugin: "wikipedia".into(),
            message: "fetch failed".into(),
        };
        assert_eq!(plugin.kind(), ErrorKind::Plugin);
        assert_eq!(PreviewError::EmptyResult.kind(), ErrorKind::EmptyResult);
        assert_eq!(
            PreviewError::InvalidOEmbed("bad".into()).kind(),
            ErrorKind::Validation
        );
    }
}
