use crate::encoding::{decode_body, EncodingSource};
use crate::error::BlockedAddress;
use crate::security::{GuardedResolver, NetworkGuard};
use crate::PreviewError;
use reqwest::header::{HeaderMap, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

pub const DEFAULT_USER_AGENT: &str = "url-summary/0.1.0";

/// Environment variable that disables the network guard when set to a truthy value.
pub const ALLOW_PRIVATE_IP_ENV: &str = "SUMMALY_ALLOW_PRIVATE_IP";

/// Environment variable overriding the request timeout, in seconds.
pub const TIMEOUT_ENV: &str = "SUMMALY_TIMEOUT_SECS";

const HTML_TYPES: &[&str] = &["text/html", "application/xhtml+xml"];
const JSON_TYPES: &[&str] = &["application/json", "application/json+oembed"];

/// Configuration of the HTTP client used for every request of a call.
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use url_summary::FetcherConfig;
///
/// let config = FetcherConfig {
///     timeout: Duration::from_secs(5),
///     ..Default::default()
/// };
/// assert!(!config.allow_private_ip);
/// ```
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub user_agent: String,
    pub timeout: Duration,
    pub max_redirects: usize,
    /// Test-mode switch: skips the network guard entirely.
    pub allow_private_ip: bool,
    /// Byte limit for HTML pages; longer bodies are truncated.
    pub page_limit: usize,
    /// Byte limit for JSON documents (oEmbed, plugin APIs).
    pub json_limit: usize,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(10),
            max_redirects: 10,
            allow_private_ip: false,
            page_limit: 10 << 20,
            json_limit: 500 << 10,
        }
    }
}

impl FetcherConfig {
    /// Defaults overridden by `SUMMALY_ALLOW_PRIVATE_IP` and `SUMMALY_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(value) = std::env::var(ALLOW_PRIVATE_IP_ENV) {
            config.allow_private_ip = parse_flag(&value);
        }
        if let Some(secs) = std::env::var(TIMEOUT_ENV)
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
        {
            config.timeout = Duration::from_secs(secs);
        }
        config
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_allow_private_ip(mut self, allow: bool) -> Self {
        self.allow_private_ip = allow;
        self
    }

    pub fn with_max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = max_redirects;
        self
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Per-request settings: what we accept, what we keep, in which language.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub accept: &'static str,
    /// Media types the response must declare; empty accepts anything.
    pub allow_types: &'static [&'static str],
    pub limit: usize,
    pub accept_language: Option<String>,
}

impl RequestOptions {
    pub fn html(limit: usize) -> Self {
        Self {
            method: Method::GET,
            accept: "text/html, application/xhtml+xml",
            allow_types: HTML_TYPES,
            limit,
            accept_language: None,
        }
    }

    pub fn json(limit: usize) -> Self {
        Self {
            method: Method::GET,
            accept: "application/json",
            allow_types: JSON_TYPES,
            limit,
            accept_language: None,
        }
    }

    pub fn with_language(mut self, lang: Option<&str>) -> Self {
        self.accept_language = lang.filter(|l| !l.trim().is_empty()).map(str::to_string);
        self
    }

    fn allows(&self, media_type: &str) -> bool {
        self.allow_types.is_empty()
            || self.allow_types.contains(&media_type)
            // application/ld+json, application/activity+json and friends
            || (self.allow_types.contains(&"application/json") && media_type.ends_with("+json"))
    }
}

/// A successful (2xx) response, decoded to text.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// Media type without parameters, lowercased; empty when undeclared.
    pub content_type: String,
    pub encoding: &'static encoding_rs::Encoding,
    pub encoding_source: EncodingSource,
    pub body: String,
}

/// Guarded HTTP access shared by every stage of one summarization call.
#[derive(Clone)]
pub struct Fetcher {
    client: Client,
    trace_client: Client,
    guard: NetworkGuard,
    config: FetcherConfig,
}

impl Fetcher {
    /// Builds guarded clients from `config`. The guard is off only when
    /// `config.allow_private_ip` is set.
    pub fn new(config: FetcherConfig) -> Result<Self, PreviewError> {
        let guard = if config.allow_private_ip {
            debug!("Network guard disabled by configuration");
            NetworkGuard::disabled()
        } else {
            NetworkGuard::enabled()
        };

        let client = Self::client_builder(&config, guard)
            .redirect(guarded_redirect_policy(guard, config.max_redirects))
            .build()
            .map_err(|e| PreviewError::FetchError(format!("failed to build HTTP client: {e}")))?;
        let trace_client = Self::client_builder(&config, guard)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| PreviewError::FetchError(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            trace_client,
            guard,
            config,
        })
    }

    /// Uses a caller-supplied client for everything, guard off. The client's
    /// own timeout and redirect settings apply.
    pub fn with_client(client: Client, config: FetcherConfig) -> Self {
        debug!("Using caller-supplied HTTP client; network guard disabled");
        Self {
            trace_client: client.clone(),
            client,
            guard: NetworkGuard::disabled(),
            config,
        }
    }

    fn client_builder(config: &FetcherConfig, guard: NetworkGuard) -> reqwest::ClientBuilder {
        let builder = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout)
            .pool_max_idle_per_host(10);
        if guard.is_enabled() {
            builder.dns_resolver(Arc::new(GuardedResolver::new(guard)))
        } else {
            builder
        }
    }

    pub fn guard(&self) -> &NetworkGuard {
        &self.guard
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    pub(crate) fn trace_client(&self) -> &Client {
        &self.trace_client
    }

    /// Sends a guarded request and returns the raw response once the status
    /// and content type have been checked.
    async fn send(
        &self,
        url: &Url,
        options: &RequestOptions,
    ) -> Result<reqwest::Response, PreviewError> {
        self.guard.check_url(url).await?;

        let mut request = self
            .client
            .request(options.method.clone(), url.clone())
            .header(ACCEPT, options.accept);
        if let Some(lang) = &options.accept_language {
            request = request.header(ACCEPT_LANGUAGE, lang.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| PreviewError::from_reqwest(e, url.as_str()))?;

        let status = response.status();
        if !status.is_success() {
            debug!(url = %url, status = %status, "Non-success response");
            return Err(PreviewError::from_status(status, url.as_str()));
        }

        if options.method != Method::HEAD {
            let media_type = media_type(response.headers());
            if !options.allows(&media_type) {
                return Err(PreviewError::InvalidContentType(format!(
                    "{url} is {}",
                    if media_type.is_empty() { "undeclared" } else { media_type.as_str() }
                )));
            }
        }

        Ok(response)
    }

    #[instrument(level = "debug", skip_all, fields(url = %url), err)]
    pub async fn fetch(
        &self,
        url: &Url,
        options: &RequestOptions,
    ) -> Result<FetchResult, PreviewError> {
        let mut response = self.send(url, options).await?;

        let final_url = response.url().clone();
        let status = response.status();
        let headers = response.headers().clone();
        let content_type = media_type(&headers);

        let mut bytes: Vec<u8> = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| PreviewError::from_reqwest(e, url.as_str()))?
        {
            let remaining = options.limit.saturating_sub(bytes.len());
            if chunk.len() >= remaining {
                bytes.extend_from_slice(&chunk[..remaining]);
                warn!(url = %url, limit = options.limit, "Body exceeds limit, truncating");
                break;
            }
            bytes.extend_from_slice(&chunk);
        }

        let raw_content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());
        let decoded = decode_body(&bytes, raw_content_type);
        debug!(
            url = %final_url,
            content_length = bytes.len(),
            encoding = decoded.encoding.name(),
            "Fetched body"
        );

        Ok(FetchResult {
            url: final_url,
            status,
            headers,
            content_type,
            encoding: decoded.encoding,
            encoding_source: decoded.source,
            body: decoded.text,
        })
    }

    /// Fetches an HTML page, sending `lang` as `Accept-Language`.
    pub async fn fetch_html(
        &self,
        url: &Url,
        lang: Option<&str>,
    ) -> Result<FetchResult, PreviewError> {
        let options = RequestOptions::html(self.config.page_limit).with_language(lang);
        self.fetch(url, &options).await
    }

    /// Fetches and deserializes a JSON document of at most `limit` bytes.
    pub async fn fetch_json<T: DeserializeOwned>(
        &self,
        url: &Url,
        limit: usize,
    ) -> Result<T, PreviewError> {
        let result = self.fetch(url, &RequestOptions::json(limit)).await?;
        serde_json::from_str(&result.body)
            .map_err(|e| PreviewError::ExtractError(format!("invalid JSON from {url}: {e}")))
    }

    /// HEAD request; true only for a 2xx answer. Failures are not errors here,
    /// but a guard rejection is still never followed by a connection.
    #[instrument(level = "debug", skip_all, fields(url = %url))]
    pub async fn probe(&self, url: &Url) -> bool {
        let options = RequestOptions {
            method: Method::HEAD,
            accept: "*/*",
            allow_types: &[],
            limit: 0,
            accept_language: None,
        };
        match self.send(url, &options).await {
            Ok(_) => true,
            Err(e) => {
                debug!(error = %e, "Probe failed");
                false
            }
        }
    }
}

/// Redirect policy for guarded clients: bounded hop count, and no hop to a
/// private IP literal. Named hosts are covered by the guarded resolver.
fn guarded_redirect_policy(guard: NetworkGuard, max_redirects: usize) -> reqwest::redirect::Policy {
    reqwest::redirect::Policy::custom(move |attempt| {
        if attempt.previous().len() > max_redirects {
            return attempt.error(format!("more than {max_redirects} redirects"));
        }
        match guard.check_literal(attempt.url()) {
            Ok(()) => attempt.follow(),
            Err(blocked) => attempt.error::<BlockedAddress>(blocked),
        }
    })
}

fn media_type(headers: &HeaderMap) -> String {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|ct| ct.split(';').next())
        .map(|mt| mt.trim().to_ascii_lowercase())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_flag_parsing() {
        assert!(parse_flag("true"));
        assert!(parse_flag(" 1 "));
        assert!(parse_flag("YES"));
        assert!(!parse_flag("false"));
        assert!(!parse_flag(""));
    }

    #[test]
    fn test_default_config_keeps_guard_on() {
        let config = FetcherConfig::default();
        assert!(!config.allow_private_ip);
        assert_eq!(config.max_redirects, 10);
        assert_eq!(config.json_limit, 500 * 1024);
    }

    #[test]
    fn test_media_type_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(media_type(&headers), "");
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("Text/HTML; charset=UTF-8"),
        );
        assert_eq!(media_type(&headers), "text/html");
    }

    #[test]
    fn test_content_type_filters() {
        let html = RequestOptions::html(1024);
        assert!(html.allows("text/html"));
        assert!(html.allows("application/xhtml+xml"));
        assert!(!html.allows("image/png"));
        assert!(!html.allows(""));

        let json = RequestOptions::json(1024);
        assert!(json.allows("application/json"));
        assert!(json.allows("application/json+oembed"));
        assert!(!json.allows("text/html"));
    }

    #[test]
    fn test_language_header_is_optional() {
        assert_eq!(
            RequestOptions::html(1).with_language(Some("ja-JP")).accept_language,
            Some("ja-JP".to_string())
        );
        assert_eq!(RequestOptions::html(1).with_language(Some(" ")).accept_language, None);
        assert_eq!(RequestOptions::html(1).with_language(None).accept_language, None);
    }

    #[test]
    fn test_guarded_fetcher_builds() {
        let fetcher = Fetcher::new(FetcherConfig::default()).unwrap();
        assert!(fetcher.guard().is_enabled());

        let open = Fetcher::new(FetcherConfig::default().with_allow_private_ip(true)).unwrap();
        assert!(!open.guard().is_enabled());

        let custom = Fetcher::with_client(Client::new(), FetcherConfig::default());
        assert!(!custom.guard().is_enabled());
    }
}
