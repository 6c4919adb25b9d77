use super::Plugin;
use crate::utils::{clip_opt, DESCRIPTION_MAX_CHARS};
use crate::{Fetcher, PlayerDescriptor, PreviewError, Summary};
use async_trait::async_trait;
use percent_encoding::percent_decode_str;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{debug, instrument};
use url::Url;

const HOST_SUFFIX: &str = ".wikipedia.org";
const ICON: &str = "https://wikipedia.org/static/favicon/wikipedia.ico";
const SITE_NAME: &str = "Wikipedia";
const EXTRACT_QUERY: &[(&str, &str)] = &[
    ("format", "json"),
    ("action", "query"),
    ("prop", "extracts"),
    ("exintro", ""),
    ("explaintext", ""),
];

#[derive(Debug, Deserialize)]
struct ApiResponse {
    query: Option<ApiQuery>,
}

#[derive(Debug, Deserialize)]
struct ApiQuery {
    pages: Option<BTreeMap<String, ApiPage>>,
}

#[derive(Debug, Deserialize)]
struct ApiPage {
    title: Option<String>,
    extract: Option<String>,
}

/// Wikipedia articles, summarized through the MediaWiki extracts API.
#[derive(Debug, Clone, Default)]
pub struct WikipediaPlugin {
    api_base: Option<String>,
}

impl WikipediaPlugin {
    /// Sends API queries to `base` instead of `https://<lang>.wikipedia.org`.
    pub fn with_api_base(base: impl Into<String>) -> Self {
        Self {
            api_base: Some(base.into()),
        }
    }

    /// `title` is the decoded article title; it is re-encoded as a query value.
    fn endpoint(&self, lang: &str, title: &str) -> Result<Url, PreviewError> {
        let base = match &self.api_base {
            Some(base) => base.trim_end_matches('/').to_string(),
            None => format!("https://{lang}.wikipedia.org"),
        };
        let api = format!("{base}/w/api.php");
        let mut endpoint =
            Url::parse(&api).map_err(|e| self.error(format!("bad endpoint {api}: {e}")))?;
        endpoint
            .query_pairs_mut()
            .extend_pairs(EXTRACT_QUERY)
            .append_pair("titles", title);
        Ok(endpoint)
    }

    fn error(&self, message: impl Into<String>) -> PreviewError {
        PreviewError::PluginError {
            plugin: self.name().to_string(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl Plugin for WikipediaPlugin {
    fn name(&self) -> &str {
        "wikipedia"
    }

    fn test(&self, url: &Url) -> bool {
        url.host_str().is_some_and(|host| host.ends_with(HOST_SUFFIX))
    }

    #[instrument(level = "debug", skip_all, fields(url = %url), err)]
    async fn summarize(
        &self,
        url: &Url,
        _lang: Option<&str>,
        fetcher: &Fetcher,
    ) -> Result<Option<Summary>, PreviewError> {
        let lang = url
            .host_str()
            .and_then(|host| host.split('.').next())
            .unwrap_or_default();
        let raw_title = url
            .path_segments()
            .and_then(|mut segments| segments.nth(1))
            .unwrap_or_default();
        let title = percent_decode_str(raw_title).decode_utf8_lossy();
        let endpoint = self.endpoint(lang, &title)?;
        debug!(lang, title = %title, endpoint = %endpoint, "Querying Wikipedia");

        let response: ApiResponse = fetcher
            .fetch_json(&endpoint, fetcher.config().json_limit)
            .await?;
        let pages = response
            .query
            .and_then(|query| query.pages)
            .ok_or_else(|| self.error("response has no query.pages"))?;
        let Some(page) = pages.into_values().next() else {
            return Ok(None);
        };

        Ok(Some(Summary {
            title: page.title,
            icon: Some(ICON.to_string()),
            description: clip_opt(page.extract, DESCRIPTION_MAX_CHARS),
            thumbnail: Some(format!(
                "https://wikipedia.org/static/images/project-logos/{lang}wiki.png"
            )),
            sitename: Some(SITE_NAME.to_string()),
            player: PlayerDescriptor::empty(),
            sensitive: false,
        }))
    }
}
