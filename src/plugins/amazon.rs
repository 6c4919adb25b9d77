use super::Plugin;
use crate::player::PlayerPolicy;
use crate::utils::{clip_opt, DESCRIPTION_MAX_CHARS, TITLE_MAX_CHARS};
use crate::{Fetcher, PreviewError, Summary};
use async_trait::async_trait;
use scraper::{Html, Selector};
use tracing::{debug, instrument};
use url::Url;

/// Storefront hosts served by the Amazon product page layout.
pub const AMAZON_HOSTS: &[&str] = &[
    "www.amazon.com",
    "www.amazon.co.jp",
    "www.amazon.ca",
    "www.amazon.com.br",
    "www.amazon.com.mx",
    "www.amazon.co.uk",
    "www.amazon.de",
    "www.amazon.fr",
    "www.amazon.it",
    "www.amazon.es",
    "www.amazon.nl",
    "www.amazon.cn",
    "www.amazon.in",
    "www.amazon.au",
];

const ICON: &str = "https://www.amazon.com/favicon.ico";
const SITE_NAME: &str = "Amazon";
const PLAYER_PERMISSIONS: &[&str] = &["fullscreen", "encrypted-media"];

/// Product pages on Amazon storefronts.
#[derive(Debug, Clone, Default)]
pub struct AmazonPlugin {
    policy: PlayerPolicy,
}

impl AmazonPlugin {
    pub fn with_policy(policy: PlayerPolicy) -> Self {
        Self { policy }
    }

    /// Reads a product page. Synchronous so the DOM never crosses an await.
    pub fn summarize_page(&self, html: &str, page_url: &Url) -> Summary {
        let document = Html::parse_document(html);

        let title = select_text(&document, "#title");
        let description = select_text(&document, "#productDescription")
            .or_else(|| select_attr(&document, "meta[name='description']", "content"));
        let thumbnail = select_attr(&document, "#landingImage", "src")
            .and_then(|src| page_url.join(&src).ok())
            .map(|u| u.to_string());

        let player_url = twitter_tag(&document, "twitter:player");
        let player = self.policy.synthesize_from_tags(
            player_url.as_deref(),
            twitter_tag(&document, "twitter:player:width").as_deref(),
            twitter_tag(&document, "twitter:player:height").as_deref(),
            PLAYER_PERMISSIONS,
        );

        Summary {
            title: clip_opt(title, TITLE_MAX_CHARS),
            icon: Some(ICON.to_string()),
            description: clip_opt(description, DESCRIPTION_MAX_CHARS),
            thumbnail,
            sitename: Some(SITE_NAME.to_string()),
            player,
            sensitive: false,
        }
    }
}

#[async_trait]
impl Plugin for AmazonPlugin {
    fn name(&self) -> &str {
        "amazon"
    }

    fn test(&self, url: &Url) -> bool {
        url.host_str().is_some_and(|host| AMAZON_HOSTS.contains(&host))
    }

    #[instrument(level = "debug", skip_all, fields(url = %url, lang = ?lang), err)]
    async fn summarize(
        &self,
        url: &Url,
        lang: Option<&str>,
        fetcher: &Fetcher,
    ) -> Result<Option<Summary>, PreviewError> {
        let page = fetcher.fetch_html(url, lang).await?;
        let summary = self.summarize_page(&page.body, &page.url);
        debug!(title = ?summary.title, "Read product page");
        Ok(Some(summary))
    }
}

fn select_text(document: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn select_attr(document: &Html, selector: &str, attr: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .find_map(|el| el.value().attr(attr))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn twitter_tag(document: &Html, key: &str) -> Option<String> {
    select_attr(document, &format!("meta[property='{key}']"), "content")
        .or_else(|| select_attr(document, &format!("meta[name='{key}']"), "content"))
}
