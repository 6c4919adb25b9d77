use crate::extractor::{extract, PageMetadata};
use crate::oembed::fetch_oembed_summary;
use crate::player::PlayerPolicy;
use crate::utils::{cleanup_title, clip_opt, DESCRIPTION_MAX_CHARS, TITLE_MAX_CHARS};
use crate::{Fetcher, PreviewError, Summary};
use tracing::{debug, instrument};
use url::Url;

/// Summarizes pages no plugin claims: oEmbed first, then OpenGraph, Twitter
/// Card and plain HTML, each stage only filling what earlier ones left empty.
pub struct GeneralExtractor<'a> {
    fetcher: &'a Fetcher,
    policy: &'a PlayerPolicy,
}

impl<'a> GeneralExtractor<'a> {
    pub fn new(fetcher: &'a Fetcher, policy: &'a PlayerPolicy) -> Self {
        Self { fetcher, policy }
    }

    #[instrument(level = "debug", skip_all, fields(url = %url), err)]
    pub async fn summarize(&self, url: &Url, lang: Option<&str>) -> Result<Summary, PreviewError> {
        let page = self.fetcher.fetch_html(url, lang).await?;
        // Parsed and dropped before the next await; the DOM is not Send.
        let metadata = extract(&page.body, &page.url);
        self.summarize_metadata(&metadata).await
    }

    /// Runs the stages over already extracted metadata. Only oEmbed discovery
    /// and the favicon probe touch the network.
    pub async fn summarize_metadata(&self, metadata: &PageMetadata) -> Result<Summary, PreviewError> {
        let mut summary = Summary::default();

        if let Some(href) = metadata.oembed_href.as_deref() {
            match fetch_oembed_summary(self.fetcher, &metadata.url, href, self.policy).await {
                Ok(found) => summary.fill_missing(found),
                Err(e) => debug!(href = %href, error = %e, "Discarding oEmbed document"),
            }
        }
        summary.fill_missing(metadata.open_graph_summary(self.policy));
        summary.fill_missing(metadata.twitter_summary(self.policy));
        summary.fill_missing(metadata.generic_summary());

        if summary.icon.is_none() {
            summary.icon = self.probe_favicon(&metadata.url).await;
        }

        Ok(finalize(summary))
    }

    async fn probe_favicon(&self, page_url: &Url) -> Option<String> {
        let favicon = page_url.join("/favicon.ico").ok()?;
        if self.fetcher.probe(&favicon).await {
            Some(favicon.to_string())
        } else {
            debug!(url = %favicon, "No favicon at the default location");
            None
        }
    }
}

/// Clips text fields, strips the site name from the title and drops a
/// description that only repeats the title.
fn finalize(mut summary: Summary) -> Summary {
    let sitename = summary
        .sitename
        .take()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let title = clip_opt(summary.title.take(), TITLE_MAX_CHARS);
    let description = clip_opt(summary.description.take(), DESCRIPTION_MAX_CHARS);
    summary.description = description.filter(|d| Some(d) != title.as_ref());

    summary.title = match (title, sitename.as_deref()) {
        (Some(title), Some(site)) => Some(cleanup_title(&title, site)),
        (title, _) => title,
    }
    .filter(|t| !t.is_empty())
    .or_else(|| sitename.clone());
    summary.sitename = sitename;

    summary
}
