use crate::general::GeneralExtractor;
use crate::player::PlayerPolicy;
use crate::plugins::{builtin_plugins, match_plugin, Plugin};
use crate::redirect::RedirectTracer;
use crate::{Fetcher, FetcherConfig, Preview, PreviewError};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Upper bound on summaries a single [`Summarizer`] works on at once.
pub const MAX_CONCURRENT_REQUESTS: usize = 500;

/// Per-call settings for [`summarize`].
#[derive(Clone)]
pub struct SummarizeOptions {
    /// Sent as `Accept-Language` and handed to plugins.
    pub lang: Option<String>,
    pub follow_redirects: bool,
    /// Tried after the built-in plugins.
    pub plugins: Vec<Arc<dyn Plugin>>,
    /// Caller-owned HTTP client. Using one turns the private address guard off.
    pub agent: Option<reqwest::Client>,
    pub config: FetcherConfig,
    pub player_policy: PlayerPolicy,
}

impl Default for SummarizeOptions {
    fn default() -> Self {
        Self {
            lang: None,
            follow_redirects: true,
            plugins: Vec::new(),
            agent: None,
            config: FetcherConfig::default(),
            player_policy: PlayerPolicy::default(),
        }
    }
}

impl SummarizeOptions {
    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = Some(lang.into());
        self
    }

    pub fn with_follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = follow;
        self
    }

    pub fn with_plugin(mut self, plugin: Arc<dyn Plugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn with_agent(mut self, agent: reqwest::Client) -> Self {
        self.agent = Some(agent);
        self
    }

    pub fn with_config(mut self, config: FetcherConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_player_policy(mut self, policy: PlayerPolicy) -> Self {
        self.player_policy = policy;
        self
    }
}

/// Summarizes URLs with one set of options; cheap to clone and share
/// between tasks.
#[derive(Clone)]
pub struct Summarizer {
    fetcher: Fetcher,
    plugins: Arc<[Arc<dyn Plugin>]>,
    lang: Option<String>,
    follow_redirects: bool,
    player_policy: PlayerPolicy,
    semaphore: Arc<Semaphore>,
}

impl Summarizer {
    pub fn new(options: SummarizeOptions) -> Result<Self, PreviewError> {
        let SummarizeOptions {
            lang,
            follow_redirects,
            plugins: extra_plugins,
            agent,
            config,
            player_policy,
        } = options;

        let fetcher = match agent {
            Some(agent) => Fetcher::with_client(agent, config),
            None => Fetcher::new(config)?,
        };

        let plugins: Vec<Arc<dyn Plugin>> = builtin_plugins()
            .iter()
            .cloned()
            .chain(extra_plugins)
            .collect();
        debug!(plugins = plugins.len(), guard = fetcher.guard().is_enabled(), "Summarizer ready");

        Ok(Self {
            fetcher,
            plugins: plugins.into(),
            lang,
            follow_redirects,
            player_policy,
            semaphore: Arc::new(Semaphore::new(MAX_CONCURRENT_REQUESTS)),
        })
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn summarize(&self, url: &str) -> Result<Preview, PreviewError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| PreviewError::FetchError("summarizer is shut down".into()))?;

        match self.run(url).await {
            Ok(preview) => {
                info!(url = %preview.url, title = ?preview.summary.title, "Summarized");
                Ok(preview)
            }
            Err(e) => {
                e.log();
                Err(e)
            }
        }
    }

    /// Summarizes every URL concurrently; results come back in input order.
    pub async fn summarize_batch(&self, urls: &[&str]) -> Vec<Result<Preview, PreviewError>> {
        futures::future::join_all(urls.iter().map(|url| self.summarize(url))).await
    }

    async fn run(&self, url: &str) -> Result<Preview, PreviewError> {
        let requested = Url::parse(url.trim())?;
        self.fetcher.guard().validate_url(&requested)?;

        let resolved = if self.follow_redirects {
            self.resolve_redirects(&requested).await?
        } else {
            requested
        };

        let lang = self.lang.as_deref();
        let summary = match match_plugin(&self.plugins, &resolved) {
            Some(plugin) => {
                debug!(plugin = plugin.name(), url = %resolved, "Using plugin");
                plugin
                    .summarize(&resolved, lang, &self.fetcher)
                    .await?
                    .ok_or(PreviewError::EmptyResult)?
            }
            None => {
                GeneralExtractor::new(&self.fetcher, &self.player_policy)
                    .summarize(&resolved, lang)
                    .await?
            }
        };

        if summary.is_empty() {
            return Err(PreviewError::EmptyResult);
        }

        Ok(Preview {
            url: resolved.to_string(),
            summary,
        })
    }

    /// Follows the redirect chain, keeping the requested URL when tracing
    /// fails. A private address anywhere in the chain still ends the call.
    async fn resolve_redirects(&self, url: &Url) -> Result<Url, PreviewError> {
        match RedirectTracer::new(&self.fetcher).resolve(url).await {
            Ok(resolved) => {
                if resolved != *url {
                    debug!(from = %url, to = %resolved, "Redirect chain resolved");
                }
                Ok(resolved)
            }
            Err(e @ PreviewError::PrivateAddressBlocked { .. }) => Err(e),
            Err(e) => {
                warn!(url = %url, error = %e, "Redirect tracing failed, using requested URL");
                Ok(url.clone())
            }
        }
    }
}

/// Summarizes `url` with a fresh [`Summarizer`] built from `options`.
///
/// # Examples
/// ```no_run
/// use url_summary::{summarize, SummarizeOptions};
///
/// # async fn run() -> Result<(), url_summary::PreviewError> {
/// let preview = summarize("https://example.com/", SummarizeOptions::default().with_lang("en")).await?;
/// println!("{:?}", preview.summary.title);
/// # Ok(())
/// # }
/// ```
pub async fn summarize(url: &str, options: SummarizeOptions) -> Result<Preview, PreviewError> {
    Summarizer::new(options)?.summarize(url).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = SummarizeOptions::default();
        assert!(options.follow_redirects);
        assert!(options.lang.is_none());
        assert!(options.plugins.is_empty());
        assert!(options.agent.is_none());
    }

    #[test]
    fn test_summarizer_is_shareable() {
        fn assert_send_sync<T: Send + Sync + Clone>() {}
        assert_send_sync::<Summarizer>();
    }

    #[tokio::test]
    async fn test_invalid_input_is_permanent() {
        let summarizer = Summarizer::new(SummarizeOptions::default()).unwrap();

        let error = summarizer.summarize("not a url").await.unwrap_err();
        assert!(matches!(error, PreviewError::UrlParseError(_)));
        assert!(error.is_permanent());

        let error = summarizer.summarize("ftp://example.com/file").await.unwrap_err();
        assert!(matches!(error, PreviewError::InvalidUrlScheme(_)));
    }

    #[tokio::test]
    async fn test_loopback_target_is_blocked() {
        let error = summarize("http://127.0.0.1:9/", SummarizeOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(error, PreviewError::PrivateAddressBlocked { .. }));
        assert!(error.is_permanent());
    }
}
