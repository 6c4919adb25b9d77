//! Site-specific summarizers.
//!
//! A plugin claims URLs through [`Plugin::test`]; the first plugin in
//! registry order that claims the resolved URL produces the whole summary.
//! Built-in plugins come first, caller plugins are appended per call.

mod amazon;
mod wikipedia;

pub use amazon::{AmazonPlugin, AMAZON_HOSTS};
pub use wikipedia::WikipediaPlugin;

use crate::{Fetcher, PreviewError, Summary};
use async_trait::async_trait;
use std::sync::{Arc, OnceLock};
use url::Url;

#[async_trait]
pub trait Plugin: Send + Sync {
    /// Short identifier used in logs and [`PreviewError::PluginError`].
    fn name(&self) -> &str;

    /// Whether this plugin handles `url`.
    fn test(&self, url: &Url) -> bool;

    /// Summarizes `url`. Every request must go through `fetcher` so the
    /// caller's network policy applies. `Ok(None)` means nothing was found.
    async fn summarize(
        &self,
        url: &Url,
        lang: Option<&str>,
        fetcher: &Fetcher,
    ) -> Result<Option<Summary>, PreviewError>;
}

static BUILTIN_PLUGINS: OnceLock<Vec<Arc<dyn Plugin>>> = OnceLock::new();

/// The plugins every call starts with, in matching order.
pub fn builtin_plugins() -> &'static [Arc<dyn Plugin>] {
    BUILTIN_PLUGINS.get_or_init(|| {
        vec![
            Arc::new(AmazonPlugin::default()) as Arc<dyn Plugin>,
            Arc::new(WikipediaPlugin::default()) as Arc<dyn Plugin>,
        ]
    })
}

/// First plugin in `plugins` whose `test` accepts `url`.
pub fn match_plugin<'p>(plugins: &'p [Arc<dyn Plugin>], url: &Url) -> Option<&'p Arc<dyn Plugin>> {
    plugins.iter().find(|plugin| plugin.test(url))
}
