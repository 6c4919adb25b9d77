//! Link-preview summaries for arbitrary web pages.
//!
//! [`summarize`] resolves a URL's redirect chain, fetches the page through a
//! guard that refuses private network addresses, and reduces it to a
//! [`Summary`] using a site plugin when one matches or the general
//! oEmbed / OpenGraph / Twitter Card / HTML fallback chain otherwise.

mod encoding;
mod error;
mod extractor;
mod fetcher;
mod general;
#[cfg(feature = "logging")]
mod logging;
mod oembed;
mod player;
pub mod plugins;
mod redirect;
mod security;
mod summarizer;
mod utils;

pub use encoding::{decode_body, detect_encoding, DecodedBody, EncodingSource};
pub use error::{BlockedAddress, ErrorKind, PreviewError};
pub use extractor::{extract, OpenGraph, PageMetadata, TwitterCard};
pub use fetcher::{
    FetchResult, Fetcher, FetcherConfig, RequestOptions, ALLOW_PRIVATE_IP_ENV,
    DEFAULT_USER_AGENT, TIMEOUT_ENV,
};
pub use general::GeneralExtractor;
#[cfg(feature = "logging")]
pub use logging::{log_error_card, log_preview_card, setup_logging, LogConfig, LogLevelGuard};
pub use oembed::{fetch_oembed_summary, OEmbedDocument};
pub use player::{
    parse_dimension, PlayerDescriptor, PlayerPolicy, DEFAULT_TAG_PERMISSIONS,
    PERMISSION_SAFELIST, PLAYER_MAX_HEIGHT,
};
pub use plugins::{builtin_plugins, match_plugin, Plugin};
pub use redirect::RedirectTracer;
pub use security::{is_private_ip, GuardedResolver, NetworkGuard};
pub use summarizer::{summarize, SummarizeOptions, Summarizer, MAX_CONCURRENT_REQUESTS};
pub use utils::{clip, cleanup_title, DESCRIPTION_MAX_CHARS, TITLE_MAX_CHARS};

use serde::{Deserialize, Serialize};

/// What a page is about, as far as a link preview needs to know.
///
/// `None` means the field was not found; it is never replaced by an empty
/// string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub title: Option<String>,
    pub icon: Option<String>,
    pub description: Option<String>,
    pub thumbnail: Option<String>,
    pub sitename: Option<String>,
    pub player: PlayerDescriptor,
    #[serde(default)]
    pub sensitive: bool,
}

impl Summary {
    /// Copies every field of `other` that is still missing here.
    ///
    /// Fields already set are kept, so when stages are merged in order the
    /// earliest stage that found a value wins. The player is taken as a whole.
    pub fn fill_missing(&mut self, other: Summary) {
        fn fill(slot: &mut Option<String>, value: Option<String>) {
            if slot.is_none() {
                *slot = value;
            }
        }

        fill(&mut self.title, other.title);
        fill(&mut self.icon, other.icon);
        fill(&mut self.description, other.description);
        fill(&mut self.thumbnail, other.thumbnail);
        fill(&mut self.sitename, other.sitename);
        if self.player.is_empty() {
            self.player = other.player;
        }
        self.sensitive |= other.sensitive;
    }

    /// True when no stage contributed anything.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.icon.is_none()
            && self.description.is_none()
            && self.thumbnail.is_none()
            && self.sitename.is_none()
            && self.player.is_empty()
    }
}

/// A summary together with the URL it describes, after redirects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preview {
    pub url: String,
    #[serde(flatten)]
    pub summary: Summary,
}
