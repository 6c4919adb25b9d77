use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

/// Largest player height reported; taller players are clamped to it.
pub const PLAYER_MAX_HEIGHT: u32 = 1024;

/// Iframe permissions a player may keep.
pub const PERMISSION_SAFELIST: &[&str] = &[
    "autoplay",
    "clipboard-write",
    "fullscreen",
    "encrypted-media",
    "picture-in-picture",
    "web-share",
];

/// Permissions granted to players declared through OpenGraph or Twitter tags.
pub const DEFAULT_TAG_PERMISSIONS: &[&str] = &["autoplay", "encrypted-media", "fullscreen"];

/// Sanitized description of an embeddable player.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerDescriptor {
    pub url: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub allow: Vec<String>,
}

impl PlayerDescriptor {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.url.is_none()
    }
}

/// Height cap and permission safelist applied to every player.
#[derive(Debug, Clone)]
pub struct PlayerPolicy {
    pub max_height: u32,
    pub safelist: Vec<String>,
}

impl Default for PlayerPolicy {
    fn default() -> Self {
        Self {
            max_height: PLAYER_MAX_HEIGHT,
            safelist: PERMISSION_SAFELIST.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl PlayerPolicy {
    /// Builds a player from a URL and raw dimension strings, as found in
    /// `og:video` or `twitter:player` tags.
    pub fn synthesize_from_tags(
        &self,
        url: Option<&str>,
        width: Option<&str>,
        height: Option<&str>,
        permissions: &[&str],
    ) -> PlayerDescriptor {
        let Some(url) = url.map(str::trim).filter(|u| !u.is_empty()) else {
            return PlayerDescriptor::empty();
        };
        if !is_https(url) {
            debug!(url = %url, "Player tag is not an https URL");
            return PlayerDescriptor::empty();
        }
        PlayerDescriptor {
            url: Some(url.to_string()),
            width: width.and_then(parse_dimension),
            height: self.clamp_height(height.and_then(parse_dimension)),
            allow: self.filter_permissions(permissions.iter().copied()),
        }
    }

    /// Builds a player from an oEmbed `html` fragment.
    ///
    /// The fragment must be a bare `<iframe ...></iframe>` with an https `src`.
    /// `fallback_width`/`fallback_height` come from the oEmbed document and are
    /// used when the iframe has no dimension attributes.
    pub fn synthesize_from_oembed(
        &self,
        html: &str,
        fallback_width: Option<&str>,
        fallback_height: Option<&str>,
    ) -> PlayerDescriptor {
        let html = html.trim();
        if !html.starts_with("<iframe") || !html.ends_with("</iframe>") {
            debug!("oEmbed html is not a bare iframe");
            return PlayerDescriptor::empty();
        }

        let fragment = Html::parse_fragment(html);
        let Ok(selector) = Selector::parse("iframe") else {
            return PlayerDescriptor::empty();
        };
        let Some(iframe) = fragment.select(&selector).next() else {
            return PlayerDescriptor::empty();
        };
        let iframe = iframe.value();

        let Some(src) = iframe.attr("src").map(str::trim) else {
            debug!("oEmbed iframe has no src");
            return PlayerDescriptor::empty();
        };
        if !is_https(src) {
            debug!(src = %src, "oEmbed iframe src is not an https URL");
            return PlayerDescriptor::empty();
        }

        let width = iframe.attr("width").or(fallback_width);
        let height = iframe.attr("height").or(fallback_height);

        let allow_attr = iframe.attr("allow").unwrap_or_default();
        let legacy_fullscreen = iframe
            .attr("allowfullscreen")
            .is_some_and(|v| !v.eq_ignore_ascii_case("false"));
        let tokens = allow_attr
            .split(|c: char| c == ';' || c.is_whitespace())
            .chain(legacy_fullscreen.then_some("fullscreen"));

        PlayerDescriptor {
            url: Some(src.to_string()),
            width: width.and_then(parse_dimension),
            height: self.clamp_height(height.and_then(parse_dimension)),
            allow: self.filter_permissions(tokens),
        }
    }

    fn clamp_height(&self, height: Option<u32>) -> Option<u32> {
        height.map(|h| h.min(self.max_height))
    }

    /// Keeps safelisted tokens, dropping duplicates while preserving the
    /// order in which they were first seen.
    pub fn filter_permissions<'a>(&self, tokens: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        let mut allow: Vec<String> = Vec::new();
        for token in tokens {
            let token = token.trim();
            if token.is_empty() || !self.safelist.iter().any(|s| s == token) {
                continue;
            }
            if !allow.iter().any(|seen| seen == token) {
                allow.push(token.to_string());
            }
        }
        allow
    }
}

fn is_https(url: &str) -> bool {
    Url::parse(url).is_ok_and(|parsed| parsed.scheme() == "https")
}

/// Parses a pixel dimension. Percentages, non-numbers and non-positive values
/// are unknown.
pub fn parse_dimension(raw: &str) -> Option<u32> {
    let raw = raw.trim();
    if raw.ends_with('%') {
        return None;
    }
    let raw = raw.strip_suffix("px").unwrap_or(raw);
    let value: f64 = raw.parse().ok()?;
    if !value.is_finite() || value < 1.0 {
        return None;
    }
    Some(value.min(u32::MAX as f64) as u32)
}
