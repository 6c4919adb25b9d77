use crate::player::{PlayerPolicy, DEFAULT_TAG_PERMISSIONS};
use crate::Summary;
use scraper::{Html, Selector};
use std::collections::HashMap;
use tracing::debug;
use url::Url;

const OEMBED_TYPE: &str = "application/json+oembed";
const LARGE_IMAGE_CARD: &str = "summary_large_image";

/// `og:*` properties relevant to a preview.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenGraph {
    pub title: Option<String>,
    pub description: Option<String>,
    pub site_name: Option<String>,
    pub image: Option<String>,
    pub video: Option<String>,
    pub video_width: Option<String>,
    pub video_height: Option<String>,
}

/// `twitter:*` card tags relevant to a preview.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TwitterCard {
    pub card: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub player: Option<String>,
    pub player_width: Option<String>,
    pub player_height: Option<String>,
}

/// Everything the general extractor needs from a page, detached from the DOM
/// so it can be carried across awaits.
///
/// Values are raw (untrimmed of decoration, unclipped); `icon` and
/// `thumbnail` are already absolute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageMetadata {
    pub url: Url,
    pub oembed_href: Option<String>,
    pub open_graph: OpenGraph,
    pub twitter: TwitterCard,
    pub title: Option<String>,
    pub description: Option<String>,
    pub application_name: Option<String>,
    pub icon: Option<String>,
    pub thumbnail: Option<String>,
    pub sensitive: bool,
}

/// Parses `html` and collects its preview metadata. `page_url` is the URL
/// the page was served from and the base for relative references.
pub fn extract(html: &str, page_url: &Url) -> PageMetadata {
    let document = Html::parse_document(html);
    let meta = MetaTags::collect(&document);
    let links = LinkTags::collect(&document);

    let open_graph = OpenGraph {
        title: meta.get("og:title"),
        description: meta.get("og:description"),
        site_name: meta.get("og:site_name"),
        image: meta.first(&["og:image", "og:image:url", "og:image:secure_url"]),
        video: meta.first(&["og:video", "og:video:url", "og:video:secure_url"]),
        video_width: meta.get("og:video:width"),
        video_height: meta.get("og:video:height"),
    };
    let twitter = TwitterCard {
        card: meta.get("twitter:card"),
        title: meta.get("twitter:title"),
        description: meta.get("twitter:description"),
        image: meta.first(&["twitter:image", "twitter:image:src"]),
        player: meta.get("twitter:player"),
        player_width: meta.get("twitter:player:width"),
        player_height: meta.get("twitter:player:height"),
    };

    let thumbnail = links
        .image_src
        .or(links.apple_touch_icon)
        .or_else(|| itemprop_image(&document))
        .and_then(|href| absolutize(page_url, &href));
    let icon = links.icon.and_then(|href| absolutize(page_url, &href));

    let metadata = PageMetadata {
        url: page_url.clone(),
        oembed_href: links.oembed,
        open_graph,
        twitter,
        title: document_title(&document),
        description: meta.get("description"),
        application_name: meta.get("application-name"),
        icon,
        thumbnail,
        sensitive: is_sensitive(&document),
    };
    debug!(
        url = %page_url,
        oembed = metadata.oembed_href.is_some(),
        meta_tags = meta.len(),
        "Extracted page metadata"
    );
    metadata
}

impl PageMetadata {
    /// Fields declared through OpenGraph, including an `og:video` player.
    pub fn open_graph_summary(&self, policy: &PlayerPolicy) -> Summary {
        let og = &self.open_graph;
        let video = og.video.as_deref().and_then(|v| absolutize(&self.url, v));
        Summary {
            title: og.title.clone(),
            description: og.description.clone(),
            sitename: og.site_name.clone(),
            thumbnail: og.image.as_deref().and_then(|i| absolutize(&self.url, i)),
            player: policy.synthesize_from_tags(
                video.as_deref(),
                og.video_width.as_deref(),
                og.video_height.as_deref(),
                DEFAULT_TAG_PERMISSIONS,
            ),
            ..Summary::default()
        }
    }

    /// Fields declared through Twitter Card tags. A large-image card never
    /// carries a player.
    pub fn twitter_summary(&self, policy: &PlayerPolicy) -> Summary {
        let card = &self.twitter;
        let player = if card.card.as_deref() == Some(LARGE_IMAGE_CARD) {
            None
        } else {
            card.player.as_deref().and_then(|p| absolutize(&self.url, p))
        };
        Summary {
            title: card.title.clone(),
            description: card.description.clone(),
            thumbnail: card.image.as_deref().and_then(|i| absolutize(&self.url, i)),
            player: policy.synthesize_from_tags(
                player.as_deref(),
                card.player_width.as_deref(),
                card.player_height.as_deref(),
                DEFAULT_TAG_PERMISSIONS,
            ),
            ..Summary::default()
        }
    }

    /// Plain HTML fallbacks. The site name falls back to the host.
    pub fn generic_summary(&self) -> Summary {
        Summary {
            title: self.title.clone(),
            icon: self.icon.clone(),
            description: self.description.clone(),
            thumbnail: self.thumbnail.clone(),
            sitename: self
                .application_name
                .clone()
                .or_else(|| host_with_port(&self.url)),
            sensitive: self.sensitive,
            ..Summary::default()
        }
    }
}

/// `<meta>` contents keyed by lowercased `property` or `name`; the first tag
/// with a given key wins.
struct MetaTags(HashMap<String, String>);

impl MetaTags {
    fn collect(document: &Html) -> Self {
        let mut tags = HashMap::new();
        let Ok(selector) = Selector::parse("meta[content]") else {
            return Self(tags);
        };
        for element in document.select(&selector) {
            let element = element.value();
            let Some(content) = element
                .attr("content")
                .map(str::trim)
                .filter(|c| !c.is_empty())
            else {
                continue;
            };
            for key in [element.attr("property"), element.attr("name")]
                .into_iter()
                .flatten()
            {
                tags.entry(key.trim().to_ascii_lowercase())
                    .or_insert_with(|| content.to_string());
            }
        }
        Self(tags)
    }

    fn get(&self, key: &str) -> Option<String> {
        self.0.get(key).cloned()
    }

    fn first(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|key| self.get(key))
    }

    fn len(&self) -> usize {
        self.0.len()
    }
}

/// The `<link>` hrefs we care about, first occurrence of each.
#[derive(Default)]
struct LinkTags {
    oembed: Option<String>,
    icon: Option<String>,
    image_src: Option<String>,
    apple_touch_icon: Option<String>,
}

impl LinkTags {
    fn collect(document: &Html) -> Self {
        let mut links = Self::default();
        let Ok(selector) = Selector::parse("link[href]") else {
            return links;
        };
        for element in document.select(&selector) {
            let element = element.value();
            let Some(href) = element
                .attr("href")
                .map(str::trim)
                .filter(|h| !h.is_empty())
            else {
                continue;
            };
            let rel = element.attr("rel").unwrap_or_default().to_ascii_lowercase();
            let has_rel = |token: &str| rel.split_ascii_whitespace().any(|t| t == token);

            if links.oembed.is_none()
                && element
                    .attr("type")
                    .is_some_and(|t| t.trim().eq_ignore_ascii_case(OEMBED_TYPE))
            {
                links.oembed = Some(href.to_string());
            }
            if links.icon.is_none() && has_rel("icon") {
                links.icon = Some(href.to_string());
            }
            if links.image_src.is_none() && has_rel("image_src") {
                links.image_src = Some(href.to_string());
            }
            if links.apple_touch_icon.is_none() && has_rel("apple-touch-icon") {
                links.apple_touch_icon = Some(href.to_string());
            }
        }
        links
    }
}

fn document_title(document: &Html) -> Option<String> {
    let selector = Selector::parse("title").ok()?;
    document
        .select(&selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}

fn itemprop_image(document: &Html) -> Option<String> {
    let selector = Selector::parse("meta[itemprop='image']").ok()?;
    document
        .select(&selector)
        .find_map(|el| el.value().attr("content"))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn is_sensitive(document: &Html) -> bool {
    let Ok(selector) = Selector::parse(".tweet") else {
        return false;
    };
    document
        .select(&selector)
        .next()
        .and_then(|el| el.value().attr("data-possibly-sensitive"))
        .is_some_and(|v| v.trim() == "true")
}

fn absolutize(base: &Url, href: &str) -> Option<String> {
    base.join(href.trim()).ok().map(|u| u.to_string())
}

fn host_with_port(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn page_url() -> Url {
        Url::parse("https://example.com/articles/1").unwrap()
    }

    #[test]
    fn test_open_graph_tags() {
        let html = r#"<html><head>
            <meta property="og:title" content="Strawberry Pasta">
            <meta property="og:description" content=" A recipe ">
            <meta property="og:site_name" content="Alice's Kitchen">
            <meta property="og:image" content="/img/pasta.png">
            <meta property="og:video:url" content="https://example.com/embedurl">
            <meta property="og:video:width" content="640">
            <meta property="og:video:height" content="360">
        </head></html>"#;
        let meta = extract(html, &page_url());
        let summary = meta.open_graph_summary(&PlayerPolicy::default());

        assert_eq!(summary.title.as_deref(), Some("Strawberry Pasta"));
        assert_eq!(summary.description.as_deref(), Some("A recipe"));
        assert_eq!(summary.sitename.as_deref(), Some("Alice's Kitchen"));
        assert_eq!(
            summary.thumbnail.as_deref(),
            Some("https://example.com/img/pasta.png")
        );
        assert_eq!(
            summary.player.url.as_deref(),
            Some("https://example.com/embedurl")
        );
        assert_eq!(summary.player.width, Some(640));
        assert_eq!(summary.player.height, Some(360));
        assert_eq!(
            summary.player.allow,
            vec!["autoplay", "encrypted-media", "fullscreen"]
        );
    }

    #[test]
    fn test_twitter_tags_by_name_or_property() {
        let html = r#"<head>
            <meta name="twitter:title" content="By name">
            <meta property="twitter:description" content="By property">
            <meta name="twitter:image:src" content="https://cdn.example.com/a.jpg">
            <meta name="twitter:player" content="https://example.com/player">
            <meta name="twitter:player:height" content="4000">
        </head>"#;
        let summary = extract(html, &page_url()).twitter_summary(&PlayerPolicy::default());

        assert_eq!(summary.title.as_deref(), Some("By name"));
        assert_eq!(summary.description.as_deref(), Some("By property"));
        assert_eq!(
            summary.thumbnail.as_deref(),
            Some("https://cdn.example.com/a.jpg")
        );
        assert_eq!(
            summary.player.url.as_deref(),
            Some("https://example.com/player")
        );
        assert_eq!(summary.player.height, Some(1024));
    }

    #[test]
    fn test_large_image_card_has_no_player() {
        let html = r#"<head>
            <meta name="twitter:card" content="summary_large_image">
            <meta name="twitter:player" content="https://example.com/player">
        </head>"#;
        let summary = extract(html, &page_url()).twitter_summary(&PlayerPolicy::default());
        assert!(summary.player.is_empty());
    }

    #[test]
    fn test_non_https_tag_players_are_dropped() {
        let html = r#"<head>
            <meta property="og:title" content="Clip">
            <meta property="og:video" content="http://insecure.example/v">
            <meta name="twitter:player" content="javascript:alert(document.cookie)">
        </head>"#;
        let meta = extract(html, &page_url());
        let policy = PlayerPolicy::default();

        let og = meta.open_graph_summary(&policy);
        assert_eq!(og.title.as_deref(), Some("Clip"));
        assert!(og.player.is_empty());
        assert!(meta.twitter_summary(&policy).player.is_empty());
    }

    #[test]
    fn test_generic_fallbacks() {
        let html = r#"<html><head>
            <title> Plain &amp; Simple </title>
            <meta name="description" content="Nothing fancy">
            <link rel="shortcut icon" href="/static/favicon.png">
            <link rel="apple-touch-icon" href="/touch.png">
        </head><body></body></html>"#;
        let summary = extract(html, &page_url()).generic_summary();

        assert_eq!(summary.title.as_deref(), Some("Plain & Simple"));
        assert_eq!(summary.description.as_deref(), Some("Nothing fancy"));
        assert_eq!(
            summary.icon.as_deref(),
            Some("https://example.com/static/favicon.png")
        );
        assert_eq!(
            summary.thumbnail.as_deref(),
            Some("https://example.com/touch.png")
        );
        assert_eq!(summary.sitename.as_deref(), Some("example.com"));
        assert!(!summary.sensitive);
    }

    #[test]
    fn test_apple_touch_icon_is_not_an_icon() {
        let html = r#"<head><link rel="apple-touch-icon" href="/touch.png"></head>"#;
        let meta = extract(html, &page_url());
        assert_eq!(meta.icon, None);
    }

    #[test]
    fn test_application_name_and_port_in_host() {
        let url = Url::parse("http://127.0.0.1:8080/").unwrap();
        let meta = extract("<title>x</title>", &url);
        assert_eq!(meta.generic_summary().sitename.as_deref(), Some("127.0.0.1:8080"));

        let meta = extract(
            r#"<meta name="application-name" content="My App">"#,
            &url,
        );
        assert_eq!(meta.generic_summary().sitename.as_deref(), Some("My App"));
    }

    #[test]
    fn test_oembed_discovery_link() {
        let html = r#"<head>
            <link rel="alternate" type="text/xml+oembed" href="/oembed.xml">
            <link rel="alternate" type="application/json+oembed" href="/oembed.json">
            <link rel="alternate" type="application/json+oembed" href="/second.json">
        </head>"#;
        let meta = extract(html, &page_url());
        assert_eq!(meta.oembed_href.as_deref(), Some("/oembed.json"));
    }

    #[test]
    fn test_sensitive_flag() {
        let html = r#"<body><div class="tweet" data-possibly-sensitive="true"></div></body>"#;
        assert!(extract(html, &page_url()).sensitive);

        let html = r#"<body><div class="tweet" data-possibly-sensitive="false"></div></body>"#;
        assert!(!extract(html, &page_url()).sensitive);
    }

    #[test]
    fn test_first_meta_tag_wins() {
        let html = r#"<head>
            <meta property="og:title" content="">
            <meta property="og:title" content="First">
            <meta property="og:title" content="Second">
        </head>"#;
        let meta = extract(html, &page_url());
        assert_eq!(meta.open_graph.title.as_deref(), Some("First"));
    }
}
