use crate::player::PlayerPolicy;
use crate::{Fetcher, PreviewError, Summary};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

const SUPPORTED_VERSION: &str = "1.0";

/// An oEmbed response as served by the provider.
///
/// Providers disagree on whether dimensions and the version are strings or
/// numbers, so those stay loosely typed until validation.
#[derive(Debug, Clone, Deserialize)]
pub struct OEmbedDocument {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub version: Option<Value>,
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub width: Option<Value>,
    #[serde(default)]
    pub height: Option<Value>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author_name: Option<String>,
    #[serde(default)]
    pub author_url: Option<String>,
    #[serde(default)]
    pub provider_name: Option<String>,
    #[serde(default)]
    pub provider_url: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
}

impl OEmbedDocument {
    fn has_supported_version(&self) -> bool {
        match &self.version {
            Some(Value::String(v)) => v.trim() == SUPPORTED_VERSION,
            Some(Value::Number(n)) => n.as_f64() == Some(1.0),
            _ => false,
        }
    }

    /// Turns a validated document into the fields it contributes to a summary.
    ///
    /// `video` and `rich` need a bare https iframe; `photo` needs an https
    /// image URL. Anything else is rejected with [`PreviewError::InvalidOEmbed`].
    pub fn into_summary(self, policy: &PlayerPolicy) -> Result<Summary, PreviewError> {
        if !self.has_supported_version() {
            return Err(PreviewError::InvalidOEmbed(format!(
                "unsupported version {:?}",
                self.version
            )));
        }

        let title = self.title.filter(|t| !t.trim().is_empty());
        match self.kind.as_str() {
            "video" | "rich" => {
                let html = self
                    .html
                    .ok_or_else(|| PreviewError::InvalidOEmbed("missing html".into()))?;
                let width = self.width.as_ref().and_then(dimension_text);
                let height = self.height.as_ref().and_then(dimension_text);
                let player =
                    policy.synthesize_from_oembed(&html, width.as_deref(), height.as_deref());
                if player.is_empty() {
                    return Err(PreviewError::InvalidOEmbed(
                        "html is not a usable https iframe".into(),
                    ));
                }
                Ok(Summary {
                    title,
                    player,
                    ..Summary::default()
                })
            }
            "photo" => {
                let url = self
                    .url
                    .filter(|u| Url::parse(u).is_ok_and(|parsed| parsed.scheme() == "https"))
                    .ok_or_else(|| PreviewError::InvalidOEmbed("photo without https url".into()))?;
                Ok(Summary {
                    title,
                    thumbnail: Some(url),
                    ..Summary::default()
                })
            }
            other => Err(PreviewError::InvalidOEmbed(format!(
                "unsupported type {other}"
            ))),
        }
    }
}

fn dimension_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Fetches the oEmbed document advertised at `href` (relative to `page_url`)
/// and reduces it to summary fields.
#[instrument(level = "debug", skip(fetcher, page_url, policy), fields(page = %page_url), err)]
pub async fn fetch_oembed_summary(
    fetcher: &Fetcher,
    page_url: &Url,
    href: &str,
    policy: &PlayerPolicy,
) -> Result<Summary, PreviewError> {
    let endpoint = page_url
        .join(href.trim())
        .map_err(|e| PreviewError::InvalidOEmbed(format!("bad discovery href {href}: {e}")))?;
    debug!(endpoint = %endpoint, "Fetching oEmbed document");

    let document: OEmbedDocument = fetcher
        .fetch_json(&endpoint, fetcher.config().json_limit)
        .await?;
    document.into_summary(policy)
}
