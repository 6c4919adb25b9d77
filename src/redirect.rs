use crate::{Fetcher, PreviewError};
use reqwest::header::LOCATION;
use std::collections::HashSet;
use tracing::{debug, instrument};
use url::Url;

/// Follows a redirect chain hop by hop so that every hop goes through the
/// network guard, and reports where it ends.
pub struct RedirectTracer<'a> {
    fetcher: &'a Fetcher,
    max_hops: usize,
}

impl<'a> RedirectTracer<'a> {
    pub fn new(fetcher: &'a Fetcher) -> Self {
        Self {
            fetcher,
            max_hops: fetcher.config().max_redirects,
        }
    }

    pub fn with_max_hops(mut self, max_hops: usize) -> Self {
        self.max_hops = max_hops;
        self
    }

    /// Returns the URL the chain starting at `url` ends on.
    ///
    /// A cycle or more than `max_hops` redirects is a [`PreviewError::RedirectError`].
    #[instrument(level = "debug", skip_all, fields(url = %url), err)]
    pub async fn resolve(&self, url: &Url) -> Result<Url, PreviewError> {
        let mut current = url.clone();
        let mut visited: HashSet<Url> = HashSet::from([current.clone()]);
        let mut hops = 0usize;

        loop {
            self.fetcher.guard().check_url(&current).await?;

            let response = self
                .fetcher
                .trace_client()
                .get(current.clone())
                .send()
                .await
                .map_err(|e| PreviewError::from_reqwest(e, current.as_str()))?;

            // A caller-supplied client may already have followed some hops.
            let landed = response.url().clone();
            if !response.status().is_redirection() {
                return Ok(landed);
            }
            let Some(location) = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
            else {
                return Ok(landed);
            };

            let next = landed.join(location.trim()).map_err(|e| {
                PreviewError::RedirectError(format!("bad Location {location:?} from {landed}: {e}"))
            })?;

            hops += 1;
            if hops > self.max_hops {
                return Err(PreviewError::RedirectError(format!(
                    "more than {} redirects starting at {url}",
                    self.max_hops
                )));
            }
            if !visited.insert(next.clone()) {
                return Err(PreviewError::RedirectError(format!(
                    "redirect cycle at {next}"
                )));
            }

            debug!(from = %landed, to = %next, hop = hops, "Following redirect");
            current = next;
        }
    }
}
