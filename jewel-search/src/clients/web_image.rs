// Product Page Image Fetcher
//
// Concept: Turn a product page URL into query image bytes
// Algorithm:
// 1. GET the URL; an `image/*` response is the image itself
// 2. Otherwise read the page as HTML and pick the `og:image` meta tag,
//    else the first `<img src>`
// 3. Resolve that reference against the page URL and GET it
// 4. Reject bytes that do not sniff as an image
//
// Tags are located with regular expressions, not a full HTML parser: only
// the first matching meta/img tag matters.

use crate::clients::body_excerpt;
use crate::error::{SearchError, SearchResult};
use regex::Regex;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, Url};
use std::collections::HashMap;

/// Meta `property`/`name` values that carry the page's preview image
const OG_IMAGE_PROPERTIES: &[&str] = &["og:image", "og:image:url", "og:image:secure_url"];

/// Storefronts commonly refuse clients that do not look like a browser
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (compatible; jewel-search)";

/// Fetches the representative image of a web page
pub struct WebImageFetcher {
    client: Client,
    meta_tag: Regex,
    img_tag: Regex,
    attribute: Regex,
}

impl WebImageFetcher {
    /// # Errors
    /// `Config` if a tag pattern fails to compile.
    pub fn new(client: Client) -> SearchResult<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| {
                SearchError::Config(jewel_common::Error::Config(format!(
                    "Invalid HTML tag pattern: {}",
                    e
                )))
            })
        };

        Ok(Self {
            client,
            meta_tag: compile(r"(?is)<meta\b[^>]*>")?,
            img_tag: compile(r"(?is)<img\b[^>]*>")?,
            attribute: compile(r#"(?is)([a-z][a-z0-9:_-]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)?,
        })
    }

    /// Image bytes for `url`: the image itself, or the page's preview image
    ///
    /// # Errors
    /// `ImageFetch` for an invalid URL, a failed request, a page without an
    /// image reference, or a reference that does not resolve to an image.
    pub async fn fetch(&self, url: &str) -> SearchResult<Vec<u8>> {
        let page_url = Url::parse(url.trim())
            .map_err(|e| SearchError::ImageFetch(format!("invalid URL {}: {}", url, e)))?;

        let response = self.get(&page_url).await?;
        let is_image = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.trim_start().to_ascii_lowercase().starts_with("image/"));

        if is_image {
            tracing::debug!(url = %page_url, "URL points directly at an image");
            return image_bytes(&page_url, response).await;
        }

        let html = response
            .text()
            .await
            .map_err(|e| SearchError::ImageFetch(format!("{}: unreadable page: {}", page_url, e)))?;

        let reference = self.find_image_reference(&html).ok_or_else(|| {
            SearchError::ImageFetch(format!("{}: page has no og:image or <img>", page_url))
        })?;
        let image_url = page_url.join(&reference).map_err(|e| {
            SearchError::ImageFetch(format!("{}: bad image reference {}: {}", page_url, reference, e))
        })?;

        tracing::info!(page = %page_url, image = %image_url, "Fetching product image");
        let response = self.get(&image_url).await?;
        image_bytes(&image_url, response).await
    }

    /// Preview image reference in `html`: `og:image` first, then the first `<img src>`
    ///
    /// The reference is returned as written (possibly relative), with `&amp;` decoded.
    pub fn find_image_reference(&self, html: &str) -> Option<String> {
        let og_image = self.meta_tag.find_iter(html).find_map(|tag| {
            let attrs = self.attributes(tag.as_str());
            let property = attrs.get("property").or_else(|| attrs.get("name"))?;
            if !OG_IMAGE_PROPERTIES.contains(&property.to_ascii_lowercase().as_str()) {
                return None;
            }
            attrs.get("content").filter(|c| !c.trim().is_empty()).cloned()
        });

        og_image
            .or_else(|| {
                self.img_tag.find_iter(html).find_map(|tag| {
                    self.attributes(tag.as_str())
                        .remove("src")
                        .filter(|src| !src.trim().is_empty() && !src.starts_with("data:"))
                })
            })
            .map(|reference| reference.trim().replace("&amp;", "&"))
    }

    /// Attributes of one tag, names lowercased
    fn attributes(&self, tag: &str) -> HashMap<String, String> {
        self.attribute
            .captures_iter(tag)
            .filter_map(|caps| {
                let name = caps.get(1)?.as_str().to_ascii_lowercase();
                let value = caps
                    .get(2)
                    .or_else(|| caps.get(3))
                    .or_else(|| caps.get(4))?
                    .as_str()
                    .to_string();
                Some((name, value))
            })
            .collect()
    }

    async fn get(&self, url: &Url) -> SearchResult<reqwest::Response> {
        let response = self
            .client
            .get(url.clone())
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .send()
            .await
            .map_err(|e| SearchError::ImageFetch(format!("{}: request failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::ImageFetch(format!(
                "{} returned {}: {}",
                url,
                status,
                body_excerpt(&body)
            )));
        }
        Ok(response)
    }
}

async fn image_bytes(url: &Url, response: reqwest::Response) -> SearchResult<Vec<u8>> {
    let bytes = response
        .bytes()
        .await
        .map_err(|e| SearchError::ImageFetch(format!("{}: download failed: {}", url, e)))?
        .to_vec();

    match infer::get(&bytes).map(|k| k.matcher_type()) {
        Some(infer::MatcherType::Image) => Ok(bytes),
        _ => Err(SearchError::ImageFetch(format!("{} is not an image", url))),
    }
}
