//! Finding image references inside rich-text (HTML) content.
//!
//! Callers only see the [`ReferenceExtractor`] trait, the regex scan below can be
//! replaced by a proper markup parser without touching them.

use std::collections::HashSet;

use regex::Regex;

use crate::blobstore::BlobId;

pub const DEFAULT_API_PATH: &str = "/api/images/";

/// How public image URLs are built, and therefore how they are recognized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUrls {
    api_path: String,
    cdn_url: Option<String>,
}

impl ImageUrls {
    pub fn new(api_path: impl Into<String>, cdn_url: Option<String>) -> Self {
        Self {
            api_path: api_path.into(),
            cdn_url: cdn_url.filter(|url| !url.is_empty()),
        }
    }

    pub fn api_path(&self) -> &str {
        &self.api_path
    }

    pub fn cdn_url(&self) -> Option<&str> {
        self.cdn_url.as_deref()
    }

    pub fn url_for(&self, id: BlobId) -> String {
        match &self.cdn_url {
            Some(cdn_url) => format!("{cdn_url}{id}"),
            None => format!("{}{id}", self.api_path),
        }
    }
}

impl Default for ImageUrls {
    fn default() -> Self {
        Self::new(DEFAULT_API_PATH, None)
    }
}

pub trait ReferenceExtractor: Send + Sync {
    /// All image ids referenced by `body`, duplicates collapsed.
    fn extract(&self, body: &str) -> HashSet<BlobId>;
}

/// Scans `src="..."` attributes with regular expressions.
#[derive(Debug, Clone)]
pub struct PatternExtractor {
    urls: ImageUrls,
    src_attr: Regex,
    /// `None` for an empty api path, which would otherwise match any digits.
    api_id: Option<Regex>,
}

impl PatternExtractor {
    pub fn new(urls: ImageUrls) -> Self {
        let src_attr = Regex::new(r#"src="([^"]*)""#).expect("static regex");
        let api_id = (!urls.api_path().is_empty()).then(|| {
            Regex::new(&format!(r"{}(\d+)", regex::escape(urls.api_path())))
                .expect("escaped prefix followed by a digit group is a valid regex")
        });
        Self {
            urls,
            src_attr,
            api_id,
        }
    }

    pub fn urls(&self) -> &ImageUrls {
        &self.urls
    }

    /// The id encoded in a single image URL, if any.
    pub fn id_from_url(&self, url: &str) -> Option<BlobId> {
        if let Some(rest) = self.urls.cdn_url().and_then(|cdn| url.strip_prefix(cdn)) {
            return leading_id(rest);
        }
        let captures = self.api_id.as_ref()?.captures(url)?;
        leading_id(captures.get(1)?.as_str())
    }
}

impl ReferenceExtractor for PatternExtractor {
    fn extract(&self, body: &str) -> HashSet<BlobId> {
        self.src_attr
            .captures_iter(body)
            .filter_map(|captures| captures.get(1))
            .filter_map(|url| self.id_from_url(url.as_str()))
            .collect()
    }
}

// mirrors a lenient integer parse: `12.png` is 12, `abc` is nothing
fn leading_id(s: &str) -> Option<BlobId> {
    let end = s
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map_or(s.len(), |(idx, _)| idx);
    s[..end].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(extractor: &impl ReferenceExtractor, body: &str) -> Vec<u64> {
        let mut ids: Vec<_> = extractor.extract(body).into_iter().map(|id| id.0).collect();
        ids.sort_unstable();
        ids
    }

    #[test]
    fn test_direct_path() {
        let extractor = PatternExtractor::new(ImageUrls::default());
        let body = r#"<p>hi</p><img src="/api/images/3"><img alt="x" src="/api/images/7">"#;
        assert_eq!(ids(&extractor, body), [3, 7]);

        // absolute urls pointing at the api path count as well
        let body = r#"<img src="https://shop.example/api/images/42">"#;
        assert_eq!(ids(&extractor, body), [42]);
    }

    #[test]
    fn test_empty_and_unrelated() {
        let extractor = PatternExtractor::new(ImageUrls::default());
        assert!(extractor.extract("").is_empty());
        assert!(extractor.extract("no markup at all").is_empty());

        let body = r#"<img src="/static/logo.png"><script src="/api/images/abc"></script>"#;
        assert!(extractor.extract(body).is_empty());
        // single quotes are not recognized
        assert!(extractor.extract("<img src='/api/images/1'>").is_empty());
    }

    #[test]
    fn test_duplicates_and_idempotence() {
        let extractor = PatternExtractor::new(ImageUrls::default());
        let body = r#"<img src="/api/images/5"><img src="/api/images/5"><img src="/api/images/6">"#;

        let first = extractor.extract(body);
        let second = extractor.extract(body);
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn test_cdn_and_direct_both_recognized() {
        let urls = ImageUrls::new(DEFAULT_API_PATH, Some("https://cdn.example.com/img/".into()));
        let extractor = PatternExtractor::new(urls);
        let body = concat!(
            r#"<img src="https://cdn.example.com/img/11">"#,
            r#"<img src="https://cdn.example.com/img/12.png">"#,
            r#"<img src="https://cdn.example.com/img/nope">"#,
            r#"<img src="/api/images/13">"#,
            r#"<img src="https://other-cdn.example.com/img/14">"#,
        );
        assert_eq!(ids(&extractor, body), [11, 12, 13]);
    }

    #[test]
    fn test_url_for() {
        assert_eq!(ImageUrls::default().url_for(BlobId(9)), "/api/images/9");

        let urls = ImageUrls::new(DEFAULT_API_PATH, Some("https://cdn.example.com/".into()));
        assert_eq!(urls.url_for(BlobId(9)), "https://cdn.example.com/9");

        // an empty cdn url means "not configured"
        let urls = ImageUrls::new(DEFAULT_API_PATH, Some(String::new()));
        assert_eq!(urls.cdn_url(), None);
    }

    #[test]
    fn test_generated_urls_are_recognized() {
        for cdn_url in [None, Some("https://cdn.example.com/i/".to_owned())] {
            let extractor = PatternExtractor::new(ImageUrls::new(DEFAULT_API_PATH, cdn_url));
            let url = extractor.urls().url_for(BlobId(77));
            assert_eq!(extractor.id_from_url(&url), Some(BlobId(77)));
        }
    }

    #[test]
    fn test_empty_api_path_matches_nothing() {
        let extractor = PatternExtractor::new(ImageUrls::new("", None));
        let body = r#"<img src="https://photos.example/2024/banner.jpg"><img src="/api/images/3">"#;
        assert!(extractor.extract(body).is_empty());

        // the cdn form still works on its own
        let urls = ImageUrls::new("", Some("https://cdn.example.com/".into()));
        let extractor = PatternExtractor::new(urls);
        let body = r#"<img src="https://cdn.example.com/8"><img src="https://photos.example/2024/a.jpg">"#;
        assert_eq!(ids(&extractor, body), [8]);
    }

    #[test]
    fn test_overflowing_ids_are_dropped() {
        let extractor = PatternExtractor::new(ImageUrls::default());
        let body = r#"<img src="/api/images/99999999999999999999999">"#;
        assert!(extractor.extract(body).is_empty());
    }
}
