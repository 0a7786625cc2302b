use scraper::{Html, Selector};
use url::Url;

use linkrot_core::url_utils::{is_http_scheme, normalize, resolve_reference};

/// Result of parsing one page's HTML (§4.3).
#[derive(Debug, Clone)]
pub struct ExtractedPage {
    /// Normalized, deduped, order-preserving within the page.
    pub links: Vec<Url>,
    /// Set only when the tokenizer reported irrecoverable errors *and* at
    /// least one href failed to resolve or normalize (§4.3) — ordinary
    /// recoverable markup alone never trips this.
    pub malformed: bool,
}

fn anchor_selector() -> Selector {
    // Panics only on an invalid selector string, which this literal never is.
    Selector::parse("a[href]").expect("static selector is valid")
}

/// Extracts every same-document link from an HTML page, tolerating broken
/// markup the way a browser would (html5ever never hard-fails on malformed
/// input). `base` is the URL the page was fetched from, used to resolve
/// relative hrefs.
pub fn extract_links(body: &str, base: &Url) -> ExtractedPage {
    let document = Html::parse_document(body);
    let selector = anchor_selector();

    let mut failed_href_count = 0u32;
    let mut links = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for element in document.select(&selector) {
        let href = match element.value().attr("href") {
            Some(h) => h.trim(),
            None => continue,
        };

        if href.is_empty() {
            if seen.insert(base.clone()) {
                links.push(base.clone());
            }
            continue;
        }

        if href.starts_with('#') {
            continue;
        }
        if let Some((scheme, _)) = href.split_once(':') {
            let scheme_lower = scheme.to_ascii_lowercase();
            if scheme_lower != "http" && scheme_lower != "https" && !scheme_lower.contains('/') {
                // Non-http schemes (mailto:, tel:, javascript:, data:, ...) are
                // not crawl targets, not malformed markup.
                continue;
            }
        }

        let resolved = match resolve_reference(base, href) {
            Ok(u) => u,
            Err(_) => {
                failed_href_count += 1;
                continue;
            }
        };

        if !is_http_scheme(&resolved) {
            continue;
        }

        let normalized = match normalize(&resolved, false) {
            Ok(u) => u,
            Err(_) => {
                failed_href_count += 1;
                continue;
            }
        };

        if seen.insert(normalized.clone()) {
            links.push(normalized);
        }
    }

    let malformed = !document.errors.is_empty() && failed_href_count > 0;
    ExtractedPage { links, malformed }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://example.com/dir/page.html").unwrap()
    }

    #[test]
    fn extracts_and_resolves_relative_links() {
        let html = r#"<html><body>
            <a href="../other.html">other</a>
            <a href="/root">root</a>
            <a href="https://example.com/abs">abs</a>
        </body></html>"#;
        let result = extract_links(html, &base());
        let urls: Vec<String> = result.links.iter().map(|u| u.to_string()).collect();
        assert!(urls.contains(&"https://example.com/other.html".to_string()));
        assert!(urls.contains(&"https://example.com/root".to_string()));
        assert!(urls.contains(&"https://example.com/abs".to_string()));
        assert!(!result.malformed);
    }

    #[test]
    fn skips_non_http_schemes_without_marking_malformed() {
        let html = r#"<html><body>
            <a href="mailto:a@example.com">mail</a>
            <a href="javascript:void(0)">js</a>
            <a href="tel:+15551234567">tel</a>
        </body></html>"#;
        let result = extract_links(html, &base());
        assert!(result.links.is_empty());
        assert!(!result.malformed);
    }

    #[test]
    fn empty_href_resolves_to_the_page_itself() {
        let html = r#"<html><body><a href="">self</a></body></html>"#;
        let result = extract_links(html, &base());
        assert_eq!(result.links, vec![base()]);
    }

    #[test]
    fn dedupes_within_the_page_preserving_order() {
        let html = r#"<html><body>
            <a href="/a">1</a>
            <a href="/b">2</a>
            <a href="/a">3</a>
        </body></html>"#;
        let result = extract_links(html, &base());
        let paths: Vec<&str> = result.links.iter().map(|u| u.path()).collect();
        assert_eq!(paths, vec!["/a", "/b"]);
    }

    #[test]
    fn ignores_fragment_only_anchors() {
        let html = r#"<html><body><a href="#section">jump</a></body></html>"#;
        let result = extract_links(html, &base());
        assert!(result.links.is_empty());
    }

    #[test]
    fn clean_markup_is_never_malformed_even_with_an_unresolvable_href() {
        // Well-formed HTML produces no tokenizer errors, so a single bad href
        // must not flip `malformed` on its own: both conditions are required.
        let html = r#"<html><body><a href="http://">bad</a><a href="/ok">ok</a></body></html>"#;
        let result = extract_links(html, &base());
        let paths: Vec<&str> = result.links.iter().map(|u| u.path()).collect();
        assert_eq!(paths, vec!["/ok"]);
        assert!(!result.malformed);
    }
}
