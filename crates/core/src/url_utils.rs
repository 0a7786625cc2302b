use url::Url;

use crate::error::LinkRotError;

/// Normalizes a URL per §4.1: lowercase scheme and host, drop the fragment,
/// strip a trailing slash unless the path is exactly `/`, keep the query
/// string as-is. `is_seed` synthesizes an explicit `/` for an empty path,
/// since the seed URL is typed by the operator and a bare origin is the
/// common case.
pub fn normalize(url: &Url, is_seed: bool) -> Result<Url, LinkRotError> {
    let mut url = url.clone();

    if !is_http_scheme(&url) {
        return Err(LinkRotError::InvalidUrl(format!(
            "unsupported scheme: {}",
            url.scheme()
        )));
    }

    let scheme = url.scheme().to_ascii_lowercase();
    url.set_scheme(&scheme)
        .map_err(|_| LinkRotError::InvalidUrl("failed to normalize scheme".into()))?;

    if let Some(host) = url.host_str() {
        let lower = host.to_ascii_lowercase();
        if lower != host {
            url.set_host(Some(&lower))
                .map_err(|e| LinkRotError::InvalidUrl(format!("failed to normalize host: {e}")))?;
        }
    }

    url.set_fragment(None);

    if is_seed && url.path().is_empty() {
        url.set_path("/");
    }

    if url.path().len() > 1 && url.path().ends_with('/') {
        let trimmed = url.path()[..url.path().len() - 1].to_string();
        url.set_path(&trimmed);
    }

    Ok(url)
}

pub fn is_http_scheme(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}

/// True if `target_host` is the crawl's own domain or a subdomain of it, or
/// vice versa (anchor on a subdomain pointing back at the bare domain still
/// counts as internal). Case-insensitive, ignores port.
pub fn same_domain(target_host: &str, anchor_host: &str) -> bool {
    let a = target_host.to_ascii_lowercase();
    let b = anchor_host.to_ascii_lowercase();
    a == b || a.ends_with(&format!(".{b}")) || b.ends_with(&format!(".{a}"))
}

/// Resolves `reference` against `base` per RFC 3986 (`a[href]` values are
/// frequently relative).
pub fn resolve_reference(base: &Url, reference: &str) -> Result<Url, LinkRotError> {
    base.join(reference)
        .map_err(|e| LinkRotError::InvalidUrl(format!("cannot resolve '{reference}': {e}")))
}
