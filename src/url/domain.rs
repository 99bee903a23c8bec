use url::Url;

/// Extracts the full host from a URL, lowercased.
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Computes the registrable domain (eTLD+1) of a canonical URL's host — the
/// longest suffix of the host that a single party can register, e.g.
/// `blog.example.co.uk` -> `example.co.uk`. Falls back to the bare host when the
/// host is an IP address or the bundled public suffix list has no opinion.
pub fn registrable_domain(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    if matches!(
        url.host(),
        Some(url::Host::Ipv4(_)) | Some(url::Host::Ipv6(_))
    ) {
        return Some(host.to_lowercase());
    }

    let lower = host.to_lowercase();
    match psl::domain(lower.as_bytes()) {
        Some(domain) => Some(String::from_utf8_lossy(domain.as_bytes()).to_string()),
        None => Some(lower),
    }
}
