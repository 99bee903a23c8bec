use crate::UrlError;
use url::Url;

/// Closed set of tracking query parameters dropped during normalization.
const TRACKING_PARAMS: &[&str] = &[
    "fbclid", "gclid", "msclkid", "_ga", "mc_cid", "mc_eid",
];

/// Normalizes a URL into its canonical form.
///
/// Rules, applied in order: validate scheme; lowercase scheme and host; drop the
/// default port for the scheme; resolve `.`/`..` path segments (empty path becomes
/// `/`, trailing slash is preserved iff present in the input); drop the fragment;
/// drop tracking query parameters and any parameter with an empty value, then sort
/// the remainder lexicographically by key; drop the query entirely if nothing is
/// left.
///
/// # Examples
///
/// ```
/// use sumi_ripple::url::normalize_url;
///
/// let url = normalize_url("http://EXAMPLE.com:80/page/?utm_source=x&b=2&a=1").unwrap();
/// assert_eq!(url.as_str(), "http://example.com/page/?a=1&b=2");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let trailing_slash = path_has_trailing_slash(url_str);

    let mut url = Url::parse(url_str).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    let host = url
        .host_str()
        .ok_or(UrlError::MissingDomain)?
        .to_lowercase();
    url.set_host(Some(&host))
        .map_err(|e| UrlError::Malformed(format!("Failed to set host: {}", e)))?;

    // Default ports are implicit; stripping them keeps equivalent URLs equal.
    let is_default_port = matches!(
        (url.scheme(), url.port()),
        ("http", Some(80)) | ("https", Some(443))
    );
    if is_default_port {
        url.set_port(None)
            .map_err(|_| UrlError::Malformed("failed to clear default port".to_string()))?;
    }

    let normalized_path = normalize_path(url.path(), trailing_slash);
    url.set_path(&normalized_path);

    url.set_fragment(None);

    if url.query().is_some() {
        let filtered_params = filter_and_sort_query_params(&url);
        if filtered_params.is_empty() {
            url.set_query(None);
        } else {
            let query_string = filtered_params
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("&");
            url.set_query(Some(&query_string));
        }
    }

    Ok(url)
}

/// Resolves a (possibly relative) URL against a base and normalizes the result.
pub fn resolve(base: &Url, relative: &str) -> Result<Url, UrlError> {
    let joined = base
        .join(relative)
        .map_err(|e| UrlError::Parse(e.to_string()))?;
    normalize_url(joined.as_str())
}

/// Returns true if the raw input's path component ends with a trailing slash
/// (ignoring query/fragment), so normalization can preserve that fact.
fn path_has_trailing_slash(raw: &str) -> bool {
    let without_fragment = raw.split('#').next().unwrap_or(raw);
    let without_query = without_fragment.split('?').next().unwrap_or(without_fragment);
    without_query.ends_with('/')
}

/// Normalizes a URL path by removing dot segments, collapsing empty segments,
/// and applying the input's trailing-slash presence.
fn normalize_path(path: &str, preserve_trailing_slash: bool) -> String {
    if path.is_empty() {
        return "/".to_string();
    }

    let segments: Vec<&str> = path.split('/').collect();
    let mut normalized_segments: Vec<&str> = Vec::new();

    for segment in segments {
        match segment {
            "" | "." => continue,
            ".." => {
                if !normalized_segments.is_empty() {
                    normalized_segments.pop();
                }
            }
            _ => normalized_segments.push(segment),
        }
    }

    if normalized_segments.is_empty() {
        return "/".to_string();
    }

    let mut result = format!("/{}", normalized_segments.join("/"));
    if preserve_trailing_slash && !result.ends_with('/') {
        result.push('/');
    }
    result
}

/// Filters out tracking/empty-valued parameters and sorts the remainder by key.
fn filter_and_sort_query_params(url: &Url) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, value)| !is_tracking_param(key) && !value.is_empty())
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    params.sort_by(|a, b| a.0.cmp(&b.0));
    params
}

/// Checks if a query parameter is in the closed tracking-parameter set.
fn is_tracking_param(key: &str) -> bool {
    TRACKING_PARAMS.contains(&key) || key.starts_with("utm_")
}
