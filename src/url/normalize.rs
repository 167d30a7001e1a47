use crate::{UrlError, UrlResult};
use url::Url;

/// Canonicalizes a possibly-relative URL reference against an optional base
///
/// # Canonicalization Steps
///
/// 1. Resolve `href` against `base` (or parse it alone when there is no base)
/// 2. Only HTTP and HTTPS survive
/// 3. Host is lowercased and a default port is dropped (done by `Url` itself)
/// 4. Path:
///    - Remove dot segments (. and ..) and repeated slashes
///    - Decode percent-escapes of unreserved characters, uppercase the rest
///    - Keep a trailing slash if the reference had one
/// 5. Remove fragment (everything after #)
/// 6. Sort raw query parameters by key without re-encoding; remove an empty query string
///
/// # Returns
///
/// * `Some(String)` - Canonical absolute URL
/// * `None` - The reference or base is malformed, or not HTTP(S)
///
/// # Examples
///
/// ```
/// use wayfarer::url::canonicalize;
///
/// let url = canonicalize("../b/./c?z=1&a=2#top", Some("http://EXAMPLE.com:80/a/x")).unwrap();
/// assert_eq!(url, "http://example.com/b/c?a=2&z=1");
/// ```
pub fn canonicalize(href: &str, base: Option<&str>) -> Option<String> {
    canonical_url(href, base).ok().map(String::from)
}

/// Same as [`canonicalize`] but keeps the parsed `Url` and the failure reason
pub fn canonical_url(href: &str, base: Option<&str>) -> UrlResult<Url> {
    let href = href.trim();

    let mut url = match base {
        Some(base) => Url::parse(base.trim())
            .and_then(|base| base.join(href))
            .map_err(|e| UrlError::Parse(e.to_string()))?,
        None => Url::parse(href).map_err(|e| UrlError::Parse(e.to_string()))?,
    };

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(UrlError::MissingHost);
    }

    let normalized_path = normalize_path(url.path());
    url.set_path(&normalized_path);

    url.set_fragment(None);

    if let Some(query) = url.query() {
        let params = sorted_query_params(query);
        if params.is_empty() {
            url.set_query(None);
        } else {
            url.set_query(Some(&params.join("&")));
        }
    }

    Ok(url)
}

/// Normalizes a URL path: dot segments, repeated slashes, percent-escapes
fn normalize_path(path: &str) -> String {
    let trailing_slash = path.len() > 1 && path.ends_with('/');
    let mut segments: Vec<String> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            _ => segments.push(normalize_percent_encoding(segment)),
        }
    }

    if segments.is_empty() {
        return "/".to_string();
    }

    let mut result = format!("/{}", segments.join("/"));
    if trailing_slash {
        result.push('/');
    }
    result
}

/// Decodes escapes of unreserved characters and uppercases the remaining hex digits
fn normalize_percent_encoding(segment: &str) -> String {
    let bytes = segment.as_bytes();
    let mut out = String::with_capacity(segment.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && bytes[i + 1].is_ascii_hexdigit()
            && bytes[i + 2].is_ascii_hexdigit()
        {
            // Url paths are ASCII, so slicing on byte offsets is safe
            let hex = &segment[i + 1..i + 3];
            if let Ok(value) = u8::from_str_radix(hex, 16) {
                if is_unreserved(value) {
                    out.push(value as char);
                } else {
                    out.push('%');
                    out.push_str(&hex.to_ascii_uppercase());
                }
                i += 3;
                continue;
            }
        }
        out.push(bytes[i] as char);
        i += 1;
    }

    out
}

fn is_unreserved(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~')
}

/// Raw `key=value` pieces of a query, sorted by their still-encoded key
///
/// Pieces are never decoded, so escapes and value-less keys survive as written.
/// Order among equal keys is preserved.
fn sorted_query_params(query: &str) -> Vec<String> {
    let mut params: Vec<&str> = query.split('&').filter(|param| !param.is_empty()).collect();

    params.sort_by_key(|param| param.split_once('=').map_or(*param, |(key, _)| key));

    params.into_iter().map(str::to_string).collect()
}
