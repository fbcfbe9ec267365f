//! Locating and removing the callback parameter in request URLs.

use url::form_urlencoded;

/// Query parameter the authentication server appends to the return URL.
pub const CALLBACK_PARAM: &str = "WLS-Response";

/// All values of the callback parameter in a query string, decoded.
pub fn callback_values(query: &str) -> Vec<String> {
    form_urlencoded::parse(query.as_bytes())
        .filter(|(key, _)| key == CALLBACK_PARAM)
        .map(|(_, value)| value.into_owned())
        .collect()
}

/// Returns `url` with every callback parameter removed.
///
/// Other query segments are kept byte-for-byte, since the result is compared
/// against the URL echoed back by the authentication server. The `?` is
/// dropped when nothing remains.
pub fn strip_callback_param(url: &str) -> String {
    let Some((base, query)) = url.split_once('?') else {
        return url.to_string();
    };

    let kept: Vec<&str> = query
        .split('&')
        .filter(|segment| !is_callback_segment(segment))
        .collect();

    if kept.is_empty() {
        base.to_string()
    } else {
        format!("{}?{}", base, kept.join("&"))
    }
}

fn is_callback_segment(segment: &str) -> bool {
    let key = segment.split_once('=').map_or(segment, |(key, _)| key);
    form_urlencoded::parse(key.as_bytes())
        .next()
        .is_some_and(|(decoded, _)| decoded == CALLBACK_PARAM)
}
