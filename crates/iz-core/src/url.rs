//! URL encoding helpers
//!
//! Responses are fabricated as `data:` URLs, so the body has to survive a
//! percent-encoding round trip byte for byte. The escape set here is the
//! one browsers use for `encodeURIComponent`, which lets the extension
//! decode what we produce with the built-in `decodeURIComponent`.

use std::borrow::Cow;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Characters `encodeURIComponent` leaves alone, removed from the escape set.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

const DATA_SCHEME: &str = "data:";

// =============================================================================
// Percent Encoding
// =============================================================================

/// Percent-encode `s` like `encodeURIComponent`.
#[inline]
pub fn encode_uri_component(s: &str) -> Cow<'_, str> {
    utf8_percent_encode(s, URI_COMPONENT).into()
}

/// Decode a percent-encoded UTF-8 string.
///
/// Returns `None` if the decoded bytes are not valid UTF-8.
pub fn decode_uri_component(s: &str) -> Option<Cow<'_, str>> {
    percent_decode_str(s).decode_utf8().ok()
}

// =============================================================================
// Data URLs
// =============================================================================

/// Build `data:<media type>,<percent-encoded body>`.
///
/// A comma would end the media type early, so anything from the first
/// comma on is dropped.
pub fn build_data_url(media_type: &str, body: &str) -> String {
    let media_type = media_type.split(',').next().unwrap_or_default().trim();
    let encoded = encode_uri_component(body);

    let mut url = String::with_capacity(DATA_SCHEME.len() + media_type.len() + 1 + encoded.len());
    url.push_str(DATA_SCHEME);
    url.push_str(media_type);
    url.push(',');
    url.push_str(&encoded);
    url
}

/// Split a data URL into its media type and still-encoded payload.
pub fn split_data_url(url: &str) -> Option<(&str, &str)> {
    let scheme = url.get(..DATA_SCHEME.len())?;
    if !scheme.eq_ignore_ascii_case(DATA_SCHEME) {
        return None;
    }
    url[DATA_SCHEME.len()..].split_once(',')
}

/// Decode the body of a data URL built by [`build_data_url`].
pub fn decode_data_url(url: &str) -> Option<(&str, String)> {
    let (media_type, payload) = split_data_url(url)?;
    let body = decode_uri_component(payload)?;
    Some((media_type, body.into_owned()))
}
