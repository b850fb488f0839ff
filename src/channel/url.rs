//! URL carrier: a prompt travels as one percent-encoded query parameter.
//!
//! Extraction never fails loudly. A missing, empty or undecodable value is
//! simply "no prompt". Cleanup rewrites the current history entry without the
//! parameter and leaves everything else byte-for-byte alone.

use crate::dom::Document;
use crate::errors::{InjectorError, InjectorResult};

/// Percent-encodes `text` as UTF-8 for use as a query value.
pub fn encode_prompt(text: &str) -> String {
    urlencoding::encode(text).into_owned()
}

/// Decodes a raw query component using form rules (`+` is a space). A `%`
/// not followed by two hex digits, or bytes that are not UTF-8, give `None`.
fn decode_component(raw: &str) -> Option<String> {
    if !escapes_are_well_formed(raw) {
        return None;
    }
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced).ok().map(|s| s.into_owned())
}

fn escapes_are_well_formed(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            match bytes.get(i + 1..i + 3) {
                Some([hi, lo]) if hi.is_ascii_hexdigit() && lo.is_ascii_hexdigit() => i += 3,
                _ => return false,
            }
        } else {
            i += 1;
        }
    }
    true
}

fn split_pair(pair: &str) -> (&str, &str) {
    pair.split_once('=').unwrap_or((pair, ""))
}

/// `base` with `param=<encoded text>` appended to its query.
pub fn prompt_url(base: &str, param: &str, text: &str) -> InjectorResult<String> {
    let mut url = url::Url::parse(base)?;
    let pair = format!("{}={}", encode_prompt(param), encode_prompt(text));
    let query = match url.query() {
        Some(q) if !q.is_empty() => format!("{q}&{pair}"),
        _ => pair,
    };
    url.set_query(Some(query.as_str()));
    Ok(url.to_string())
}

/// The decoded value of the first `param` in `location`, if usable.
pub fn extract_prompt(location: &str, param: &str) -> Option<String> {
    let url = match url::Url::parse(location) {
        Ok(url) => url,
        Err(e) => {
            tracing::debug!(error = %e, "location is not a URL; no prompt");
            return None;
        }
    };
    let query = url.query()?;

    let raw = query
        .split('&')
        .map(split_pair)
        .find(|(name, _)| decode_component(name).as_deref() == Some(param))
        .map(|(_, value)| value)?;

    match decode_component(raw) {
        Some(prompt) if !prompt.is_empty() => Some(prompt),
        Some(_) => {
            tracing::debug!(param, "prompt parameter is empty");
            None
        }
        None => {
            tracing::warn!(param, "prompt parameter is not valid percent-encoded UTF-8; ignoring");
            None
        }
    }
}

/// `location` without any `param` pairs, or `None` when there is nothing to strip.
pub fn strip_prompt_param(location: &str, param: &str) -> InjectorResult<Option<String>> {
    let mut url = url::Url::parse(location)?;
    let Some(query) = url.query() else {
        return Ok(None);
    };

    let pairs: Vec<&str> = query.split('&').collect();
    let kept: Vec<&str> = pairs
        .iter()
        .copied()
        .filter(|pair| decode_component(split_pair(pair).0).as_deref() != Some(param))
        .collect();
    if kept.len() == pairs.len() {
        return Ok(None);
    }

    let kept = kept.join("&");
    url.set_query(if kept.is_empty() { None } else { Some(kept.as_str()) });
    Ok(Some(url.to_string()))
}

/// Removes `param` from the page address in place. Failures are logged and
/// swallowed: a URL that keeps its parameter is harmless until the next run.
/// Returns true when the address was rewritten.
pub fn cleanup(doc: &dyn Document, param: &str) -> bool {
    let location = doc.location();
    let result = strip_prompt_param(&location, param).and_then(|stripped| match stripped {
        Some(clean) => doc.replace_location(&clean).map(|_| true),
        None => Ok(false),
    });

    match result {
        Ok(true) => {
            tracing::debug!(param, "prompt parameter removed from address");
            true
        }
        Ok(false) => false,
        Err(e) => {
            let e = match e {
                InjectorError::UrlCleanup(_) => e,
                other => InjectorError::UrlCleanup(other.to_string()),
            };
            tracing::warn!(param, error = %e, "could not clean address; leaving it as is");
            false
        }
    }
}
