//! Model-page URL parsing

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Error, Result};

/// Matches `…/models/<modelId>` with an optional trailing path segment.
fn model_path_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"/models/(\d+)(?:/|$|\?)").unwrap_or_else(|e| {
            // The pattern is a compile-time constant; this cannot fail at runtime.
            unreachable!("invalid model path regex: {e}")
        })
    })
}

/// Extract `(model_id, version_id)` from a model-page URL.
///
/// Accepted forms:
/// - `https://host/models/12345`
/// - `https://host/models/12345/some-slug`
/// - `https://host/models/12345?modelVersionId=67890`
///
/// # Errors
///
/// Returns [`Error::InvalidUrl`] when no numeric model id can be extracted.
pub fn parse_model_url(raw: &str) -> Result<(i64, Option<i64>)> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidUrl("empty URL".to_string()));
    }

    let captures = model_path_re()
        .captures(trimmed)
        .ok_or_else(|| Error::InvalidUrl(trimmed.to_string()))?;
    let model_id: i64 = captures[1]
        .parse()
        .map_err(|_| Error::InvalidUrl(trimmed.to_string()))?;

    // modelVersionId arrives as a query parameter; parse it leniently so a
    // malformed value degrades to "latest version" instead of a hard error.
    let version_id = url::Url::parse(trimmed).ok().and_then(|u| {
        u.query_pairs()
            .find(|(k, _)| k == "modelVersionId")
            .and_then(|(_, v)| v.parse::<i64>().ok())
    });

    Ok((model_id, version_id))
}

/// Last path segment of an image URL, used as the local filename.
///
/// Falls back to `image` when the URL has no usable path segment.
pub fn image_basename(raw: &str) -> String {
    let name = url::Url::parse(raw)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|segments| segments.filter(|s| !s.is_empty()).next_back())
                .map(str::to_string)
        })
        .unwrap_or_else(|| {
            raw.rsplit('/')
                .next()
                .unwrap_or("image")
                .split('?')
                .next()
                .unwrap_or("image")
                .to_string()
        });
    if name.is_empty() {
        "image".to_string()
    } else {
        name
    }
}
