//! HLS manifest rewriting
//!
//! Every URI line of a manifest is replaced by a proxy URL carrying a token
//! for the owning session. Directive and blank lines pass through verbatim
//! and line order is preserved.

use super::token;
use url::Url;

/// Media type served for rewritten manifests
pub const MANIFEST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";

/// Media type used for segments when upstream sends none
pub const SEGMENT_CONTENT_TYPE: &str = "video/mp2t";

const VARIANT_STREAM_TAG: &str = "#EXT-X-STREAM-INF";

/// What a proxied URL points at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// A nested manifest (`.m3u8`)
    Manifest,
    /// A media segment or any other binary resource
    Segment,
}

impl ResourceKind {
    /// Classify an upstream URL by the suffix of its path
    pub fn from_url(url: &str) -> Self {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        let path = path.to_ascii_lowercase();
        if path.ends_with(".m3u8") || path.ends_with(".m3u") {
            ResourceKind::Manifest
        } else {
            ResourceKind::Segment
        }
    }

    /// Map a request path extension to a kind
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "m3u8" => Some(ResourceKind::Manifest),
            "ts" => Some(ResourceKind::Segment),
            _ => None,
        }
    }

    /// Extension appended to proxy URLs of this kind
    pub fn extension(self) -> &'static str {
        match self {
            ResourceKind::Manifest => "m3u8",
            ResourceKind::Segment => "ts",
        }
    }
}

/// One manifest line, classified
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestLine<'a> {
    /// Starts with `#`
    Directive(&'a str),
    /// Empty or whitespace only
    Blank(&'a str),
    /// A URI reference, trimmed
    Uri(&'a str),
}

impl<'a> ManifestLine<'a> {
    /// Classify a raw line
    pub fn parse(line: &'a str) -> Self {
        if line.starts_with('#') {
            ManifestLine::Directive(line)
        } else if line.trim().is_empty() {
            ManifestLine::Blank(line)
        } else {
            ManifestLine::Uri(line.trim())
        }
    }
}

/// Directory prefix of a manifest URL: query stripped, path cut after the final `/`
pub fn base_directory(base_url: &str) -> &str {
    let without_query = base_url.split(['?', '#']).next().unwrap_or(base_url);
    match without_query.rfind('/') {
        Some(idx) => &without_query[..=idx],
        None => without_query,
    }
}

/// Resolve a manifest reference against the directory of `base_url`
///
/// Returns `None` when the reference cannot be resolved.
pub fn resolve_reference(base_url: &str, reference: &str) -> Option<String> {
    if reference.starts_with("http://") || reference.starts_with("https://") {
        return Some(reference.to_string());
    }
    Url::parse(base_directory(base_url))
        .and_then(|base| base.join(reference))
        .map(|u| u.to_string())
        .ok()
}

/// Build the public proxy URL for an upstream resource
pub fn proxy_url(proxy_base: &str, session_id: &str, absolute_url: &str) -> String {
    format!(
        "{}/hls/{}.{}",
        proxy_base.trim_end_matches('/'),
        token::encode(session_id, absolute_url),
        ResourceKind::from_url(absolute_url).extension()
    )
}

/// Rewrite every URI line of `text` into a proxy URL bound to `session_id`
pub fn rewrite(text: &str, base_url: &str, session_id: &str, proxy_base: &str) -> String {
    text.split('\n')
        .map(|raw| match ManifestLine::parse(raw) {
            ManifestLine::Directive(_) | ManifestLine::Blank(_) => raw.to_string(),
            ManifestLine::Uri(reference) => match resolve_reference(base_url, reference) {
                Some(absolute) => proxy_url(proxy_base, session_id, &absolute),
                None => {
                    tracing::warn!(
                        "Unresolvable manifest line passed through unchanged: {}",
                        crate::utils::truncate_url(reference)
                    );
                    raw.to_string()
                }
            },
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Read a quoted attribute such as `URI="..."` from a directive line
fn quoted_attribute(line: &str, key: &str) -> Option<String> {
    let needle = format!("{}=\"", key);
    let start = line
        .match_indices(&needle)
        .find(|(idx, _)| {
            *idx == 0 || matches!(line.as_bytes()[idx - 1], b':' | b',' | b' ')
        })
        .map(|(idx, _)| idx + needle.len())?;
    let rest = &line[start..];
    let end = rest.find('"')?;
    Some(rest[..end].to_string())
}

/// Collect nested variant manifests referenced by a master manifest
///
/// Each `#EXT-X-STREAM-INF` contributes its quoted `URI` attribute or, absent
/// that, the next non-blank line. Only manifest-suffixed URLs are returned,
/// in document order and without duplicates.
pub fn extract_variants(text: &str, base_url: &str) -> Vec<String> {
    let lines: Vec<&str> = text.lines().collect();
    let mut variants = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        let line = line.trim();
        if !line.starts_with(VARIANT_STREAM_TAG) {
            continue;
        }

        let reference = quoted_attribute(line, "URI").or_else(|| {
            lines[i + 1..]
                .iter()
                .map(|l| l.trim())
                .find(|l| !l.is_empty())
                .filter(|l| !l.starts_with('#'))
                .map(str::to_string)
        });

        let Some(resolved) = reference.and_then(|r| resolve_reference(base_url, &r)) else {
            continue;
        };

        if ResourceKind::from_url(&resolved) == ResourceKind::Manifest
            && !variants.contains(&resolved)
        {
            variants.push(resolved);
        }
    }

    variants
}
