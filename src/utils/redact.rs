//! Log-safe rendering of upstream URLs and cookie headers

/// Longest URL prefix written to logs
pub const MAX_LOGGED_URL: usize = 96;

/// Shorten a URL for log output, keeping it on a char boundary
pub fn truncate_url(url: &str) -> String {
    if url.len() <= MAX_LOGGED_URL {
        return url.to_string();
    }
    let mut end = MAX_LOGGED_URL;
    while !url.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &url[..end])
}

/// Describe a cookie header without revealing any value
pub fn describe_cookies(cookie_header: Option<&str>) -> String {
    match cookie_header {
        Some(header) if !header.is_empty() => {
            let names: Vec<&str> = header
                .split(';')
                .filter_map(|pair| pair.split('=').next())
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .collect();
            format!("{} cookie(s) [{}]", names.len(), names.join(", "))
        }
        _ => "no cookies".to_string(),
    }
}
