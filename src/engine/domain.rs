use url::Url;

use crate::storage::entities::TrackingKey;

/// Synthetic key grouping browser-internal pages (settings, extension pages).
pub const BROWSER_SETTINGS: &str = "browser-settings";
/// Synthetic key grouping local development pages.
pub const LOCALHOST: &str = "localhost";

const INTERNAL_SCHEMES: &[&str] = &["chrome", "chrome-extension", "about", "edge"];

/// Maps a raw URL to the canonical key time is accounted under.
///
/// `None` means untracked: unparseable input, or a host without a dot that is
/// neither local nor browser-internal. Hosts are lowercased by the parser and
/// a leading `www.` is stripped, so both spellings of a site land on one key.
pub fn resolve(url: &str) -> Option<TrackingKey> {
    let parsed = Url::parse(url).ok()?;

    if INTERNAL_SCHEMES.contains(&parsed.scheme()) {
        return Some(BROWSER_SETTINGS.into());
    }

    let host = parsed.host_str()?;
    if host == LOCALHOST || host.starts_with("127.") {
        return Some(LOCALHOST.into());
    }

    if !host.contains('.') {
        return None;
    }

    Some(host.strip_prefix("www.").unwrap_or(host).into())
}
