//! Entry lookup by site host and by free-text query.
//!
//! Both functions are pure: no storage access, no side effects.

use url::Url;

use crate::model::Entry;

fn host_of(raw: &str) -> Option<String> {
    let parsed = Url::parse(raw.trim()).ok()?;
    parsed.host_str().map(|host| host.to_ascii_lowercase())
}

/// Entries whose URL host equals the host of `target_url`.
///
/// Hosts must match exactly: `accounts.example.com` does not match
/// `example.com`. A malformed target, or a target without a host, matches
/// nothing; malformed entry URLs never match.
pub fn entries_for_host<'a>(entries: &'a [Entry], target_url: &str) -> Vec<&'a Entry> {
    let Some(target) = host_of(target_url) else {
        return Vec::new();
    };

    entries
        .iter()
        .filter(|entry| host_of(&entry.url).as_deref() == Some(target.as_str()))
        .collect()
}

/// Case-insensitive substring search over title, URL, username and tags.
///
/// An empty (or whitespace-only) query returns every entry.
pub fn search<'a>(entries: &'a [Entry], query: &str) -> Vec<&'a Entry> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return entries.iter().collect();
    }

    entries
        .iter()
        .filter(|entry| {
            entry.title.to_lowercase().contains(&needle)
                || entry.url.to_lowercase().contains(&needle)
                || entry.username.to_lowercase().contains(&needle)
                || entry
                    .tags
                    .iter()
                    .any(|tag| tag.to_lowercase().contains(&needle))
        })
        .collect()
}
