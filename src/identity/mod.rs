//! Content identity: storage dedup keys and delivery trigger keys.
//!
//! The dedup key answers "have we stored this item from this source?",
//! the trigger key answers "have we already delivered this thing?". They
//! differ for torrents, where the same info-hash may be announced by
//! several feeds or re-announced under a fresh provider id.

use chrono::Utc;
use sha2::{Digest, Sha256};
use url::Url;

use crate::domain::{Content, FeedItem, Source, TorrentIdentity};

pub const MAGNET_PREFIX: &str = "magnet:?xt=urn:btih:";
pub const INFO_HASH_HEX_LEN: usize = 40;
const INSTANT_VIEW_PREFIX: &str = "https://t.me/iv?";

/// Deterministic key for `(source_url, provider_item_id)`.
///
/// Both components are length-prefixed so that moving bytes between them
/// always changes the digest.
pub fn dedup_key(source_url: &str, item_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update((source_url.len() as u64).to_be_bytes());
    hasher.update(source_url.as_bytes());
    hasher.update((item_id.len() as u64).to_be_bytes());
    hasher.update(item_id.as_bytes());
    hex::encode(hasher.finalize())
}

/// Pick the delivery identity: magnet first, then the link when the
/// provider uses it as the id, then the dedup key.
pub fn trigger_key<'a>(
    magnet: Option<&'a str>,
    link: &'a str,
    raw_id: &'a str,
    hash_id: &'a str,
) -> &'a str {
    if let Some(magnet) = magnet {
        return magnet;
    }
    if !link.is_empty() && link == raw_id {
        return link;
    }
    hash_id
}

/// Canonical magnet link if `s` is a btih magnet with a 40-char hex hash.
pub fn magnet_from(s: &str) -> Option<String> {
    let rest = s.strip_prefix(MAGNET_PREFIX)?;
    let hash = rest.split('&').next().unwrap_or_default();
    magnet_for_info_hash(hash)
}

pub fn magnet_for_info_hash(hash: &str) -> Option<String> {
    if hash.len() == INFO_HASH_HEX_LEN && hash.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(format!("{}{}", MAGNET_PREFIX, hash.to_ascii_lowercase()))
    } else {
        None
    }
}

/// Split a chat instant-view wrapper into `(original_url, wrapper_url)`.
pub fn unwrap_instant_view(link: &str) -> Option<(String, String)> {
    if !link.starts_with(INSTANT_VIEW_PREFIX) {
        return None;
    }
    let parsed = Url::parse(link).ok()?;
    let mut original = None;
    let mut has_rhash = false;
    for (key, value) in parsed.query_pairs() {
        match key.as_ref() {
            "url" if !value.is_empty() => original = Some(value.into_owned()),
            "rhash" if !value.is_empty() => has_rhash = true,
            _ => {}
        }
    }
    match original {
        Some(original) if has_rhash => Some((original, link.to_string())),
        _ => None,
    }
}

fn strip_cdata(html: &str) -> String {
    html.replace("<![CDATA[", "").replace("]]>", "")
}

/// Turn a parsed entry into a `Content` row for `source`.
pub fn build_content(source: &Source, item: &FeedItem, torrent: Option<TorrentIdentity>) -> Content {
    let mut raw_id = item.id.clone();
    let mut raw_link = item.link.clone().unwrap_or_default();
    let mut article_url = None;

    if let Some((original, wrapper)) = unwrap_instant_view(&raw_link) {
        if raw_id == wrapper {
            raw_id = original.clone();
        }
        raw_link = original;
        article_url = Some(wrapper);
    }

    let (torrent_url, magnet) = match torrent {
        Some(t) => (Some(t.torrent_url), Some(t.magnet)),
        None => (None, None),
    };

    Content {
        // Keyed on the provider id as published, before any rewriting.
        hash_id: dedup_key(&source.url, &item.id),
        source_id: source.id,
        raw_id,
        raw_link,
        torrent_url,
        magnet,
        title: item.title.as_deref().unwrap_or_default().trim().to_string(),
        description: item.body.as_deref().map(strip_cdata).unwrap_or_default(),
        article_url,
        published_at: item.published_at,
        created_at: Utc::now(),
    }
}
