//! Magnet identity for items that carry a torrent enclosure.
//!
//! Resolution order: a magnet already used as the provider id, a magnet
//! used as the enclosure URL, well-known hosts that embed the info-hash in
//! the URL, and finally downloading the `.torrent` file. Every failure
//! degrades to "no torrent identity".

pub mod bencode;

use std::sync::Arc;

use tracing::debug;
use url::Url;

use crate::domain::{FeedItem, TorrentIdentity};
use crate::fetcher::Fetcher;
use crate::identity::{magnet_for_info_hash, magnet_from};

pub const DEFAULT_MAX_TORRENT_BYTES: usize = 10 * 1024 * 1024;

#[derive(Clone)]
pub struct MagnetResolver {
    fetcher: Arc<dyn Fetcher>,
    max_bytes: usize,
}

impl MagnetResolver {
    pub fn new(fetcher: Arc<dyn Fetcher>, max_bytes: usize) -> Self {
        Self { fetcher, max_bytes }
    }

    pub async fn resolve(&self, item: &FeedItem) -> Option<TorrentIdentity> {
        let torrent_url = item.torrent_url()?;

        let magnet = match magnet_from(&item.id)
            .or_else(|| magnet_from(torrent_url))
            .or_else(|| hash_from_known_host(torrent_url).and_then(|h| magnet_for_info_hash(&h)))
        {
            Some(magnet) => magnet,
            None => self.download_info_hash(torrent_url).await?,
        };

        Some(TorrentIdentity {
            torrent_url: torrent_url.to_string(),
            magnet,
        })
    }

    async fn download_info_hash(&self, torrent_url: &str) -> Option<String> {
        if Url::parse(torrent_url).is_err() {
            debug!("Skipping torrent with unparseable URL {}", torrent_url);
            return None;
        }

        let body = match self.fetcher.fetch_limited(torrent_url, self.max_bytes).await {
            Ok(body) => body,
            Err(e) => {
                debug!("Torrent download failed for {}: {}", torrent_url, e);
                return None;
            }
        };

        match bencode::info_hash(&body) {
            Ok(hash) => magnet_for_info_hash(&hash),
            Err(e) => {
                debug!("Torrent {} did not parse: {}", torrent_url, e);
                None
            }
        }
    }
}

/// Hosts whose download URLs already name the info-hash.
fn hash_from_known_host(torrent_url: &str) -> Option<String> {
    let url = Url::parse(torrent_url).ok()?;
    match url.host_str()? {
        "mikanani.me" => {
            let last = url.path_segments()?.next_back()?;
            last.strip_suffix(".torrent").map(str::to_string)
        }
        "v2.uploadbt.com" => url
            .query_pairs()
            .find(|(k, _)| k == "hash")
            .map(|(_, v)| v.into_owned()),
        _ => None,
    }
}
