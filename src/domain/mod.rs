pub mod content;
pub mod delivery;
pub mod item;
pub mod keyword;
pub mod source;
pub mod subscription;
pub mod user;

pub use content::Content;
pub use delivery::{DeliveryKey, DeliveryKind};
pub use item::{Enclosure, FeedItem, ParsedFeed, TorrentIdentity, TORRENT_MIME};
pub use keyword::Keyword;
pub use source::Source;
pub use subscription::{SettingToggle, Subscription, MAX_TAGS};
pub use user::User;
