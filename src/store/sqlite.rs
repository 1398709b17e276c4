use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use rusqlite_migration::{Migrations, M};

use crate::app::{RelayError, Result};
use crate::domain::keyword::normalize_keyword;
use crate::domain::{Content, DeliveryKey, Keyword, Source, Subscription, User};
use crate::store::{
    ContentRepository, DeliveryLedger, KeywordRepository, Page, SourceRepository,
    SubscriptionRepository, UserRepository,
};

const SOURCE_COLUMNS: &str = "s.id, s.url, s.title, s.error_count, s.created_at, s.updated_at";

const SUBSCRIPTION_COLUMNS: &str = "id, user_id, source_id, enable_notification, enable_article, \
     enable_transfer, enable_filter, tag, webhook, interval_minutes, wait_minutes, created_at, updated_at";

const CONTENT_COLUMNS: &str = "hash_id, source_id, raw_id, raw_link, torrent_url, magnet, title, \
     article_url, published_at, created_at";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    /// Run raw SQL against the connection, for tests that need to shape
    /// the database directly.
    #[cfg(test)]
    pub(crate) fn execute_batch(&self, sql: &str) -> Result<()> {
        self.conn()?.execute_batch(sql)?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        let migrations = Migrations::new(vec![M::up(include_str!(
            "../../migrations/001-initial/up.sql"
        ))]);

        let mut conn = self.conn()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        migrations
            .to_latest(&mut conn)
            .map_err(|e| RelayError::Other(format!("migration failed: {}", e)))?;

        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| {
            RelayError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(1),
                Some(e.to_string()),
            ))
        })
    }

    fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| s.parse::<DateTime<Utc>>().ok())
    }

    fn timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
        Ok(row
            .get::<_, String>(idx)
            .ok()
            .and_then(|s| Self::parse_datetime(&s))
            .unwrap_or_else(Utc::now))
    }

    fn row_to_source(row: &Row<'_>) -> rusqlite::Result<Source> {
        Ok(Source {
            id: row.get(0)?,
            url: row.get(1)?,
            title: row.get(2)?,
            error_count: row.get(3)?,
            created_at: Self::timestamp(row, 4)?,
            updated_at: Self::timestamp(row, 5)?,
        })
    }

    fn row_to_subscription(row: &Row<'_>) -> rusqlite::Result<Subscription> {
        Ok(Subscription {
            id: row.get(0)?,
            user_id: row.get(1)?,
            source_id: row.get(2)?,
            enable_notification: row.get(3)?,
            enable_article: row.get(4)?,
            enable_transfer: row.get(5)?,
            enable_filter: row.get(6)?,
            tag: row.get(7)?,
            webhook: row.get(8)?,
            interval_minutes: row.get(9)?,
            wait_minutes: row.get(10)?,
            created_at: Self::timestamp(row, 11)?,
            updated_at: Self::timestamp(row, 12)?,
        })
    }

    fn row_to_content(row: &Row<'_>) -> rusqlite::Result<Content> {
        Ok(Content {
            hash_id: row.get(0)?,
            source_id: row.get(1)?,
            raw_id: row.get(2)?,
            raw_link: row.get(3)?,
            torrent_url: row.get(4)?,
            magnet: row.get(5)?,
            title: row.get(6)?,
            description: String::new(),
            article_url: row.get(7)?,
            published_at: row
                .get::<_, Option<String>>(8)?
                .and_then(|s| Self::parse_datetime(&s)),
            created_at: Self::timestamp(row, 9)?,
        })
    }

    fn row_to_keyword(row: &Row<'_>) -> rusqlite::Result<Keyword> {
        Ok(Keyword {
            id: row.get(0)?,
            user_id: row.get(1)?,
            keyword: row.get(2)?,
            created_at: Self::timestamp(row, 3)?,
        })
    }

    fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
        Ok(User {
            id: row.get(0)?,
            transfer_token: row.get(1)?,
            created_at: Self::timestamp(row, 2)?,
        })
    }

    fn query_sources(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Source>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let sources = stmt
            .query_map(params, Self::row_to_source)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(sources)
    }

    fn query_subscriptions(
        &self,
        filter: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<Subscription>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM subscriptions WHERE {} ORDER BY id",
            SUBSCRIPTION_COLUMNS, filter
        ))?;
        let subscriptions = stmt
            .query_map(params, Self::row_to_subscription)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(subscriptions)
    }
}

impl SourceRepository for SqliteStore {
    fn find_source_by_url(&self, url: &str) -> Result<Option<Source>> {
        let conn = self.conn()?;
        let result = conn
            .query_row(
                &format!("SELECT {} FROM sources s WHERE s.url = ?1", SOURCE_COLUMNS),
                params![url],
                Self::row_to_source,
            )
            .optional()?;
        Ok(result)
    }

    fn get_source(&self, id: i64) -> Result<Option<Source>> {
        let conn = self.conn()?;
        let result = conn
            .query_row(
                &format!("SELECT {} FROM sources s WHERE s.id = ?1", SOURCE_COLUMNS),
                params![id],
                Self::row_to_source,
            )
            .optional()?;
        Ok(result)
    }

    fn create_source(&self, source: &Source) -> Result<Source> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sources (url, title, error_count, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                source.url,
                source.title,
                source.error_count,
                source.created_at.to_rfc3339(),
                source.updated_at.to_rfc3339()
            ],
        )?;

        let mut created = source.clone();
        created.id = conn.last_insert_rowid();
        Ok(created)
    }

    fn active_sources(&self, threshold: u32) -> Result<Vec<Source>> {
        self.query_sources(
            &format!(
                "SELECT {} FROM sources s
                 WHERE s.error_count < ?1
                   AND EXISTS (SELECT 1 FROM subscriptions sub WHERE sub.source_id = s.id)
                 ORDER BY s.id",
                SOURCE_COLUMNS
            ),
            params![threshold],
        )
    }

    fn sources_without_subscriptions(&self) -> Result<Vec<Source>> {
        self.query_sources(
            &format!(
                "SELECT {} FROM sources s
                 WHERE NOT EXISTS (SELECT 1 FROM subscriptions sub WHERE sub.source_id = s.id)
                 ORDER BY s.id",
                SOURCE_COLUMNS
            ),
            [],
        )
    }

    fn sources_for_user(&self, user_id: i64) -> Result<Vec<Source>> {
        self.query_sources(
            &format!(
                "SELECT {} FROM sources s
                 JOIN subscriptions sub ON sub.source_id = s.id
                 WHERE sub.user_id = ?1
                 ORDER BY s.title, s.url",
                SOURCE_COLUMNS
            ),
            params![user_id],
        )
    }

    fn delete_source(&self, id: i64) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM contents WHERE source_id = ?1", params![id])?;
        tx.execute("DELETE FROM sources WHERE id = ?1", params![id])?;
        tx.commit()?;
        Ok(())
    }

    fn record_fetch_success(&self, id: i64, title: &str, threshold: u32) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE sources
             SET error_count = CASE WHEN error_count < ?4 THEN 0 ELSE error_count END,
                 title = CASE WHEN ?2 = '' THEN title ELSE ?2 END,
                 updated_at = ?3
             WHERE id = ?1",
            params![id, title, Utc::now().to_rfc3339(), threshold],
        )?;
        Ok(())
    }

    fn increment_error_count(&self, id: i64, threshold: u32) -> Result<Option<u32>> {
        let conn = self.conn()?;
        let count: Option<u32> = conn
            .query_row(
                "UPDATE sources SET error_count = error_count + 1, updated_at = ?2
                 WHERE id = ?1 AND error_count < ?3 RETURNING error_count",
                params![id, Utc::now().to_rfc3339(), threshold],
                |row| row.get(0),
            )
            .optional()?;
        if count.is_some() {
            return Ok(count);
        }

        let exists = conn
            .query_row("SELECT 1 FROM sources WHERE id = ?1", params![id], |_| Ok(()))
            .optional()?
            .is_some();
        if exists {
            Ok(None)
        } else {
            Err(RelayError::SourceNotFound(id.to_string()))
        }
    }

    fn set_error_count(&self, id: i64, count: u32) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE sources SET error_count = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, count, Utc::now().to_rfc3339()],
        )?;
        if changed == 0 {
            return Err(RelayError::SourceNotFound(id.to_string()));
        }
        Ok(())
    }
}

impl SubscriptionRepository for SqliteStore {
    fn subscribe(&self, subscription: &Subscription) -> Result<Subscription> {
        let conn = self.conn()?;

        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM subscriptions WHERE user_id = ?1 AND source_id = ?2)",
            params![subscription.user_id, subscription.source_id],
            |row| row.get(0),
        )?;
        if exists {
            return Err(RelayError::AlreadySubscribed(format!(
                "source {}",
                subscription.source_id
            )));
        }

        conn.execute(
            "INSERT OR IGNORE INTO users (id, created_at) VALUES (?1, ?2)",
            params![subscription.user_id, Utc::now().to_rfc3339()],
        )?;
        conn.execute(
            "INSERT INTO subscriptions (user_id, source_id, enable_notification, enable_article,
                 enable_transfer, enable_filter, tag, webhook, interval_minutes, wait_minutes,
                 created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                subscription.user_id,
                subscription.source_id,
                subscription.enable_notification,
                subscription.enable_article,
                subscription.enable_transfer,
                subscription.enable_filter,
                subscription.tag,
                subscription.webhook,
                subscription.interval_minutes,
                subscription.wait_minutes,
                subscription.created_at.to_rfc3339(),
                subscription.updated_at.to_rfc3339()
            ],
        )?;

        let mut created = subscription.clone();
        created.id = conn.last_insert_rowid();
        Ok(created)
    }

    fn get_subscription(&self, id: i64) -> Result<Option<Subscription>> {
        Ok(self.query_subscriptions("id = ?1", params![id])?.pop())
    }

    fn find_subscription(&self, user_id: i64, source_id: i64) -> Result<Option<Subscription>> {
        Ok(self
            .query_subscriptions("user_id = ?1 AND source_id = ?2", params![user_id, source_id])?
            .pop())
    }

    fn subscriptions_by_user(&self, user_id: i64) -> Result<Vec<Subscription>> {
        self.query_subscriptions("user_id = ?1", params![user_id])
    }

    fn subscriptions_by_source(&self, source_id: i64) -> Result<Vec<Subscription>> {
        self.query_subscriptions("source_id = ?1", params![source_id])
    }

    fn count_subscriptions(&self, source_id: i64) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM subscriptions WHERE source_id = ?1",
            params![source_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn update_subscription(&self, subscription: &Subscription) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE subscriptions
             SET enable_notification = ?2, enable_article = ?3, enable_transfer = ?4,
                 enable_filter = ?5, tag = ?6, webhook = ?7, interval_minutes = ?8,
                 wait_minutes = ?9, updated_at = ?10
             WHERE id = ?1",
            params![
                subscription.id,
                subscription.enable_notification,
                subscription.enable_article,
                subscription.enable_transfer,
                subscription.enable_filter,
                subscription.tag,
                subscription.webhook,
                subscription.interval_minutes,
                subscription.wait_minutes,
                Utc::now().to_rfc3339()
            ],
        )?;
        if changed == 0 {
            return Err(RelayError::SubscriptionNotFound);
        }
        Ok(())
    }

    fn advance_wait_times(&self, source_id: i64, tick_minutes: u32) -> Result<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let subscriptions = {
            let mut stmt = tx.prepare(&format!(
                "SELECT {} FROM subscriptions WHERE source_id = ?1",
                SUBSCRIPTION_COLUMNS
            ))?;
            let rows = stmt
                .query_map(params![source_id], Self::row_to_subscription)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        };

        let mut due = false;
        for mut subscription in subscriptions {
            due |= subscription.advance(tick_minutes);
            tx.execute(
                "UPDATE subscriptions SET wait_minutes = ?2 WHERE id = ?1",
                params![subscription.id, subscription.wait_minutes],
            )?;
        }

        tx.commit()?;
        Ok(due)
    }

    fn unsubscribe(&self, subscription_id: i64) -> Result<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let source_id: i64 = tx
            .query_row(
                "SELECT source_id FROM subscriptions WHERE id = ?1",
                params![subscription_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(RelayError::SubscriptionNotFound)?;

        tx.execute(
            "DELETE FROM subscriptions WHERE id = ?1",
            params![subscription_id],
        )?;

        let remaining: i64 = tx.query_row(
            "SELECT COUNT(*) FROM subscriptions WHERE source_id = ?1",
            params![source_id],
            |row| row.get(0),
        )?;

        let removed = remaining == 0;
        if removed {
            tx.execute("DELETE FROM contents WHERE source_id = ?1", params![source_id])?;
            tx.execute("DELETE FROM sources WHERE id = ?1", params![source_id])?;
        }

        tx.commit()?;
        Ok(removed)
    }
}

impl ContentRepository for SqliteStore {
    fn content_exists(&self, hash_id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM contents WHERE hash_id = ?1)",
            params![hash_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn get_content(&self, hash_id: &str) -> Result<Option<Content>> {
        let conn = self.conn()?;
        let result = conn
            .query_row(
                &format!("SELECT {} FROM contents WHERE hash_id = ?1", CONTENT_COLUMNS),
                params![hash_id],
                Self::row_to_content,
            )
            .optional()?;
        Ok(result)
    }

    fn insert_content(&self, content: &Content) -> Result<bool> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO contents (hash_id, source_id, raw_id, raw_link, torrent_url,
                 magnet, title, article_url, published_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                content.hash_id,
                content.source_id,
                content.raw_id,
                content.raw_link,
                content.torrent_url,
                content.magnet,
                content.title,
                content.article_url,
                content.published_at.map(|dt| dt.to_rfc3339()),
                content.created_at.to_rfc3339()
            ],
        )?;
        Ok(inserted == 1)
    }

    fn set_article_url(&self, hash_id: &str, url: &str) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE contents SET article_url = ?2 WHERE hash_id = ?1 AND article_url IS NULL",
            params![hash_id, url],
        )?;
        Ok(changed == 1)
    }

    fn contents_by_source(&self, source_id: i64) -> Result<Vec<Content>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM contents WHERE source_id = ?1 ORDER BY rowid",
            CONTENT_COLUMNS
        ))?;
        let contents = stmt
            .query_map(params![source_id], Self::row_to_content)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(contents)
    }
}

impl DeliveryLedger for SqliteStore {
    fn is_delivered(&self, key: &DeliveryKey) -> Result<bool> {
        let conn = self.conn()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM delivery_records
                           WHERE kind = ?1 AND trigger_id = ?2 AND target_id = ?3)",
            params![key.kind.as_i64(), key.trigger_id, key.target_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn record_delivery(&self, key: &DeliveryKey) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO delivery_records (kind, trigger_id, target_id, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                key.kind.as_i64(),
                key.trigger_id,
                key.target_id,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }
}

impl KeywordRepository for SqliteStore {
    fn add_keyword(&self, user_id: i64, keyword: &str) -> Result<Keyword> {
        let keyword = normalize_keyword(keyword);
        if keyword.is_empty() {
            return Err(RelayError::InvalidArgument("keyword is empty".into()));
        }

        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO keywords (user_id, keyword, created_at) VALUES (?1, ?2, ?3)",
            params![user_id, keyword, Utc::now().to_rfc3339()],
        )?;
        let stored = conn.query_row(
            "SELECT id, user_id, keyword, created_at FROM keywords
             WHERE user_id = ?1 AND keyword = ?2",
            params![user_id, keyword],
            Self::row_to_keyword,
        )?;
        Ok(stored)
    }

    fn remove_keyword(&self, user_id: i64, keyword_id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM keywords WHERE id = ?1 AND user_id = ?2",
            params![keyword_id, user_id],
        )?;
        Ok(removed == 1)
    }

    fn keywords(&self, user_id: i64) -> Result<Vec<Keyword>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, keyword, created_at FROM keywords
             WHERE user_id = ?1 ORDER BY keyword",
        )?;
        let keywords = stmt
            .query_map(params![user_id], Self::row_to_keyword)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(keywords)
    }

    fn keywords_page(&self, user_id: i64, page: usize, per_page: usize) -> Result<Page<Keyword>> {
        let page = page.max(1);
        let per_page = per_page.max(1);

        let conn = self.conn()?;
        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM keywords WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(
            "SELECT id, user_id, keyword, created_at FROM keywords
             WHERE user_id = ?1 ORDER BY keyword LIMIT ?2 OFFSET ?3",
        )?;
        let items = stmt
            .query_map(
                params![user_id, per_page as i64, ((page - 1) * per_page) as i64],
                Self::row_to_keyword,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Page {
            items,
            page,
            per_page,
            total: total as usize,
        })
    }
}

impl UserRepository for SqliteStore {
    fn find_or_create_user(&self, id: i64) -> Result<User> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO users (id, created_at) VALUES (?1, ?2)",
            params![id, Utc::now().to_rfc3339()],
        )?;
        let user = conn.query_row(
            "SELECT id, transfer_token, created_at FROM users WHERE id = ?1",
            params![id],
            Self::row_to_user,
        )?;
        Ok(user)
    }

    fn get_user(&self, id: i64) -> Result<Option<User>> {
        let conn = self.conn()?;
        let user = conn
            .query_row(
                "SELECT id, transfer_token, created_at FROM users WHERE id = ?1",
                params![id],
                Self::row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    fn set_transfer_token(&self, id: i64, token: Option<&str>) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO users (id, transfer_token, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET transfer_token = excluded.transfer_token",
            params![id, token, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}
