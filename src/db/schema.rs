//! Database schema and migrations for feedhook.
//!
//! Migrations are applied sequentially when a database is created or
//! opened by a newer version.

/// Database migrations.
///
/// Each migration is a SQL script that will be executed in order.
/// The schema_version table tracks which migrations have been applied.
pub const MIGRATIONS: &[&str] = &[
    // v1: Initial schema
    r#"
-- Random identifier assigned when the database is created
CREATE TABLE database_id (
    id  TEXT NOT NULL
);

-- Feeds that have been seen by an update run
CREATE TABLE feed (
    key     TEXT PRIMARY KEY,
    title   TEXT NOT NULL,
    url     TEXT NOT NULL
);

-- Feed entries; guid is the global deduplication key
CREATE TABLE item (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    feed        TEXT NOT NULL REFERENCES feed(key),
    guid        TEXT NOT NULL UNIQUE,
    published   TEXT NOT NULL,
    link        TEXT,
    title       TEXT,
    author      TEXT,
    content     TEXT
);

CREATE INDEX idx_item_feed_published ON item(feed, published);

-- Outcome of the most recent update attempt per feed
CREATE TABLE last_update (
    feed    TEXT PRIMARY KEY REFERENCES feed(key),
    updated TEXT NOT NULL,
    success INTEGER NOT NULL
);
"#,
];
