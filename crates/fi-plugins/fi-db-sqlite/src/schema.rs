//! Table definitions. Applied idempotently on every start.

/// Timestamps are stored as unix milliseconds so that `delete_at <= ?`
/// compares numerically.
pub(crate) const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id            BLOB PRIMARY KEY,
        name          TEXT NOT NULL,
        enrollment    TEXT NOT NULL,
        phone         TEXT NOT NULL,
        hostel        TEXT NOT NULL,
        email         TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        created_at    INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS posts (
        id          BLOB PRIMARY KEY,
        user_id     BLOB NOT NULL REFERENCES users(id),
        kind        TEXT NOT NULL CHECK (kind IN ('found', 'lost')),
        item_name   TEXT NOT NULL,
        description TEXT,
        category    TEXT NOT NULL DEFAULT 'Other',
        place       TEXT NOT NULL DEFAULT 'Other',
        name        TEXT NOT NULL,
        enrollment  TEXT NOT NULL,
        phone       TEXT NOT NULL,
        hostel      TEXT NOT NULL,
        status      TEXT NOT NULL DEFAULT 'active'
                    CHECK (status IN ('active', 'pending_delete')),
        delete_at   INTEGER,
        created_at  INTEGER NOT NULL,
        CHECK ((status = 'pending_delete') = (delete_at IS NOT NULL))
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_posts_pending ON posts (status, delete_at)",
    "CREATE INDEX IF NOT EXISTS idx_posts_kind_created ON posts (kind, created_at)",
    r#"
    CREATE TABLE IF NOT EXISTS images (
        id       BLOB PRIMARY KEY,
        post_id  BLOB NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
        filename TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_images_post ON images (post_id)",
];
