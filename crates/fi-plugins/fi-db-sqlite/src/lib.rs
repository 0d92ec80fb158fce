//! # fi-db-sqlite Implementation
//!
//! This module implements the data mapping between the SQLite relational model
//! and the `fi-core` domain models.

mod schema;

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fi_core::models::{
    ContactInfo, Image, MarkOutcome, Post, PostFilter, PostKind, PostState, PostStatus,
    PurgedPost, User,
};
use fi_core::traits::{PostRepo, UserRepo};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use uuid::Uuid;

pub struct SqliteRepo {
    pool: SqlitePool,
}

// Helpers for UUID conversion
fn uuid_to_blob(id: Uuid) -> Vec<u8> {
    id.as_bytes().to_vec()
}

fn blob_to_uuid(blob: &[u8]) -> anyhow::Result<Uuid> {
    Ok(Uuid::from_slice(blob)?)
}

fn millis_to_datetime(ms: i64) -> anyhow::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| anyhow::anyhow!("timestamp out of range: {ms}"))
}

fn row_to_post(row: &SqliteRow) -> anyhow::Result<Post> {
    let status = PostStatus::from_str(&row.try_get::<String, _>("status")?)
        .map_err(anyhow::Error::msg)?;
    let delete_at = row
        .try_get::<Option<i64>, _>("delete_at")?
        .map(millis_to_datetime)
        .transpose()?;

    Ok(Post {
        id: blob_to_uuid(&row.try_get::<Vec<u8>, _>("id")?)?,
        owner_id: blob_to_uuid(&row.try_get::<Vec<u8>, _>("user_id")?)?,
        kind: PostKind::from_str(&row.try_get::<String, _>("kind")?).map_err(anyhow::Error::msg)?,
        item_name: row.try_get("item_name")?,
        description: row.try_get("description")?,
        category: row.try_get("category")?,
        place: row.try_get("place")?,
        contact: ContactInfo {
            name: row.try_get("name")?,
            enrollment: row.try_get("enrollment")?,
            phone: row.try_get("phone")?,
            hostel: row.try_get("hostel")?,
        },
        state: PostState::from_parts(status, delete_at).map_err(anyhow::Error::msg)?,
        created_at: millis_to_datetime(row.try_get("created_at")?)?,
    })
}

fn row_to_user(row: &SqliteRow) -> anyhow::Result<User> {
    Ok(User {
        id: blob_to_uuid(&row.try_get::<Vec<u8>, _>("id")?)?,
        name: row.try_get("name")?,
        enrollment: row.try_get("enrollment")?,
        phone: row.try_get("phone")?,
        hostel: row.try_get("hostel")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        created_at: millis_to_datetime(row.try_get("created_at")?)?,
    })
}

impl SqliteRepo {
    /// Opens (creating if needed) the database at `url` and applies the schema.
    pub async fn new(url: &str) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    /// A private in-memory database. A single connection keeps it alive and
    /// shared by every caller.
    pub async fn in_memory() -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> anyhow::Result<Self> {
        for stmt in schema::STATEMENTS {
            sqlx::query(stmt).execute(&pool).await?;
        }
        log::debug!("sqlite schema ready");
        Ok(Self { pool })
    }
}

#[async_trait]
impl PostRepo for SqliteRepo {
    /// Atomic operation to create a post and its image rows.
    ///
    /// # Developer Note
    /// Using a Transaction (tx) ensures we don't end up with "ghost images"
    /// pointing at a post that failed to insert, or a post missing photos.
    async fn create_post(&self, post: Post, images: Vec<Image>) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO posts (id, user_id, kind, item_name, description, category, place, \
             name, enrollment, phone, hostel, status, delete_at, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(uuid_to_blob(post.id))
        .bind(uuid_to_blob(post.owner_id))
        .bind(post.kind.as_str())
        .bind(&post.item_name)
        .bind(post.description.as_deref())
        .bind(&post.category)
        .bind(&post.place)
        .bind(&post.contact.name)
        .bind(&post.contact.enrollment)
        .bind(&post.contact.phone)
        .bind(&post.contact.hostel)
        .bind(post.state.status().as_str())
        .bind(post.state.delete_at().map(|t| t.timestamp_millis()))
        .bind(post.created_at.timestamp_millis())
        .execute(&mut *tx)
        .await?;

        for image in images {
            sqlx::query("INSERT INTO images (id, post_id, filename) VALUES (?, ?, ?)")
                .bind(uuid_to_blob(image.id))
                .bind(uuid_to_blob(image.post_id))
                .bind(image.filename)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_post(&self, id: Uuid) -> anyhow::Result<Option<Post>> {
        let row = sqlx::query("SELECT * FROM posts WHERE id = ?")
            .bind(uuid_to_blob(id))
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_post).transpose()
    }

    async fn list_posts(&self, filter: &PostFilter) -> anyhow::Result<Vec<Post>> {
        let mut sql = String::from("SELECT * FROM posts WHERE 1 = 1");
        let mut args: Vec<String> = Vec::new();

        if let Some(kind) = filter.kind {
            sql.push_str(" AND kind = ?");
            args.push(kind.as_str().to_string());
        }
        if let Some(q) = filter.q.as_deref().filter(|q| !q.is_empty()) {
            sql.push_str(" AND (item_name LIKE ? OR description LIKE ?)");
            args.push(format!("%{q}%"));
            args.push(format!("%{q}%"));
        }
        if let Some(cat) = filter.category.as_deref().filter(|c| !c.is_empty()) {
            sql.push_str(" AND category = ?");
            args.push(cat.to_string());
        }
        if let Some(place) = filter.place.as_deref().filter(|p| !p.is_empty()) {
            sql.push_str(" AND place = ?");
            args.push(place.to_string());
        }
        sql.push_str(" ORDER BY created_at DESC, id DESC");

        let mut query = sqlx::query(&sql);
        for arg in &args {
            query = query.bind(arg.as_str());
        }

        query
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(row_to_post)
            .collect()
    }

    async fn list_images(&self, post_id: Uuid) -> anyhow::Result<Vec<Image>> {
        sqlx::query("SELECT id, post_id, filename FROM images WHERE post_id = ? ORDER BY rowid ASC")
            .bind(uuid_to_blob(post_id))
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|row| -> anyhow::Result<Image> {
                Ok(Image {
                    id: blob_to_uuid(&row.try_get::<Vec<u8>, _>("id")?)?,
                    post_id: blob_to_uuid(&row.try_get::<Vec<u8>, _>("post_id")?)?,
                    filename: row.try_get("filename")?,
                })
            })
            .collect()
    }

    /// Single conditional UPDATE: both columns change together or not at all.
    async fn mark_pending_delete(
        &self,
        id: Uuid,
        delete_at: DateTime<Utc>,
    ) -> anyhow::Result<MarkOutcome> {
        let updated = sqlx::query(
            "UPDATE posts SET status = 'pending_delete', delete_at = ? \
             WHERE id = ? AND status = 'active'",
        )
        .bind(delete_at.timestamp_millis())
        .bind(uuid_to_blob(id))
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 1 {
            return Ok(MarkOutcome::Marked);
        }

        let exists = sqlx::query("SELECT 1 FROM posts WHERE id = ?")
            .bind(uuid_to_blob(id))
            .fetch_optional(&self.pool)
            .await?
            .is_some();

        Ok(if exists {
            MarkOutcome::AlreadyPending
        } else {
            MarkOutcome::Missing
        })
    }

    /// Compare-and-delete inside one transaction.
    ///
    /// # Developer Note
    /// The first statement is a write, so two racing purges serialize on the
    /// SQLite write lock instead of both reading "pending" and then
    /// deadlocking on the upgrade. The loser finds zero rows and rolls back.
    async fn purge_if_pending(&self, id: Uuid) -> anyhow::Result<Option<PurgedPost>> {
        let mut tx = self.pool.begin().await?;

        let filenames: Vec<String> = sqlx::query(
            "DELETE FROM images WHERE post_id = ? \
             AND EXISTS (SELECT 1 FROM posts WHERE id = ? AND status = 'pending_delete') \
             RETURNING filename",
        )
        .bind(uuid_to_blob(id))
        .bind(uuid_to_blob(id))
        .fetch_all(&mut *tx)
        .await?
        .iter()
        .map(|row| row.try_get("filename"))
        .collect::<Result<_, _>>()?;

        let deleted = sqlx::query("DELETE FROM posts WHERE id = ? AND status = 'pending_delete'")
            .bind(uuid_to_blob(id))
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if deleted == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        tx.commit().await?;
        Ok(Some(PurgedPost {
            post_id: id,
            filenames,
        }))
    }

    async fn list_overdue(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<Uuid>> {
        sqlx::query(
            "SELECT id FROM posts WHERE status = 'pending_delete' AND delete_at <= ? \
             ORDER BY delete_at ASC",
        )
        .bind(now.timestamp_millis())
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|row| blob_to_uuid(&row.try_get::<Vec<u8>, _>("id")?))
        .collect()
    }
}

#[async_trait]
impl UserRepo for SqliteRepo {
    async fn create_user(&self, user: User) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "INSERT INTO users (id, name, enrollment, phone, hostel, email, password_hash, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(uuid_to_blob(user.id))
        .bind(&user.name)
        .bind(&user.enrollment)
        .bind(&user.phone)
        .bind(&user.hostel)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.created_at.timestamp_millis())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_user(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?")
            .bind(uuid_to_blob(id))
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_user).transpose()
    }

    async fn get_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_user).transpose()
    }
}
