//! # fi-api Handlers
//!
//! This module coordinates the flow between HTTP requests and Core traits.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use chrono::Utc;
use fi_core::config::{BoardSettings, CATEGORIES, PLACES};
use fi_core::error::AppError;
use fi_core::models::{
    ContactInfo, Image, Post, PostFilter, PostKind, PostState, PostStatus, User,
};
use fi_core::traits::{AuthProvider, Clock, ImageStore, PostRepo, UserRepo};
use fi_lifecycle::{DeletionScheduler, PendingDeletion, PostLifecycle, Purger};
use futures_util::TryStreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::error::ApiError;
use crate::session::{CurrentUser, SessionStore};

type ApiResult = Result<HttpResponse, ApiError>;

/// State shared across all Actix-web workers.
pub struct AppState {
    pub posts: Arc<dyn PostRepo>,
    pub users: Arc<dyn UserRepo>,
    pub store: Arc<dyn ImageStore>,
    pub auth: Arc<dyn AuthProvider>,
    pub lifecycle: PostLifecycle,
    pub sessions: SessionStore,
    pub settings: BoardSettings,
}

impl AppState {
    /// Wires the deletion pipeline (purger, scheduler, lifecycle) on top of
    /// the given plugins.
    pub fn new(
        posts: Arc<dyn PostRepo>,
        users: Arc<dyn UserRepo>,
        store: Arc<dyn ImageStore>,
        auth: Arc<dyn AuthProvider>,
        clock: Arc<dyn Clock>,
        grace_period: Duration,
        settings: BoardSettings,
    ) -> Self {
        let purger = Purger::new(posts.clone(), store.clone());
        let scheduler = Arc::new(DeletionScheduler::new(purger, grace_period));
        let lifecycle = PostLifecycle::new(
            posts.clone(),
            users.clone(),
            auth.clone(),
            scheduler,
            clock,
        );
        Self {
            posts,
            users,
            store,
            auth,
            lifecycle,
            sessions: SessionStore::new(settings.session_ttl),
            settings,
        }
    }
}

/// A post as the board shows it: the record plus image URLs.
#[derive(Debug, Serialize)]
pub struct PostView {
    #[serde(flatten)]
    pub post: Post,
    pub images: Vec<String>,
}

async fn to_view(data: &AppState, post: Post) -> Result<PostView, ApiError> {
    let images = data
        .posts
        .list_images(post.id)
        .await?
        .iter()
        .map(|img| data.store.url_for(&img.filename))
        .collect();
    Ok(PostView { post, images })
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

// ── Accounts ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub enrollment: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub hostel: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

pub async fn register(data: web::Data<AppState>, form: web::Json<RegisterForm>) -> ApiResult {
    let form = form.into_inner();
    let email = form.email.trim().to_lowercase();
    let domain = &data.settings.allowed_email_domain;

    if !email.ends_with(&format!("@{domain}")) {
        return Err(AppError::ValidationError(format!("Use your student email (@{domain}).")).into());
    }

    let required = [&form.name, &form.enrollment, &form.phone, &form.hostel];
    if required.iter().any(|f| f.trim().is_empty()) || form.password.is_empty() {
        return Err(AppError::ValidationError("All fields are required.".into()).into());
    }

    let user = User {
        id: Uuid::now_v7(),
        name: form.name.trim().to_string(),
        enrollment: form.enrollment.trim().to_string(),
        phone: form.phone.trim().to_string(),
        hostel: form.hostel.trim().to_string(),
        email,
        password_hash: data.auth.hash_password(&form.password)?,
        created_at: Utc::now(),
    };

    if !data.users.create_user(user.clone()).await? {
        return Err(AppError::Conflict("Email already registered.".into()).into());
    }

    let token = data.sessions.create(user.id);
    log::info!("registered user {}", user.id);
    Ok(HttpResponse::Created().json(json!({ "token": token, "user": user })))
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

pub async fn login(data: web::Data<AppState>, form: web::Json<LoginForm>) -> ApiResult {
    let email = form.email.trim().to_lowercase();
    let invalid = || ApiError::from(AppError::Unauthorized("Invalid email or password.".into()));

    let user = data.users.get_user_by_email(&email).await?.ok_or_else(invalid)?;
    if !data.auth.verify_password(&form.password, &user.password_hash).await {
        return Err(invalid());
    }

    let token = data.sessions.create(user.id);
    Ok(HttpResponse::Ok().json(json!({ "token": token, "user": user })))
}

pub async fn logout(data: web::Data<AppState>, user: CurrentUser) -> ApiResult {
    data.sessions.revoke(&user.token);
    Ok(HttpResponse::NoContent().finish())
}

/// Fixed option lists for the post form.
pub async fn meta(data: web::Data<AppState>) -> ApiResult {
    Ok(HttpResponse::Ok().json(json!({
        "categories": CATEGORIES,
        "places": PLACES,
        "max_files": data.settings.max_files,
    })))
}

// ── Posts ───────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub q: String,
    #[serde(default)]
    pub cat: String,
    #[serde(default)]
    pub place: String,
}

/// Board index: both columns, newest first, with the same filters applied.
pub async fn list_posts(data: web::Data<AppState>, query: web::Query<ListQuery>) -> ApiResult {
    let mut columns: HashMap<&'static str, Vec<PostView>> = HashMap::new();

    for kind in [PostKind::Found, PostKind::Lost] {
        let filter = PostFilter {
            kind: Some(kind),
            q: non_empty(&query.q),
            category: non_empty(&query.cat),
            place: non_empty(&query.place),
        };
        let mut views = Vec::new();
        for post in data.posts.list_posts(&filter).await? {
            views.push(to_view(&data, post).await?);
        }
        columns.insert(kind.as_str(), views);
    }

    Ok(HttpResponse::Ok().json(columns))
}

/// `key` is a post id here; the same path takes a kind on POST.
pub async fn get_post(data: web::Data<AppState>, path: web::Path<String>) -> ApiResult {
    let key = path.into_inner();
    let not_found = || ApiError::from(AppError::NotFound("Post".into(), key.clone()));

    let id = Uuid::parse_str(&key).map_err(|_| not_found())?;
    let post = data.posts.get_post(id).await?.ok_or_else(not_found)?;
    Ok(HttpResponse::Ok().json(to_view(&data, post).await?))
}

/// Text fields and file parts pulled out of a post form.
#[derive(Default)]
struct PostForm {
    fields: HashMap<String, String>,
    /// (client filename, bytes) for every non-empty `images` part
    uploads: Vec<(String, Vec<u8>)>,
}

impl PostForm {
    fn text(&self, name: &str) -> String {
        self.fields.get(name).cloned().unwrap_or_default()
    }
}

fn bad_form(e: impl std::fmt::Display) -> ApiError {
    AppError::ValidationError(format!("malformed form: {e}")).into()
}

async fn read_post_form(mut payload: Multipart, limit: usize) -> Result<PostForm, ApiError> {
    let mut form = PostForm::default();
    let mut total = 0usize;

    while let Some(mut field) = payload.try_next().await.map_err(bad_form)? {
        let disposition = field.content_disposition();
        let name = disposition.get_name().unwrap_or_default().to_string();
        let filename = disposition.get_filename().map(str::to_string);

        let mut bytes = Vec::new();
        while let Some(chunk) = field.try_next().await.map_err(bad_form)? {
            total += chunk.len();
            if total > limit {
                return Err(AppError::ValidationError("Upload too large.".into()).into());
            }
            bytes.extend_from_slice(&chunk);
        }

        if name == "images" {
            if let Some(filename) = filename.filter(|f| !f.is_empty()) {
                form.uploads.push((filename, bytes));
            }
        } else {
            form.fields
                .insert(name, String::from_utf8_lossy(&bytes).trim().to_string());
        }
    }

    Ok(form)
}

async fn discard_files(store: &dyn ImageStore, filenames: &[String]) {
    for filename in filenames {
        if let Err(e) = store.delete_image(filename).await {
            log::warn!("{e}");
        }
    }
}

/// Saves the whitelisted uploads; anything else is skipped silently.
async fn save_uploads(
    store: &dyn ImageStore,
    uploads: Vec<(String, Vec<u8>)>,
) -> Result<Vec<String>, ApiError> {
    let mut saved = Vec::new();
    for (name, bytes) in uploads {
        if !store.accepts(&name, &bytes) {
            log::debug!("skipping upload '{name}': not an allowed image");
            continue;
        }
        match store.save_image(&name, bytes).await {
            Ok(filename) => saved.push(filename),
            Err(e) => {
                discard_files(store, &saved).await;
                return Err(e.into());
            }
        }
    }
    Ok(saved)
}

pub async fn create_post(
    data: web::Data<AppState>,
    path: web::Path<String>,
    user: CurrentUser,
    payload: Multipart,
) -> ApiResult {
    let kind: PostKind = path
        .parse()
        .map_err(|_| AppError::NotFound("Board".into(), path.to_string()))?;

    let form = read_post_form(payload, data.settings.max_upload_bytes).await?;

    let max_files = data.settings.max_files;
    if form.uploads.len() > max_files {
        return Err(AppError::ValidationError(format!(
            "You can upload up to {max_files} images."
        ))
        .into());
    }

    let item_name = form.text("item_name");
    let contact = ContactInfo {
        name: form.text("name"),
        enrollment: form.text("enrollment"),
        phone: form.text("phone"),
        hostel: form.text("hostel"),
    };
    let required = [&item_name, &contact.name, &contact.enrollment, &contact.phone, &contact.hostel];
    if required.iter().any(|f| f.is_empty()) {
        return Err(AppError::ValidationError("All fields are required.".into()).into());
    }

    let post = Post {
        id: Uuid::now_v7(),
        owner_id: user.id,
        kind,
        item_name,
        description: non_empty(&form.text("description")),
        category: non_empty(&form.text("category")).unwrap_or_else(|| "Other".into()),
        place: non_empty(&form.text("place")).unwrap_or_else(|| "Other".into()),
        contact,
        state: PostState::Active,
        created_at: Utc::now(),
    };

    let saved = save_uploads(data.store.as_ref(), form.uploads).await?;
    let images: Vec<Image> = saved
        .iter()
        .map(|filename| Image {
            id: Uuid::now_v7(),
            post_id: post.id,
            filename: filename.clone(),
        })
        .collect();

    if let Err(e) = data.posts.create_post(post.clone(), images).await {
        discard_files(data.store.as_ref(), &saved).await;
        return Err(e.into());
    }

    log::info!("user {} posted {} {} with {} images", user.id, post.kind, post.id, saved.len());
    let view = PostView {
        images: saved.iter().map(|f| data.store.url_for(f)).collect(),
        post,
    };
    Ok(HttpResponse::Created().json(view))
}

// ── Deletion ────────────────────────────────────────────────────────────────

/// 202 body for an accepted delete request.
#[derive(Debug, Serialize)]
pub struct DeleteAck {
    #[serde(flatten)]
    pub pending: PendingDeletion,
    pub status: PostStatus,
    /// Countdown for the client; `delete_at` is authoritative.
    pub seconds_remaining: i64,
}

#[derive(Debug, Deserialize)]
pub struct BeginDeleteForm {
    #[serde(default)]
    pub password: String,
}

/// Confirms ownership and starts the grace period. The purge itself happens
/// later, outside this request.
pub async fn begin_delete(
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
    user: CurrentUser,
    form: web::Json<BeginDeleteForm>,
) -> ApiResult {
    let ack = data
        .lifecycle
        .request_delete(path.into_inner(), user.id, &form.password)
        .await?;

    let seconds_remaining = (ack.delete_at - Utc::now()).num_seconds().max(0);
    Ok(HttpResponse::Accepted().json(DeleteAck {
        pending: ack,
        status: PostStatus::PendingDelete,
        seconds_remaining,
    }))
}
