//! # fi-api
//!
//! The web routing and orchestration layer for FoundIt.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod session;

use actix_web::web;

pub use error::ApiError;
pub use handlers::AppState;

/// Configures the JSON routes for the board.
///
/// `/posts/{key}` is a single resource: GET reads `key` as a post id, POST
/// reads it as the board kind (`found` or `lost`) to post into.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    // No catch-all scope: the binary mounts static files beside these.
    cfg.route("/register", web::post().to(handlers::register))
        .route("/login", web::post().to(handlers::login))
        .route("/logout", web::post().to(handlers::logout))
        .route("/meta", web::get().to(handlers::meta))
        .route("/posts", web::get().to(handlers::list_posts))
        .service(
            web::resource("/posts/{key}")
                .route(web::get().to(handlers::get_post))
                .route(web::post().to(handlers::create_post)),
        )
        .route(
            "/posts/{post_id}/begin-delete",
            web::post().to(handlers::begin_delete),
        );
}
