//! # FoundIt Binary
//!
//! The entry point that assembles the application based on compile-time features.

mod settings;

use std::sync::Arc;

use actix_files::Files;
use actix_web::{web, App, HttpServer};
use fi_api::middleware::{cors_policy, security_headers, standard_middleware};
use fi_api::{configure_routes, AppState};
use fi_core::traits::{Clock, SystemClock};
use fi_lifecycle::PurgeSweeper;

use crate::settings::Settings;

// Feature-gated imports
#[cfg(feature = "db-sqlite")]
use fi_db_sqlite::SqliteRepo;

#[cfg(all(feature = "db-memory", not(feature = "db-sqlite")))]
use fi_db_memory::MemoryRepo;

#[cfg(feature = "storage-local")]
use fi_storage_local::LocalImageStore;

#[cfg(feature = "auth-simple")]
use fi_auth_simple::SimpleAuthProvider;

#[cfg(not(any(feature = "db-sqlite", feature = "db-memory")))]
compile_error!("enable a database plugin: `db-sqlite` or `db-memory`");

#[cfg(not(feature = "storage-local"))]
compile_error!("enable an image storage plugin: `storage-local`");

#[cfg(not(feature = "auth-simple"))]
compile_error!("enable an auth plugin: `auth-simple`");

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let settings = Settings::load()?;

    // 1. Database
    #[cfg(feature = "db-sqlite")]
    let repo = Arc::new(SqliteRepo::new(&settings.database_url).await?);

    #[cfg(all(feature = "db-memory", not(feature = "db-sqlite")))]
    let repo = {
        log::warn!("using the in-memory store; posts are lost on restart");
        Arc::new(MemoryRepo::new())
    };

    // 2. Image storage
    #[cfg(feature = "storage-local")]
    let store = {
        let store = LocalImageStore::new(
            settings.upload_dir.clone().into(),
            settings.url_prefix.clone(),
        );
        store.ensure_root().await?;
        Arc::new(store)
    };

    // 3. Auth
    #[cfg(feature = "auth-simple")]
    let auth = Arc::new(SimpleAuthProvider::new());

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // 4. Shared state (dynamic dispatch over the plugins)
    let state = web::Data::new(AppState::new(
        repo.clone(),
        repo.clone(),
        store,
        auth,
        clock.clone(),
        settings.grace_period(),
        settings.board(),
    ));

    // 5. Sweeper: purges anything overdue at startup and then periodically,
    //    covering timers lost to a restart.
    let sweeper = if settings.sweeper_enabled {
        let purger = state.lifecycle.scheduler().purger().clone();
        let (mut sweeper, shutdown_tx) =
            PurgeSweeper::new(repo, purger, clock, settings.sweep_interval());
        let handle = tokio::spawn(async move { sweeper.run().await });
        Some((handle, shutdown_tx))
    } else {
        log::warn!("purge sweeper disabled; overdue posts are only purged by live timers");
        None
    };

    log::info!(
        "FoundIt starting on http://{}:{} (grace period {}s)",
        settings.bind_addr,
        settings.port,
        settings.grace_period_secs
    );

    let url_prefix = settings.url_prefix.clone();
    let upload_dir = settings.upload_dir.clone();
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .app_data(web::JsonConfig::default().limit(16 * 1024))
            .wrap(security_headers())
            .wrap(cors_policy())
            .wrap(standard_middleware())
            .configure(configure_routes)
            .service(Files::new(&url_prefix, &upload_dir))
    })
    .bind((settings.bind_addr.as_str(), settings.port))?
    .run()
    .await?;

    if let Some((handle, shutdown_tx)) = sweeper {
        let _ = shutdown_tx.send(()).await;
        if let Err(e) = handle.await {
            log::error!("purge sweeper task failed: {e}");
        }
    }

    log::info!("FoundIt stopped");
    Ok(())
}
