#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};

use wasteworks::{
    handlers::{callback, health, link_organisation, organisations, session_info, sign_in, sign_out},
    oidc::OidcIdentityService,
    session::{
        cookie::CookieFactory,
        store::{MemorySessionStore, RedisSessionStore, SessionStore},
        SessionManager,
    },
    settings::WasteworksSettings,
    utils::crypto::derive_encryption_key,
};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Loads .env and Settings.toml, then applies environment overrides
    let settings = WasteworksSettings::load()
        .map_err(|e| std::io::Error::other(format!("Failed to load settings: {e}")))?;

    env_logger::Builder::new()
        .parse_filters(&settings.logging.level)
        .init();

    // Discovery is fetched exactly once here; a provider that cannot be
    // discovered is fatal
    let identity = OidcIdentityService::discover(&settings)
        .await
        .map_err(|e| std::io::Error::other(format!("OIDC discovery failed: {e}")))?;

    let store = build_store(&settings)
        .await
        .map_err(|e| std::io::Error::other(format!("Session store init failed: {e}")))?;

    let cookie_factory = CookieFactory::new(
        derive_encryption_key(settings.session.cookie_password.as_bytes()),
        settings.session.cookie_secure,
        settings.session.session_duration_hours,
    );

    let session_manager = SessionManager::new(
        store,
        Arc::new(identity),
        cookie_factory,
        settings.session.session_duration_hours,
    );

    start_server(session_manager, settings).await
}

async fn build_store(settings: &WasteworksSettings) -> anyhow::Result<Arc<dyn SessionStore>> {
    match settings.store.engine.as_str() {
        "redis" => {
            log::info!("Using Redis session store at {}", settings.store.redis_url);
            let store =
                RedisSessionStore::connect(&settings.store.redis_url, &settings.store.key_prefix)
                    .await?;
            Ok(Arc::new(store))
        }
        "memory" => {
            log::info!("Using in-process session store");
            Ok(Arc::new(MemorySessionStore::new()))
        }
        other => anyhow::bail!("unknown session store engine: {other}"),
    }
}

/// Start the HTTP server
///
/// # Errors
///
/// Returns an error if binding or serving fails
async fn start_server(
    session_manager: SessionManager,
    settings: WasteworksSettings,
) -> std::io::Result<()> {
    let bind_address = settings.get_bind_address();
    log::info!("Starting wasteworks on http://{bind_address}");
    log::info!(
        "OIDC callback URL: {}/auth/callback",
        settings.application.redirect_base_url
    );

    let cors_origins = settings.get_cors_origins();

    HttpServer::new(move || {
        let cors_origins = cors_origins.clone();
        let cors = Cors::default()
            .allowed_origin_fn(move |origin, _| {
                cors_origins
                    .iter()
                    .any(|allowed| allowed == origin.to_str().unwrap_or(""))
            })
            .allowed_methods(vec!["GET", "POST", "OPTIONS"])
            .allowed_headers(vec!["Authorization", "Content-Type", "Accept"])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(settings.clone()))
            .app_data(web::Data::new(session_manager.clone()))
            .wrap(cors)
            .wrap(Logger::default())
            .configure(configure_services)
    })
    .bind(&bind_address)?
    .run()
    .await
}

fn configure_services(cfg: &mut web::ServiceConfig) {
    cfg.route("/auth/sign-in", web::get().to(sign_in))
        .route("/auth/callback", web::get().to(callback))
        .route("/auth/sign-out", web::get().to(sign_out))
        .route("/auth/sign-out", web::post().to(sign_out))
        .route("/auth/session", web::get().to(session_info))
        .route("/auth/link-organisation", web::post().to(link_organisation))
        .route("/organisations", web::get().to(organisations))
        .route("/health", web::get().to(health));
}
