use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod pagination;
pub mod validation;

use auth::jwt::TokenService;
use config::Config;
use db::{DocumentStore, MemoryStore, Repository};
use models::{
    activity::Activity, forum::ForumPost, learning::LearningContent, mood::MoodEntry,
    survey::Survey, user::User,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub tokens: Arc<TokenService>,
    pub store: Arc<dyn DocumentStore>,
    pub users: Repository<User>,
    pub moods: Repository<MoodEntry>,
    pub surveys: Repository<Survey>,
    pub activities: Repository<Activity>,
    pub content: Repository<LearningContent>,
    pub posts: Repository<ForumPost>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            tokens: Arc::new(TokenService::from_config(&config)),
            config: Arc::new(config),
            users: Repository::new(store.clone()),
            moods: Repository::new(store.clone()),
            surveys: Repository::new(store.clone()),
            activities: Repository::new(store.clone()),
            content: Repository::new(store.clone()),
            posts: Repository::new(store.clone()),
            store,
        }
    }
}

/// In-process store with the same uniqueness rules as the Postgres schema.
pub fn memory_store() -> MemoryStore {
    MemoryStore::new().with_unique("users", "email")
}

fn cors_layer(config: &Config) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true);

    match config.frontend_url.parse::<HeaderValue>() {
        Ok(origin) => cors.allow_origin(origin),
        Err(e) => {
            tracing::warn!(error = %e, url = %config.frontend_url, "FRONTEND_URL is not a valid origin; CORS disabled");
            cors
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/readyz", get(handlers::health::readyz))
        // Auth
        .route("/api/auth/register", post(handlers::auth::register))
        .route("/api/auth/login", post(handlers::auth::login))
        .route("/api/auth/refresh", post(handlers::auth::refresh))
        .route("/api/auth/verify-email", post(handlers::auth::verify_email))
        .route("/api/auth/forgot-password", post(handlers::auth::forgot_password))
        .route("/api/auth/reset-password", post(handlers::auth::reset_password))
        // Catalogue reads
        .route("/api/activities", get(handlers::activities::list_activities))
        .route("/api/activities/:id", get(handlers::activities::get_activity))
        .route("/api/content", get(handlers::content::list_content))
        .route("/api/content/:id", get(handlers::content::get_content))
        .route("/api/forum", get(handlers::forum::list_posts))
        .route("/api/forum/:id", get(handlers::forum::get_post));

    let protected_routes = Router::new()
        .route("/api/auth/me", get(handlers::auth::me))
        // Mood
        .route(
            "/api/mood",
            get(handlers::mood::list_entries).post(handlers::mood::create_entry),
        )
        .route("/api/mood/stats", get(handlers::mood::stats))
        .route(
            "/api/mood/:id",
            get(handlers::mood::get_entry)
                .put(handlers::mood::update_entry)
                .delete(handlers::mood::delete_entry),
        )
        // Surveys
        .route(
            "/api/surveys",
            get(handlers::surveys::list_surveys).post(handlers::surveys::create_survey),
        )
        .route(
            "/api/surveys/:id",
            get(handlers::surveys::get_survey)
                .put(handlers::surveys::update_survey)
                .delete(handlers::surveys::delete_survey),
        )
        .route(
            "/api/surveys/:id/responses",
            post(handlers::surveys::submit_responses),
        )
        .route(
            "/api/surveys/:id/complete",
            post(handlers::surveys::complete_survey),
        )
        // Learning content
        .route(
            "/api/content/reading-history",
            get(handlers::content::reading_history),
        )
        .route(
            "/api/content/recommendations",
            get(handlers::content::recommendations),
        )
        .route("/api/content/:id/read", post(handlers::content::mark_read))
        // Forum
        .route("/api/forum", post(handlers::forum::create_post))
        .route(
            "/api/forum/:id",
            put(handlers::forum::update_post).delete(handlers::forum::delete_post),
        )
        .route("/api/forum/:id/replies", post(handlers::forum::add_reply))
        .route("/api/forum/:id/like", post(handlers::forum::like_post))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::middleware::require_auth,
        ));

    // Layers run bottom-up: authentication first, then the role check.
    let admin_routes = Router::new()
        .route("/api/activities", post(handlers::activities::create_activity))
        .route(
            "/api/activities/:id",
            put(handlers::activities::update_activity)
                .delete(handlers::activities::delete_activity),
        )
        .route("/api/content", post(handlers::content::create_content))
        .route(
            "/api/content/:id",
            put(handlers::content::update_content)
                .delete(handlers::content::delete_content),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::middleware::require_admin,
        ))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::middleware::require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(admin_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            error::expose_error_trace,
        ))
        .layer(cors_layer(&state.config))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
