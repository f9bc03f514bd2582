use crate::controller::{health_check_controller, oauth_controller};
use crate::AppState;
use axum::{routing::get, Router};

pub fn define_routes(app_state: AppState) -> Router {
    Router::new()
        .merge(health_routes())
        .merge(api_routes(app_state))
        .fallback(health_check_controller::not_found)
}

fn health_routes() -> Router {
    Router::new().route("/health", get(health_check_controller::health_check))
}

fn api_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/api", get(health_check_controller::ping))
        .route("/api/", get(health_check_controller::ping))
        .route("/api/oauth/{provider}", get(oauth_controller::login))
        .with_state(app_state)
}
