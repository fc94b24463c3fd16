/// Application routes configuration
use crate::handlers::{
    get_apod, get_epic, get_epic_dates, get_latest_photos, get_mer_image, get_mer_photos,
    get_rover_info, get_rover_photos, health, list_rovers, AppState,
};
use crate::services::MER_IMAGE_PATH;
use axum::{routing::get, Router};

/// Build the application router with all routes
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health))
        // Rover feeds
        .route("/api/rovers", get(list_rovers))
        .route("/api/rovers/:rover/photos", get(get_rover_photos))
        .route("/api/rovers/:rover/latest", get(get_latest_photos))
        .route("/api/rovers/:rover/info", get(get_rover_info))
        // MER archive
        .route("/api/mer", get(get_mer_photos))
        .route(MER_IMAGE_PATH, get(get_mer_image))
        // APOD / EPIC
        .route("/api/apod", get(get_apod))
        .route("/api/epic", get(get_epic))
        .route("/api/epic/:collection/dates", get(get_epic_dates))
        .with_state(state)
}
