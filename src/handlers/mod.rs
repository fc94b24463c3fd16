/// HTTP request handlers
use crate::clients::{HttpClient, ImageFetcher, MerArchiveClient, NasaClient, RawImageClient};
use crate::config::AppConfig;
use crate::domain::{
    EpicCollection, EpicDates, Health, LatestPhotosResponse, PhotoQuery, PhotosResponse,
    RoverName, RoverSummary,
};
use crate::errors::{ApiError, ApiResult};
use crate::listing::RegexListingParser;
use crate::services::{ImageProxyService, MerService, RoverService, SpaceService};
use crate::utils::parse_opt;
use axum::{
    extract::{Path, Query, State},
    http::header::{CACHE_CONTROL, CONTENT_TYPE},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub rover_service: Arc<RoverService>,
    pub mer_service: Arc<MerService>,
    pub image_proxy: Arc<ImageProxyService>,
    pub space_service: Arc<SpaceService>,
}

impl AppState {
    /// Wire clients and services from configuration
    pub fn from_config(config: &AppConfig) -> ApiResult<Self> {
        let http = HttpClient::new()?;

        let mer_service = Arc::new(MerService::new(
            MerArchiveClient::new(http.clone(), config.upstreams.pds_base_url.clone()),
            Box::new(RegexListingParser),
        ));
        let rover_service = Arc::new(RoverService::new(
            RawImageClient::new(http.clone(), &config.upstreams),
            mer_service.clone(),
        ));
        let image_proxy = Arc::new(ImageProxyService::new(
            ImageFetcher::new(
                HttpClient::with_timeout(config.image_fetch.attempt_timeout)?,
                config.image_fetch.clone(),
            ),
            config.upstreams.pds_base_url.clone(),
        ));
        let space_service = Arc::new(SpaceService::new(NasaClient::new(
            http,
            config.nasa_api_key.clone(),
            config.epic_public_key.clone(),
            &config.upstreams,
        )));

        Ok(Self {
            rover_service,
            mer_service,
            image_proxy,
            space_service,
        })
    }
}

/// Successful response wrapper
#[derive(Serialize)]
pub struct SuccessResponse<T: Serialize> {
    pub ok: bool,
    #[serde(flatten)]
    pub data: T,
}

impl<T: Serialize> SuccessResponse<T> {
    pub fn new(data: T) -> Self {
        Self { ok: true, data }
    }
}

fn parse_rover(raw: &str) -> ApiResult<RoverName> {
    raw.parse::<RoverName>().map_err(ApiError::UnsupportedRover)
}

fn parse_date(params: &HashMap<String, String>, key: &str) -> ApiResult<Option<String>> {
    match params.get(key).map(|s| s.trim()).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(|_| Some(raw.to_string()))
            .map_err(|_| ApiError::InvalidInput(format!("Invalid {} parameter", key))),
    }
}

fn text_param(params: &HashMap<String, String>, key: &str) -> Option<String> {
    params
        .get(key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Build photo filters from query parameters, rejecting malformed values
fn photo_query(params: &HashMap<String, String>) -> ApiResult<PhotoQuery> {
    Ok(PhotoQuery {
        sol: parse_opt(params.get("sol"), "sol").map_err(ApiError::InvalidInput)?,
        sol_min: parse_opt(params.get("sol_min"), "sol_min").map_err(ApiError::InvalidInput)?,
        sol_max: parse_opt(params.get("sol_max"), "sol_max").map_err(ApiError::InvalidInput)?,
        date_start: parse_date(params, "date_start")?,
        date_end: parse_date(params, "date_end")?,
        camera: text_param(params, "camera"),
        search: text_param(params, "search"),
        page: parse_opt(params.get("page"), "page")
            .map_err(ApiError::InvalidInput)?
            .unwrap_or(0),
    })
}

/// Health check handler
pub async fn health() -> Json<Health> {
    Json(Health {
        status: "ok",
        now: Utc::now(),
    })
}

/// Rover catalog with cameras
pub async fn list_rovers() -> Json<Value> {
    let rovers: Vec<RoverSummary> = RoverName::ALL.into_iter().map(RoverSummary::from).collect();
    Json(serde_json::json!(SuccessResponse::new(serde_json::json!({
        "rovers": rovers
    }))))
}

/// Filtered, paged rover photos
pub async fn get_rover_photos(
    Path(rover): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<AppState>,
) -> Result<Json<SuccessResponse<PhotosResponse>>, ApiError> {
    let rover = parse_rover(&rover)?;
    let query = photo_query(&params)?;

    let photos = state.rover_service.fetch_photos(rover, &query).await?;
    Ok(Json(SuccessResponse::new(PhotosResponse { photos })))
}

/// Photos from the last 24 hours
pub async fn get_latest_photos(
    Path(rover): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<SuccessResponse<LatestPhotosResponse>>, ApiError> {
    let rover = parse_rover(&rover)?;
    let latest_photos = state.rover_service.fetch_latest_photos(rover).await?;
    Ok(Json(SuccessResponse::new(LatestPhotosResponse {
        latest_photos,
    })))
}

/// Highest known sol for a rover
pub async fn get_rover_info(
    Path(rover): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Value>, ApiError> {
    let rover = parse_rover(&rover)?;
    let info = state.rover_service.fetch_rover_info(rover).await;
    Ok(Json(serde_json::json!(SuccessResponse::new(info))))
}

/// Spirit and Opportunity photos scraped from the PDS archive
pub async fn get_mer_photos(
    Query(params): Query<HashMap<String, String>>,
    State(state): State<AppState>,
) -> Result<Json<Value>, ApiError> {
    let (Some(rover), Some(sol)) = (text_param(&params, "rover"), text_param(&params, "sol"))
    else {
        return Err(ApiError::InvalidInput(
            "Missing rover or sol parameter".to_string(),
        ));
    };

    let sol = sol
        .parse::<u32>()
        .ok()
        .filter(|s| *s >= 1)
        .ok_or_else(|| ApiError::InvalidInput("Invalid sol parameter".to_string()))?;
    let page: u32 = parse_opt(params.get("page"), "page")
        .map_err(ApiError::InvalidInput)?
        .unwrap_or(0);
    let camera = text_param(&params, "camera").unwrap_or_else(|| "PANCAM".to_string());
    let rover = parse_rover(&rover)?;

    let page = state
        .mer_service
        .list_photos(rover, sol, &camera, page)
        .await?;
    Ok(Json(serde_json::json!(SuccessResponse::new(page))))
}

/// Relay an archive image with a day-long cache lifetime
pub async fn get_mer_image(
    Query(params): Query<HashMap<String, String>>,
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    let url = params.get("url").map(String::as_str).unwrap_or_default();
    let image = state.image_proxy.fetch(url).await?;

    Ok((
        [
            (CONTENT_TYPE, image.content_type),
            (CACHE_CONTROL, "public, max-age=86400".to_string()),
        ],
        image.bytes,
    )
        .into_response())
}

/// Astronomy Picture of the Day, relayed unchanged
pub async fn get_apod(
    Query(params): Query<HashMap<String, String>>,
    State(state): State<AppState>,
) -> Result<Json<Value>, ApiError> {
    let start = parse_date(&params, "start_date")?;
    let end = parse_date(&params, "end_date")?;

    let range = match (&start, &end) {
        (Some(s), Some(e)) => Some((s.as_str(), e.as_str())),
        _ => None,
    };

    let data = state.space_service.apod(range).await?;
    Ok(Json(data))
}

/// Natural and enhanced EPIC imagery
pub async fn get_epic(State(state): State<AppState>) -> impl IntoResponse {
    let collections = state.space_service.epic_collections().await;
    (
        [(CACHE_CONTROL, "public, max-age=300, s-maxage=600")],
        Json(SuccessResponse::new(collections)),
    )
}

/// Recent EPIC capture dates for one collection
pub async fn get_epic_dates(
    Path(collection): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<SuccessResponse<EpicDates>>, ApiError> {
    let collection = collection
        .parse::<EpicCollection>()
        .map_err(ApiError::InvalidInput)?;
    let dates = state.space_service.epic_available_dates(collection).await;

    Ok(Json(SuccessResponse::new(EpicDates {
        collection: collection.as_str(),
        dates,
    })))
}
