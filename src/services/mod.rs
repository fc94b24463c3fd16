/// Business logic services layer
use crate::clients::{
    curiosity_params, latest_params, perseverance_params, ImageFetcher, MerArchiveClient,
    NasaClient, RawImageClient, PAGE_SIZE,
};
use crate::domain::{
    Camera, EpicCollection, EpicCollections, EpicPhoto, MerCamera, MerPage, Photo, PhotoQuery,
    RoverInfo, RoverName,
};
use crate::errors::{ApiError, ApiResult};
use crate::listing::{filter_listing, ListingParser};
use crate::utils::stable_photo_id;
use chrono::{Duration, Utc};
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Route serving archive images back through this service
pub const MER_IMAGE_PATH: &str = "/api/mer-image";

/// Most capture dates returned per EPIC collection
pub const EPIC_DATES_LIMIT: usize = 30;

/// MER archive scraping service
pub struct MerService {
    archive: MerArchiveClient,
    parser: Box<dyn ListingParser>,
}

impl MerService {
    pub fn new(archive: MerArchiveClient, parser: Box<dyn ListingParser>) -> Self {
        Self { archive, parser }
    }

    /// List one page of archive photos for a rover, sol and camera
    pub async fn list_photos(
        &self,
        rover: RoverName,
        sol: u32,
        camera: &str,
        page: u32,
    ) -> ApiResult<MerPage> {
        if !rover.is_mer() {
            return Err(ApiError::UnsupportedRover(rover.to_string()));
        }
        if sol < 1 {
            return Err(ApiError::InvalidInput("Invalid sol parameter".to_string()));
        }

        let camera = MerCamera::resolve(camera);
        let browse_url = self.archive.listing_url(rover, camera, sol);

        let html = match self.archive.fetch_listing(&browse_url).await {
            Ok(Some(html)) => html,
            Ok(None) => return Ok(MerPage::default()),
            Err(e) => {
                error!("Failed to fetch MER listing {}: {}", browse_url, e);
                return Err(e);
            }
        };

        let files = filter_listing(self.parser.parse(&html));
        let start = (page as usize).saturating_mul(PAGE_SIZE as usize);
        let end = start.saturating_add(PAGE_SIZE as usize);

        let photos = files
            .iter()
            .skip(start)
            .take(PAGE_SIZE as usize)
            .enumerate()
            .map(|(idx, filename)| mer_photo(rover, camera, sol, &browse_url, filename, idx))
            .collect();

        Ok(MerPage {
            photos,
            total: files.len(),
            has_more: end < files.len(),
        })
    }
}

/// Id is the filename hash offset by page position, so same-hash names
/// on one page still get distinct ids.
fn mer_photo(
    rover: RoverName,
    camera: MerCamera,
    sol: u32,
    browse_url: &str,
    filename: &str,
    idx: usize,
) -> Photo {
    let direct_url = format!("{}{}", browse_url, filename);
    let image_id = filename.replacen(".jpg", "", 1).replacen(".img", "", 1);

    Photo {
        id: stable_photo_id(&image_id) + idx as i64,
        sol: sol as i64,
        camera: Camera {
            id: 0,
            name: camera.abbrev().to_string(),
            rover_id: rover.profile().id,
            full_name: camera.full_name().to_string(),
        },
        img_src: format!(
            "{}?url={}",
            MER_IMAGE_PATH,
            urlencoding::encode(&direct_url)
        ),
        earth_date: String::new(),
        rover: rover.rover_record(),
    }
}

/// Rover photo adapter over the live feeds and the MER archive
pub struct RoverService {
    raw_images: RawImageClient,
    mer: Arc<MerService>,
}

impl RoverService {
    pub fn new(raw_images: RawImageClient, mer: Arc<MerService>) -> Self {
        Self { raw_images, mer }
    }

    /// Fetch one page of photos matching `query`
    pub async fn fetch_photos(&self, rover: RoverName, query: &PhotoQuery) -> ApiResult<Vec<Photo>> {
        match rover {
            RoverName::Perseverance | RoverName::Curiosity => {
                let params = if rover == RoverName::Perseverance {
                    perseverance_params(query)
                } else {
                    curiosity_params(query)
                };
                self.raw_images.fetch(rover, &params).await.map_err(|e| {
                    error!("{} photo feed error: {}", rover, e);
                    e
                })
            }
            RoverName::Opportunity | RoverName::Spirit => {
                let sol = query.sol.or(query.sol_min).unwrap_or(1);
                let camera = query
                    .camera
                    .as_deref()
                    .filter(|c| !c.is_empty())
                    .unwrap_or("PANCAM");
                let page = self.mer.list_photos(rover, sol, camera, query.page).await?;
                Ok(page.photos)
            }
        }
    }

    /// Photos taken in the last 24 hours (active rovers only)
    pub async fn fetch_latest_photos(&self, rover: RoverName) -> ApiResult<Vec<Photo>> {
        let since = (Utc::now() - Duration::hours(24)).date_naive();
        let params = latest_params(rover, since)
            .ok_or_else(|| ApiError::UnsupportedRover(rover.to_string()))?;
        self.raw_images.fetch(rover, &params).await.map_err(|e| {
            error!("{} latest photo feed error: {}", rover, e);
            e
        })
    }

    /// Highest sol with imagery. Retired rovers report their final sol;
    /// active rovers use the newest photo, or a static estimate if the feed fails.
    pub async fn fetch_rover_info(&self, rover: RoverName) -> RoverInfo {
        let profile = rover.profile();
        if let Some(max_sol) = profile.final_max_sol {
            return RoverInfo { max_sol };
        }

        match self.fetch_latest_photos(rover).await {
            Ok(photos) => {
                if let Some(photo) = photos.first() {
                    return RoverInfo { max_sol: photo.sol };
                }
                info!("No recent {} photos, using estimated max sol", rover);
            }
            Err(e) => warn!("Latest {} photos unavailable, using estimate: {}", rover, e),
        }

        RoverInfo {
            max_sol: profile.fallback_max_sol,
        }
    }
}

/// Image bytes relayed from the archive
#[derive(Debug)]
pub struct ProxiedImage {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Re-fetches archive images; only URLs under the trusted prefix are allowed
pub struct ImageProxyService {
    fetcher: ImageFetcher,
    trusted_prefix: String,
}

impl ImageProxyService {
    pub fn new(fetcher: ImageFetcher, trusted_prefix: String) -> Self {
        Self {
            fetcher,
            trusted_prefix,
        }
    }

    pub fn validate(&self, url: &str) -> ApiResult<()> {
        if url.is_empty() {
            return Err(ApiError::InvalidInput("Missing url parameter".to_string()));
        }
        if !url.starts_with(&self.trusted_prefix) {
            return Err(ApiError::InvalidInput("Invalid image URL".to_string()));
        }
        Ok(())
    }

    pub async fn fetch(&self, url: &str) -> ApiResult<ProxiedImage> {
        self.validate(url)?;

        let resp = match self.fetcher.fetch_with_retry(url).await {
            Ok(resp) => resp,
            Err(e) => {
                error!("Failed to proxy image {}: {}", url, e);
                return Err(ApiError::Internal("Failed to fetch image".to_string()));
            }
        };

        let status = resp.status();
        if !status.is_success() {
            error!("Failed to proxy image {}: upstream {}", url, status);
            return Err(ApiError::upstream(
                status.as_u16(),
                format!("Failed to fetch image: {}", status.as_u16()),
            ));
        }

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/jpeg")
            .to_string();

        let bytes = resp.bytes().await.map_err(|e| {
            error!("Failed to read image body {}: {}", url, e);
            ApiError::Internal("Failed to fetch image".to_string())
        })?;

        Ok(ProxiedImage {
            content_type,
            bytes: bytes.to_vec(),
        })
    }
}

/// APOD and EPIC forwarding service
pub struct SpaceService {
    nasa_client: NasaClient,
}

impl SpaceService {
    pub fn new(nasa_client: NasaClient) -> Self {
        Self { nasa_client }
    }

    /// Relay APOD for today, or for an inclusive date range
    pub async fn apod(&self, range: Option<(&str, &str)>) -> ApiResult<Value> {
        self.nasa_client.fetch_apod(range).await.map_err(|e| {
            error!("APOD proxy error: {}", e);
            e
        })
    }

    /// Both EPIC collections, fetched concurrently. A failed collection
    /// comes back empty without affecting the other.
    pub async fn epic_collections(&self) -> EpicCollections {
        let (natural_images, enhanced_images) = tokio::join!(
            self.epic_or_empty(EpicCollection::Natural),
            self.epic_or_empty(EpicCollection::Enhanced)
        );

        EpicCollections {
            natural_images,
            enhanced_images,
        }
    }

    async fn epic_or_empty(&self, collection: EpicCollection) -> Vec<EpicPhoto> {
        match self.nasa_client.fetch_epic(collection).await {
            Ok(photos) => photos,
            Err(e) => {
                warn!("EPIC {} fetch failed: {}", collection.as_str(), e);
                Vec::new()
            }
        }
    }

    /// Most recent capture dates for a collection, newest first
    pub async fn epic_available_dates(&self, collection: EpicCollection) -> Vec<String> {
        match self.nasa_client.fetch_epic_dates(collection).await {
            Ok(mut dates) => {
                dates.sort_unstable_by(|a, b| b.cmp(a));
                dates.truncate(EPIC_DATES_LIMIT);
                dates
            }
            Err(e) => {
                warn!("EPIC {} dates fetch failed: {}", collection.as_str(), e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::HttpClient;
    use crate::config::AppConfig;
    use crate::listing::RegexListingParser;
    use axum::{extract::State, http::StatusCode, routing::get, Router};
    use mockito::Matcher;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn listing_row(name: &str, size: &str) -> String {
        format!(
            r#"<tr><td><img src="/icons/image2.gif" alt="[IMG]"></td><td><a href="{name}">{name}</a></td><td align="right">2012-09-20 14:01  </td><td align="right">{size}</td></tr>"#
        )
    }

    fn mer_service(config: &AppConfig) -> MerService {
        MerService::new(
            MerArchiveClient::new(
                HttpClient::new().unwrap(),
                config.upstreams.pds_base_url.clone(),
            ),
            Box::new(RegexListingParser),
        )
    }

    #[tokio::test]
    async fn test_mer_listing_404_is_empty_page() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/img/data/mer/spirit/mer2po_0xxx/browse/sol0007/rdr/")
            .with_status(404)
            .create_async()
            .await;

        let config = AppConfig::for_upstream(&server.url());
        let page = mer_service(&config)
            .list_photos(RoverName::Spirit, 7, "PANCAM", 0)
            .await
            .unwrap();

        assert!(page.photos.is_empty());
        assert_eq!(page.total, 0);
        assert!(!page.has_more);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_mer_listing_server_error_propagates_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/img/data/mer/opportunity/mer1no_0xxx/browse/sol0100/rdr/")
            .with_status(502)
            .create_async()
            .await;

        let config = AppConfig::for_upstream(&server.url());
        let err = mer_service(&config)
            .list_photos(RoverName::Opportunity, 100, "NAVCAM", 0)
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Upstream { status: 502, .. }));
    }

    #[tokio::test]
    async fn test_mer_invalid_input_is_rejected_before_fetch() {
        let config = AppConfig::for_upstream("http://127.0.0.1:9");
        let service = mer_service(&config);

        let err = service
            .list_photos(RoverName::Spirit, 0, "PANCAM", 0)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput(_)));

        let err = service
            .list_photos(RoverName::Curiosity, 5, "PANCAM", 0)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::UnsupportedRover(_)));
    }

    #[tokio::test]
    async fn test_mer_pagination_dedup_and_ids() {
        let mut rows: Vec<String> = (0..30)
            .map(|i| listing_row(&format!("1p{:09}eff0000p2303l2m1.jpg", i), "40K"))
            .collect();
        // Repeats and thumbnails must not count toward the total
        rows.push(listing_row("1p000000000eff0000p2303l2m1.jpg", "40K"));
        rows.push(listing_row("1p999999999thumb.jpg", "4K"));
        let html = format!("<html><table>{}</table></html>", rows.join("\n"));

        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/img/data/mer/opportunity/mer1po_0xxx/browse/sol0001/rdr/")
            .with_status(200)
            .with_body(html)
            .expect(3)
            .create_async()
            .await;

        let config = AppConfig::for_upstream(&server.url());
        let service = mer_service(&config);

        let first = service
            .list_photos(RoverName::Opportunity, 1, "UNKNOWN_CAM", 0)
            .await
            .unwrap();
        assert_eq!(first.total, 30);
        assert_eq!(first.photos.len(), 25);
        assert!(first.has_more);

        let photo = &first.photos[0];
        assert_eq!(photo.camera.name, "PANCAM");
        assert_eq!(photo.camera.full_name, "Panoramic Camera");
        assert_eq!(photo.rover.name, "Opportunity");
        assert_eq!(photo.rover.max_sol, 5111);
        assert_eq!(photo.earth_date, "");
        assert_eq!(photo.id, stable_photo_id("1p000000000eff0000p2303l2m1"));
        let direct = format!(
            "{}/img/data/mer/opportunity/mer1po_0xxx/browse/sol0001/rdr/1p000000000eff0000p2303l2m1.jpg",
            server.url()
        );
        assert_eq!(
            photo.img_src,
            format!("/api/mer-image?url={}", urlencoding::encode(&direct))
        );

        let mut ids: Vec<i64> = first.photos.iter().map(|p| p.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 25);

        let second = service
            .list_photos(RoverName::Opportunity, 1, "PANCAM", 1)
            .await
            .unwrap();
        assert_eq!(second.photos.len(), 5);
        assert!(!second.has_more);

        let again = service
            .list_photos(RoverName::Opportunity, 1, "PANCAM", 0)
            .await
            .unwrap();
        assert_eq!(again.photos[3].id, first.photos[3].id);
    }

    #[test]
    fn test_mer_photo_offsets_colliding_hashes() {
        let a = mer_photo(RoverName::Spirit, MerCamera::Pancam, 3, "http://x/", "same.jpg", 0);
        let b = mer_photo(RoverName::Spirit, MerCamera::Pancam, 3, "http://x/", "same.jpg", 1);
        assert_eq!(b.id, a.id + 1);
    }

    #[test]
    fn test_mer_photo_strips_only_first_extension() {
        let photo = mer_photo(RoverName::Spirit, MerCamera::Pancam, 3, "http://x/", "x.jpg_y.jpg", 0);
        assert_eq!(photo.id, stable_photo_id("x_y.jpg"));
    }

    #[tokio::test]
    async fn test_rover_service_delegates_mer_with_defaults() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/img/data/mer/spirit/mer2po_0xxx/browse/sol0012/rdr/")
            .with_status(200)
            .with_body(listing_row("2p1.jpg", "64K"))
            .create_async()
            .await;

        let config = AppConfig::for_upstream(&server.url());
        let http = HttpClient::new().unwrap();
        let service = RoverService::new(
            RawImageClient::new(http, &config.upstreams),
            Arc::new(mer_service(&config)),
        );

        let query = PhotoQuery {
            sol_min: Some(12),
            sol_max: Some(40),
            ..Default::default()
        };
        let photos = service.fetch_photos(RoverName::Spirit, &query).await.unwrap();

        assert_eq!(photos.len(), 1);
        assert_eq!(photos[0].sol, 12);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rover_service_sol_precedence_on_live_feed() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/rss/api/")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("feed".into(), "raw_images".into()),
                Matcher::UrlEncoded("condition_2".into(), "50:sol:gte".into()),
                Matcher::UrlEncoded("condition_3".into(), "50:sol:lte".into()),
                Matcher::UrlEncoded("search".into(), "MCZ_LEFT".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"images":[],"total_images":0,"page":0,"per_page":"25"}"#)
            .create_async()
            .await;

        let config = AppConfig::for_upstream(&server.url());
        let service = RoverService::new(
            RawImageClient::new(HttpClient::new().unwrap(), &config.upstreams),
            Arc::new(mer_service(&config)),
        );
        let query = PhotoQuery {
            sol: Some(50),
            sol_min: Some(1),
            sol_max: Some(99),
            camera: Some("MCZ_LEFT".to_string()),
            ..Default::default()
        };
        let photos = service
            .fetch_photos(RoverName::Perseverance, &query)
            .await
            .unwrap();

        assert!(photos.is_empty());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rover_info() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/raw_image_items/")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"items":[{"id":1,"sol":4321,"instrument":"NAV_LEFT_B","url":"u","date_taken_utc":"2024-09-01T00:00:00Z"}],"total":1,"page":0,"per_page":50}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/rss/api/")
            .match_query(Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        let config = AppConfig::for_upstream(&server.url());
        let service = RoverService::new(
            RawImageClient::new(HttpClient::new().unwrap(), &config.upstreams),
            Arc::new(mer_service(&config)),
        );

        assert_eq!(service.fetch_rover_info(RoverName::Spirit).await.max_sol, 2208);
        assert_eq!(service.fetch_rover_info(RoverName::Opportunity).await.max_sol, 5111);
        assert_eq!(service.fetch_rover_info(RoverName::Curiosity).await.max_sol, 4321);
        assert_eq!(service.fetch_rover_info(RoverName::Perseverance).await.max_sol, 1400);

        let err = service
            .fetch_latest_photos(RoverName::Opportunity)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::UnsupportedRover(_)));
    }

    #[tokio::test]
    async fn test_rover_feed_error_keeps_upstream_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/raw_image_items/")
            .match_query(Matcher::Any)
            .with_status(503)
            .expect(2)
            .create_async()
            .await;

        let config = AppConfig::for_upstream(&server.url());
        let service = RoverService::new(
            RawImageClient::new(HttpClient::new().unwrap(), &config.upstreams),
            Arc::new(mer_service(&config)),
        );

        let err = service
            .fetch_photos(RoverName::Curiosity, &PhotoQuery::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Upstream { status: 503, .. }));

        let err = service
            .fetch_latest_photos(RoverName::Curiosity)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    fn image_proxy(config: &AppConfig) -> ImageProxyService {
        ImageProxyService::new(
            ImageFetcher::new(
                HttpClient::with_timeout(config.image_fetch.attempt_timeout).unwrap(),
                config.image_fetch.clone(),
            ),
            config.upstreams.pds_base_url.clone(),
        )
    }

    #[tokio::test]
    async fn test_image_proxy_rejects_untrusted_url_without_fetching() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let config = AppConfig::for_upstream(&server.url());
        let proxy = image_proxy(&config);

        let err = proxy
            .fetch(&format!("{}/elsewhere/cat.jpg", server.url()))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput(_)));

        let err = proxy.fetch("").await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput(_)));

        mock.assert_async().await;
    }

    async fn flaky_image(State(hits): State<Arc<AtomicUsize>>) -> (StatusCode, [(&'static str, &'static str); 1], Vec<u8>) {
        if hits.fetch_add(1, Ordering::SeqCst) < 2 {
            (StatusCode::INTERNAL_SERVER_ERROR, [("content-type", "text/plain")], b"busy".to_vec())
        } else {
            (StatusCode::OK, [("content-type", "image/jpeg")], vec![0xFF, 0xD8, 0xFF, 0xE0])
        }
    }

    #[tokio::test]
    async fn test_image_proxy_retries_server_errors() {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route("/img/data/mer/spirit/a.jpg", get(flaky_image))
            .with_state(hits.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let config = AppConfig::for_upstream(&base);
        let image = image_proxy(&config)
            .fetch(&format!("{}/img/data/mer/spirit/a.jpg", base))
            .await
            .unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert_eq!(image.content_type, "image/jpeg");
        assert_eq!(image.bytes, vec![0xFF, 0xD8, 0xFF, 0xE0]);
    }

    #[tokio::test]
    async fn test_image_proxy_returns_final_server_error() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/img/data/mer/spirit/b.jpg")
            .with_status(503)
            .expect(3)
            .create_async()
            .await;

        let config = AppConfig::for_upstream(&server.url());
        let err = image_proxy(&config)
            .fetch(&format!("{}/img/data/mer/spirit/b.jpg", server.url()))
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Upstream { status: 503, .. }));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_image_proxy_does_not_retry_client_errors() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/img/data/mer/spirit/missing.jpg")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let config = AppConfig::for_upstream(&server.url());
        let err = image_proxy(&config)
            .fetch(&format!("{}/img/data/mer/spirit/missing.jpg", server.url()))
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Upstream { status: 404, .. }));
        mock.assert_async().await;
    }

    async fn slow_image(State(hits): State<Arc<AtomicUsize>>) -> (StatusCode, [(&'static str, &'static str); 1], Vec<u8>) {
        if hits.fetch_add(1, Ordering::SeqCst) < 2 {
            tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        }
        (StatusCode::OK, [("content-type", "image/jpeg")], vec![0xFF, 0xD8])
    }

    async fn stalled_image(State(hits): State<Arc<AtomicUsize>>) -> StatusCode {
        hits.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        StatusCode::OK
    }

    async fn serve_image_stub(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        base
    }

    #[tokio::test]
    async fn test_image_proxy_retries_timed_out_attempts() {
        let hits = Arc::new(AtomicUsize::new(0));
        let base = serve_image_stub(
            Router::new()
                .route("/img/data/mer/spirit/slow.jpg", get(slow_image))
                .with_state(hits.clone()),
        )
        .await;

        let mut config = AppConfig::for_upstream(&base);
        config.image_fetch.attempt_timeout = std::time::Duration::from_millis(100);
        let image = image_proxy(&config)
            .fetch(&format!("{}/img/data/mer/spirit/slow.jpg", base))
            .await
            .unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert_eq!(image.content_type, "image/jpeg");
        assert_eq!(image.bytes, vec![0xFF, 0xD8]);
    }

    #[tokio::test]
    async fn test_image_proxy_gives_up_after_every_attempt_times_out() {
        let hits = Arc::new(AtomicUsize::new(0));
        let base = serve_image_stub(
            Router::new()
                .route("/img/data/mer/spirit/stalled.jpg", get(stalled_image))
                .with_state(hits.clone()),
        )
        .await;

        let mut config = AppConfig::for_upstream(&base);
        config.image_fetch.attempt_timeout = std::time::Duration::from_millis(100);
        let err = image_proxy(&config)
            .fetch(&format!("{}/img/data/mer/spirit/stalled.jpg", base))
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Internal(_)));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    fn space_service(config: &AppConfig) -> SpaceService {
        SpaceService::new(NasaClient::new(
            HttpClient::new().unwrap(),
            config.nasa_api_key.clone(),
            config.epic_public_key.clone(),
            &config.upstreams,
        ))
    }

    #[tokio::test]
    async fn test_apod_forwards_date_range() {
        let body = r#"[{"date":"2024-01-01","title":"A"},{"date":"2024-01-02","title":"B"},{"date":"2024-01-03","title":"C"}]"#;
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/planetary/apod")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("api_key".into(), "TEST_KEY".into()),
                Matcher::UrlEncoded("start_date".into(), "2024-01-01".into()),
                Matcher::UrlEncoded("end_date".into(), "2024-01-03".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create_async()
            .await;

        let config = AppConfig::for_upstream(&server.url());
        let data = space_service(&config)
            .apod(Some(("2024-01-01", "2024-01-03")))
            .await
            .unwrap();

        let expected: Value = serde_json::from_str(body).unwrap();
        assert_eq!(data, expected);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_apod_mirrors_upstream_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/planetary/apod")
            .match_query(Matcher::Any)
            .with_status(429)
            .create_async()
            .await;

        let config = AppConfig::for_upstream(&server.url());
        let err = space_service(&config).apod(None).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_epic_enhanced_failure_keeps_natural() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/EPIC/api/natural")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[{"identifier":"1","caption":"c","image":"epic_1b_1","date":"2024-03-02 01:02:03","centroid_coordinates":{"lat":1.0,"lon":2.0}}]"#)
            .create_async()
            .await;
        server
            .mock("GET", "/EPIC/api/enhanced")
            .match_query(Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        let config = AppConfig::for_upstream(&server.url());
        let collections = space_service(&config).epic_collections().await;

        assert_eq!(collections.natural_images.len(), 1);
        assert!(collections.enhanced_images.is_empty());
    }

    #[tokio::test]
    async fn test_epic_dates_newest_thirty() {
        let dates: Vec<String> = (1..=40)
            .map(|d| format!("2024-{:02}-{:02}", 1 + (d - 1) / 28, 1 + (d - 1) % 28))
            .collect();
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/EPIC/api/enhanced/available")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(serde_json::to_string(&dates).unwrap())
            .create_async()
            .await;

        let config = AppConfig::for_upstream(&server.url());
        let service = space_service(&config);
        let got = service.epic_available_dates(EpicCollection::Enhanced).await;

        assert_eq!(got.len(), EPIC_DATES_LIMIT);
        assert_eq!(got[0], "2024-02-12");
        assert!(got.windows(2).all(|w| w[0] > w[1]));

        // Unmocked collection fails upstream and comes back empty
        assert!(service
            .epic_available_dates(EpicCollection::Natural)
            .await
            .is_empty());
    }
}
