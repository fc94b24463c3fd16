/// External API clients module
use crate::config::{ImageFetchSettings, Upstreams};
use crate::domain::{
    camera_search_term, Camera, Centroid, EpicCollection, EpicPhoto, MerCamera, Photo,
    PhotoQuery, RoverName,
};
use crate::errors::{ApiError, ApiResult};
use crate::utils::{date_part, stable_photo_id};
use chrono::NaiveDate;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Items per page on the rover feeds and the MER archive
pub const PAGE_SIZE: u32 = 25;
/// Items requested for the "latest photos" window
pub const LATEST_PAGE_SIZE: u32 = 50;

/// HTTP client wrapper with common configuration
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new() -> ApiResult<Self> {
        Self::with_timeout(Duration::from_secs(30))
    }

    /// Client whose whole-request deadline is `timeout`
    pub fn with_timeout(timeout: Duration) -> ApiResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("rust-mars-service/1.0")
            .build()?;
        Ok(Self { client })
    }

    pub fn get_client(&self) -> &Client {
        &self.client
    }
}

/// Fail with the upstream status unless the response is a success
fn ensure_success(resp: Response, source: &str) -> ApiResult<Response> {
    let status = resp.status();
    if status.is_success() {
        Ok(resp)
    } else {
        Err(ApiError::upstream(
            status.as_u16(),
            format!("{} error: {}", source, status.as_u16()),
        ))
    }
}

type Params = Vec<(String, String)>;

#[derive(Debug, Deserialize)]
struct Mars2020Response {
    #[serde(default)]
    images: Vec<Mars2020Image>,
}

#[derive(Debug, Deserialize)]
struct Mars2020Image {
    imageid: String,
    sol: i64,
    #[serde(default)]
    camera: Option<Mars2020Camera>,
    #[serde(default)]
    image_files: Option<Mars2020Files>,
    #[serde(default)]
    date_taken_utc: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Mars2020Camera {
    #[serde(default)]
    instrument: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Mars2020Files {
    #[serde(default)]
    medium: Option<String>,
    #[serde(default)]
    large: Option<String>,
    #[serde(default)]
    full_res: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MslResponse {
    #[serde(default)]
    items: Vec<MslImage>,
}

#[derive(Debug, Deserialize)]
struct MslImage {
    id: i64,
    sol: i64,
    #[serde(default)]
    instrument: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    date_taken_utc: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
}

fn non_empty(s: &Option<String>) -> Option<&str> {
    s.as_deref().filter(|s| !s.is_empty())
}

fn feed_camera(rover: RoverName, instrument: Option<&str>) -> Camera {
    Camera {
        id: 0,
        name: instrument.unwrap_or("Unknown").to_string(),
        rover_id: rover.profile().id,
        full_name: instrument.unwrap_or("Unknown Camera").to_string(),
    }
}

impl Mars2020Image {
    fn into_photo(self) -> Photo {
        let instrument = self.camera.as_ref().and_then(|c| non_empty(&c.instrument));
        let img_src = self
            .image_files
            .as_ref()
            .and_then(|f| {
                non_empty(&f.large)
                    .or_else(|| non_empty(&f.medium))
                    .or_else(|| non_empty(&f.full_res))
            })
            .unwrap_or_default()
            .to_string();

        Photo {
            id: stable_photo_id(&self.imageid),
            sol: self.sol,
            camera: feed_camera(RoverName::Perseverance, instrument),
            img_src,
            earth_date: non_empty(&self.date_taken_utc)
                .map(date_part)
                .unwrap_or_default()
                .to_string(),
            rover: RoverName::Perseverance.rover_record(),
        }
    }
}

impl MslImage {
    fn into_photo(self) -> Photo {
        let earth_date = non_empty(&self.date_taken_utc)
            .or_else(|| non_empty(&self.created_at))
            .map(date_part)
            .unwrap_or_default()
            .to_string();

        Photo {
            id: self.id,
            sol: self.sol,
            camera: feed_camera(RoverName::Curiosity, non_empty(&self.instrument)),
            img_src: self.url.unwrap_or_default(),
            earth_date,
            rover: RoverName::Curiosity.rover_record(),
        }
    }
}

/// Appends `condition_N` filters starting at index 2 (index 1 is reserved
/// for the mission condition on the Curiosity feed). A single sol wins over
/// a sol range.
fn push_conditions(params: &mut Params, query: &PhotoQuery) {
    let mut conditions = Vec::new();

    if let Some(sol) = query.sol {
        conditions.push(format!("{}:sol:gte", sol));
        conditions.push(format!("{}:sol:lte", sol));
    } else {
        if let Some(min) = query.sol_min {
            conditions.push(format!("{}:sol:gte", min));
        }
        if let Some(max) = query.sol_max {
            conditions.push(format!("{}:sol:lte", max));
        }
    }

    if let Some(start) = query.date_start.as_deref().filter(|s| !s.is_empty()) {
        conditions.push(format!("{}:date_taken:gte", start));
    }
    if let Some(end) = query.date_end.as_deref().filter(|s| !s.is_empty()) {
        conditions.push(format!("{}:date_taken:lte", end));
    }

    for (i, condition) in conditions.into_iter().enumerate() {
        params.push((format!("condition_{}", i + 2), condition));
    }

    let mut terms = Vec::new();
    if let Some(camera) = query.camera.as_deref().filter(|s| !s.is_empty()) {
        terms.push(camera_search_term(camera));
    }
    if let Some(search) = query.search.as_deref().filter(|s| !s.is_empty()) {
        terms.push(search);
    }
    if !terms.is_empty() {
        params.push(("search".to_string(), terms.join(" ")));
    }
}

fn pair(k: &str, v: impl ToString) -> (String, String) {
    (k.to_string(), v.to_string())
}

/// Query for the Perseverance raw-image feed
pub fn perseverance_params(query: &PhotoQuery) -> Params {
    let mut params = vec![
        pair("feed", "raw_images"),
        pair("category", "mars2020"),
        pair("feedtype", "json"),
        pair("num", PAGE_SIZE),
        pair("page", query.page),
    ];
    push_conditions(&mut params, query);
    params
}

/// Query for the Curiosity raw-image feed
pub fn curiosity_params(query: &PhotoQuery) -> Params {
    let mut params = vec![
        pair("order", "sol desc,date_taken desc"),
        pair("per_page", PAGE_SIZE),
        pair("page", query.page),
        pair("condition_1", "msl:mission"),
    ];
    push_conditions(&mut params, query);
    params
}

/// Query for everything taken on or after `since`
pub fn latest_params(rover: RoverName, since: NaiveDate) -> Option<Params> {
    let window = format!("{}:date_taken:gte", since.format("%Y-%m-%d"));
    match rover {
        RoverName::Perseverance => Some(vec![
            pair("feed", "raw_images"),
            pair("category", "mars2020"),
            pair("feedtype", "json"),
            pair("num", LATEST_PAGE_SIZE),
            pair("condition_2", window),
        ]),
        RoverName::Curiosity => Some(vec![
            pair("order", "sol desc,date_taken desc"),
            pair("per_page", LATEST_PAGE_SIZE),
            pair("page", 0),
            pair("condition_1", "msl:mission"),
            pair("condition_2", window),
        ]),
        RoverName::Opportunity | RoverName::Spirit => None,
    }
}

/// Client for the raw-image feeds of the active rovers
pub struct RawImageClient {
    http_client: HttpClient,
    mars2020_url: String,
    msl_url: String,
}

impl RawImageClient {
    pub fn new(http_client: HttpClient, upstreams: &Upstreams) -> Self {
        Self {
            http_client,
            mars2020_url: upstreams.mars2020_api_url.clone(),
            msl_url: upstreams.msl_api_url.clone(),
        }
    }

    /// Fetch one page of photos from the feed matching `rover`
    pub async fn fetch(&self, rover: RoverName, params: &Params) -> ApiResult<Vec<Photo>> {
        match rover {
            RoverName::Perseverance => {
                let data: Mars2020Response = self.get_json(&self.mars2020_url, params).await?;
                Ok(data.images.into_iter().map(Mars2020Image::into_photo).collect())
            }
            RoverName::Curiosity => {
                let data: MslResponse = self.get_json(&self.msl_url, params).await?;
                Ok(data.items.into_iter().map(MslImage::into_photo).collect())
            }
            other => Err(ApiError::UnsupportedRover(other.to_string())),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        params: &Params,
    ) -> ApiResult<T> {
        debug!("GET {} with {} params", url, params.len());
        let resp = self
            .http_client
            .get_client()
            .get(url)
            .query(params)
            .send()
            .await?;

        let json = ensure_success(resp, "NASA API")?.json().await?;
        Ok(json)
    }
}

/// Client for the PDS archive holding Spirit and Opportunity imagery
pub struct MerArchiveClient {
    http_client: HttpClient,
    base_url: String,
}

impl MerArchiveClient {
    pub fn new(http_client: HttpClient, base_url: String) -> Self {
        Self {
            http_client,
            base_url,
        }
    }

    /// Browse directory for one camera on one sol, with trailing slash
    pub fn listing_url(&self, rover: RoverName, camera: MerCamera, sol: u32) -> String {
        // MER-1 is Opportunity, MER-2 is Spirit
        let mer_num = if rover == RoverName::Spirit { 2 } else { 1 };
        let rover_path = if rover == RoverName::Spirit {
            "spirit"
        } else {
            "opportunity"
        };
        format!(
            "{}/{}/mer{}{}_0xxx/browse/sol{:04}/rdr/",
            self.base_url,
            rover_path,
            mer_num,
            camera.dir_code(),
            sol
        )
    }

    /// Fetch listing markup; `None` when the archive has no such directory
    pub async fn fetch_listing(&self, url: &str) -> ApiResult<Option<String>> {
        let resp = self.http_client.get_client().get(url).send().await?;

        if resp.status() == StatusCode::NOT_FOUND {
            debug!("No archive directory at {}", url);
            return Ok(None);
        }

        let html = ensure_success(resp, "PDS archive")?.text().await?;
        Ok(Some(html))
    }
}

/// Fetches archive images with per-attempt timeout and linear backoff
pub struct ImageFetcher {
    http_client: HttpClient,
    settings: ImageFetchSettings,
}

impl ImageFetcher {
    pub fn new(http_client: HttpClient, settings: ImageFetchSettings) -> Self {
        Self {
            http_client,
            settings,
        }
    }

    /// Server errors and transport failures are retried after
    /// `attempt × backoff_unit`; the last attempt's outcome is returned as-is.
    pub async fn fetch_with_retry(&self, url: &str) -> ApiResult<Response> {
        let attempts = self.settings.attempts.max(1);
        let mut attempt: u32 = 0;

        loop {
            let is_last = attempt + 1 >= attempts;
            let request = self.http_client.get_client().get(url).send();

            match tokio::time::timeout(self.settings.attempt_timeout, request).await {
                Ok(Ok(resp)) if resp.status().is_server_error() && !is_last => {
                    warn!(
                        "Image fetch attempt {} got {} for {}",
                        attempt + 1,
                        resp.status(),
                        url
                    );
                }
                Ok(Ok(resp)) => return Ok(resp),
                Ok(Err(e)) if is_last => return Err(e.into()),
                Ok(Err(e)) => {
                    warn!("Image fetch attempt {} failed for {}: {}", attempt + 1, url, e);
                }
                Err(_) if is_last => {
                    return Err(ApiError::Internal(format!(
                        "Timed out after {:?} fetching {}",
                        self.settings.attempt_timeout, url
                    )));
                }
                Err(_) => {
                    warn!("Image fetch attempt {} timed out for {}", attempt + 1, url);
                }
            }

            attempt += 1;
            tokio::time::sleep(self.settings.backoff_unit * attempt).await;
        }
    }
}

#[derive(Debug, Deserialize)]
struct EpicImage {
    identifier: String,
    #[serde(default)]
    caption: String,
    image: String,
    date: String,
    #[serde(default)]
    centroid_coordinates: Centroid,
}

/// `2024-01-15 00:13:03` -> `2024/01/15`
fn epic_date_path(date: &str) -> String {
    date.split(' ').next().unwrap_or_default().replace('-', "/")
}

/// NASA APIs client (APOD, EPIC)
pub struct NasaClient {
    http_client: HttpClient,
    api_key: String,
    /// Embedded in archive links handed to browsers; never the private key
    public_key: String,
    apod_url: String,
    epic_api_url: String,
    epic_archive_url: String,
}

impl NasaClient {
    pub fn new(
        http_client: HttpClient,
        api_key: String,
        public_key: String,
        upstreams: &Upstreams,
    ) -> Self {
        Self {
            http_client,
            api_key,
            public_key,
            apod_url: upstreams.apod_api_url.clone(),
            epic_api_url: upstreams.epic_api_url.clone(),
            epic_archive_url: upstreams.epic_archive_url.clone(),
        }
    }

    /// Fetch Astronomy Picture of the Day, optionally for an inclusive date range
    pub async fn fetch_apod(&self, range: Option<(&str, &str)>) -> ApiResult<Value> {
        let mut req = self
            .http_client
            .get_client()
            .get(&self.apod_url)
            .query(&[("api_key", &self.api_key)]);

        if let Some((start, end)) = range {
            req = req.query(&[("start_date", start), ("end_date", end)]);
        }

        let json = ensure_success(req.send().await?, "NASA API")?.json().await?;
        Ok(json)
    }

    /// Fetch the most recent day of an EPIC collection
    pub async fn fetch_epic(&self, collection: EpicCollection) -> ApiResult<Vec<EpicPhoto>> {
        let url = format!("{}/{}", self.epic_api_url, collection.as_str());
        let resp = self
            .http_client
            .get_client()
            .get(&url)
            .query(&[("api_key", &self.api_key)])
            .send()
            .await?;

        let images: Vec<EpicImage> = ensure_success(resp, "EPIC API")?.json().await?;
        Ok(images
            .into_iter()
            .map(|image| self.epic_photo(collection, image))
            .collect())
    }

    /// Capture dates available for a collection, as listed upstream
    pub async fn fetch_epic_dates(&self, collection: EpicCollection) -> ApiResult<Vec<String>> {
        let url = format!("{}/{}/available", self.epic_api_url, collection.as_str());
        let resp = self
            .http_client
            .get_client()
            .get(&url)
            .query(&[("api_key", &self.api_key)])
            .send()
            .await?;

        let dates = ensure_success(resp, "EPIC API")?.json().await?;
        Ok(dates)
    }

    fn epic_photo(&self, collection: EpicCollection, image: EpicImage) -> EpicPhoto {
        let base = format!(
            "{}/{}/{}",
            self.epic_archive_url,
            collection.as_str(),
            epic_date_path(&image.date)
        );

        EpicPhoto {
            image_url: format!(
                "{}/png/{}.png?api_key={}",
                base, image.image, self.public_key
            ),
            thumbnail_url: format!(
                "{}/thumbs/{}.jpg?api_key={}",
                base, image.image, self.public_key
            ),
            id: image.identifier,
            caption: image.caption,
            date: image.date,
            centroid: image.centroid_coordinates,
        }
    }
}
