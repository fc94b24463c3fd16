/// Application configuration module
use std::env;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bind_addr: String,
    pub nasa_api_key: String,
    /// Key placed in EPIC archive links returned to clients
    pub epic_public_key: String,
    pub upstreams: Upstreams,
    pub image_fetch: ImageFetchSettings,
}

/// Base URLs of every upstream feed
#[derive(Clone, Debug)]
pub struct Upstreams {
    pub mars2020_api_url: String,
    pub msl_api_url: String,
    /// MER archive root; also the only prefix the image proxy will fetch from
    pub pds_base_url: String,
    pub apod_api_url: String,
    pub epic_api_url: String,
    pub epic_archive_url: String,
}

#[derive(Clone, Debug)]
pub struct ImageFetchSettings {
    pub attempts: u32,
    pub attempt_timeout: Duration,
    pub backoff_unit: Duration,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let bind_addr = env_string("BIND_ADDR", "0.0.0.0:3000");
        let nasa_api_key = env_string("NASA_API_KEY", "DEMO_KEY");
        let epic_public_key = env_string("EPIC_PUBLIC_KEY", "DEMO_KEY");

        let upstreams = Upstreams {
            mars2020_api_url: env_string("MARS2020_API_URL", "https://mars.nasa.gov/rss/api/"),
            msl_api_url: env_string(
                "MSL_API_URL",
                "https://mars.nasa.gov/api/v1/raw_image_items/",
            ),
            pds_base_url: env_string(
                "PDS_BASE_URL",
                "https://planetarydata.jpl.nasa.gov/img/data/mer",
            ),
            apod_api_url: env_string("APOD_API_URL", "https://api.nasa.gov/planetary/apod"),
            epic_api_url: env_string("EPIC_API_URL", "https://api.nasa.gov/EPIC/api"),
            epic_archive_url: env_string(
                "EPIC_ARCHIVE_URL",
                "https://api.nasa.gov/EPIC/archive",
            ),
        };

        let image_fetch = ImageFetchSettings {
            attempts: env_u64("IMAGE_FETCH_ATTEMPTS", 3).max(1) as u32,
            attempt_timeout: Duration::from_secs(env_u64("IMAGE_FETCH_TIMEOUT_SECONDS", 30)),
            backoff_unit: Duration::from_millis(env_u64("IMAGE_FETCH_BACKOFF_MS", 1000)),
        };

        Ok(Self {
            bind_addr,
            nasa_api_key,
            epic_public_key,
            upstreams,
            image_fetch,
        })
    }

    /// Configuration with every upstream rooted at `base`, for tests against a local stub
    #[cfg(test)]
    pub fn for_upstream(base: &str) -> Self {
        Self {
            bind_addr: "127.0.0.1:0".to_string(),
            nasa_api_key: "TEST_KEY".to_string(),
            epic_public_key: "DEMO_KEY".to_string(),
            upstreams: Upstreams {
                mars2020_api_url: format!("{}/rss/api/", base),
                msl_api_url: format!("{}/api/v1/raw_image_items/", base),
                pds_base_url: format!("{}/img/data/mer", base),
                apod_api_url: format!("{}/planetary/apod", base),
                epic_api_url: format!("{}/EPIC/api", base),
                epic_archive_url: format!("{}/EPIC/archive", base),
            },
            image_fetch: ImageFetchSettings {
                attempts: 3,
                attempt_timeout: Duration::from_secs(5),
                backoff_unit: Duration::from_millis(10),
            },
        }
    }
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
