use std::{env, fmt::Display, str::FromStr, time::Duration};

use log::{info, warn};

use crate::error::Endpoint;

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000/birdwatcher";
const DEFAULT_USER_AGENT: &str = concat!("birdwatcher/", env!("CARGO_PKG_VERSION"));

/// Paths of the backend endpoints and pages, relative to the base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub species: String,
    pub trends: String,
    pub contributors: String,
    pub check_login: String,
    pub sightings: String,
    pub checklists: String,
    pub submit: String,
    pub delete: String,
    pub location_page: String,
    pub checklist_page: String,
    pub my_checklists_page: String,
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            species: "api/species_by_region".to_string(),
            trends: "api/species_trends".to_string(),
            contributors: "api/top_contributors".to_string(),
            check_login: "api/check_login".to_string(),
            sightings: "api/sightings".to_string(),
            checklists: "api/checklists".to_string(),
            submit: "submit_checklist".to_string(),
            delete: "my_checklist/delete".to_string(),
            location_page: "location".to_string(),
            checklist_page: "checklist".to_string(),
            my_checklists_page: "my_checklists".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: String,
    pub paths: Paths,
    pub timeout: Duration,
    pub max_retries: u32,
    pub base_delay: Duration,
    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            paths: Paths::default(),
            timeout: Duration::from_secs(10),
            max_retries: 2,
            base_delay: Duration::from_millis(250),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl Config {
    /// Loads the configuration from `BIRDWATCHER_*` environment variables.
    pub fn load() -> Self {
        let defaults = Self::default();
        Self {
            base_url: try_load("BIRDWATCHER_URL", defaults.base_url),
            timeout: Duration::from_secs(try_load(
                "BIRDWATCHER_TIMEOUT_SECS",
                defaults.timeout.as_secs(),
            )),
            max_retries: try_load("BIRDWATCHER_RETRIES", defaults.max_retries),
            base_delay: Duration::from_millis(try_load(
                "BIRDWATCHER_RETRY_DELAY_MS",
                defaults.base_delay.as_millis() as u64,
            )),
            ..defaults
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.base_delay = Duration::from_millis(delay_ms);
        self
    }

    /// Joins a relative path onto the base URL.
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub fn endpoint_url(&self, endpoint: Endpoint) -> String {
        let path = match endpoint {
            Endpoint::Species => &self.paths.species,
            Endpoint::Trends => &self.paths.trends,
            Endpoint::Contributors => &self.paths.contributors,
            Endpoint::Sightings => &self.paths.sightings,
            Endpoint::Checklists => &self.paths.checklists,
            Endpoint::Submit => &self.paths.submit,
            Endpoint::Delete => &self.paths.delete,
            Endpoint::CheckLogin => &self.paths.check_login,
        };
        self.url(path)
    }

    pub fn my_checklists_url(&self) -> String {
        self.url(&self.paths.my_checklists_page)
    }
}

fn try_load<T: FromStr + Display>(key: &str, default: T) -> T
where
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|e| {
            warn!("Invalid {key} value '{raw}': {e}, using default: {default}");
            default
        }),
        Err(_) => {
            info!("{key} not set, using default: {default}");
            default
        }
    }
}
