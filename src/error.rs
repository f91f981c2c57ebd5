use std::fmt;

use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub type Result<T> = std::result::Result<T, AppError>;

/// Backend endpoints, used to tell network failures apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Species,
    Trends,
    Contributors,
    Sightings,
    Checklists,
    Submit,
    Delete,
    CheckLogin,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Endpoint::Species => "species",
            Endpoint::Trends => "trends",
            Endpoint::Contributors => "contributors",
            Endpoint::Sightings => "sightings",
            Endpoint::Checklists => "checklists",
            Endpoint::Submit => "submit",
            Endpoint::Delete => "delete",
            Endpoint::CheckLogin => "check_login",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid coordinate: lat {lat}, lng {lng}")]
    InvalidCoordinate { lat: f64, lng: f64 },

    #[error("Invalid bounds '{0}', expected west,south,east,north")]
    InvalidBounds(String),

    #[error("Missing latitude or longitude")]
    MissingLocation,

    #[error("Request to {endpoint} endpoint failed: {source}")]
    Network {
        endpoint: Endpoint,
        #[source]
        source: BoxError,
    },

    #[error("Failed to submit checklist: {0}")]
    SubmissionFailed(#[source] Box<AppError>),

    #[error("Failed to delete checklist {id}: {source}")]
    DeletionFailed {
        id: String,
        #[source]
        source: Box<AppError>,
    },

    #[error("You must be logged in to view this data")]
    Unauthenticated,

    #[error("Checklist {0} not found")]
    ChecklistNotFound(String),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl AppError {
    pub fn network(endpoint: Endpoint, source: impl Into<BoxError>) -> Self {
        AppError::Network {
            endpoint,
            source: source.into(),
        }
    }

    /// Endpoint of a network failure, looking through submission and deletion wrappers.
    pub fn endpoint(&self) -> Option<Endpoint> {
        match self {
            AppError::Network { endpoint, .. } => Some(*endpoint),
            AppError::SubmissionFailed(inner) => inner.endpoint(),
            AppError::DeletionFailed { source, .. } => source.endpoint(),
            _ => None,
        }
    }
}
