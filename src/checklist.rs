//! Composing a new checklist or editing an existing one.

use std::sync::Arc;

use indexmap::IndexMap;
use log::{error, info, warn};
use reqwest::Url;
use tokio::sync::watch;

use crate::client::BirdApi;
use crate::config::Config;
use crate::coordinator::{Outcome, Policy, RequestCoordinator};
use crate::error::{AppError, Result};
use crate::geo::{LatLng, edit_id_from_url};
use crate::heatmap::contains_ignore_case;
use crate::notify::Notifier;
use crate::record::{Checklist, ChecklistPayload, SpeciesCount};

pub const DEFAULT_DURATION_MINUTES: u32 = 60;

const LOAD_KEY: &str = "checklist";
const SUBMIT_KEY: &str = "submit";

/// Species names matching the search box, case-insensitively.
pub fn filter_species<'a>(species: &'a [String], query: &str) -> Vec<&'a str> {
    species
        .iter()
        .filter(|name| contains_ignore_case(name, query))
        .map(String::as_str)
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChecklistDraft {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub duration_minutes: Option<u32>,
    /// Counts in the order species were first recorded.
    pub species_counts: IndexMap<String, u32>,
    pub edit_id: Option<String>,
}

impl ChecklistDraft {
    /// Draft for editing `checklist`, stored under `edit_id`.
    pub fn from_checklist(edit_id: &str, checklist: &Checklist) -> Self {
        Self {
            lat: Some(checklist.latitude),
            lng: Some(checklist.longitude),
            duration_minutes: Some(
                checklist
                    .duration
                    .filter(|&minutes| minutes > 0)
                    .unwrap_or(DEFAULT_DURATION_MINUTES),
            ),
            species_counts: checklist
                .species
                .iter()
                .map(|s| (s.name.clone(), s.count))
                .collect(),
            edit_id: Some(edit_id.to_string()),
        }
    }

    pub fn increment(&mut self, species: &str) {
        self.add(species, 1);
    }

    /// Adds `count` sightings of `species` at once, saturating at `u32::MAX`.
    pub fn add(&mut self, species: &str, count: u32) {
        let entry = self.species_counts.entry(species.to_string()).or_insert(0);
        *entry = entry.saturating_add(count);
    }

    pub fn count(&self, species: &str) -> u32 {
        self.species_counts.get(species).copied().unwrap_or(0)
    }

    pub fn set_location(&mut self, lat: f64, lng: f64) -> Result<()> {
        let point = LatLng::new(lat, lng)?;
        self.lat = Some(point.lat);
        self.lng = Some(point.lng);
        Ok(())
    }

    /// Duration that will be submitted; unset or zero means the default hour.
    pub fn effective_duration(&self) -> u32 {
        self.duration_minutes
            .filter(|&minutes| minutes > 0)
            .unwrap_or(DEFAULT_DURATION_MINUTES)
    }

    /// Request body for this draft. Species with a zero count are left out.
    pub fn payload(&self) -> Result<ChecklistPayload> {
        let (Some(lat), Some(lng)) = (self.lat, self.lng) else {
            return Err(AppError::MissingLocation);
        };

        Ok(ChecklistPayload {
            lat,
            lng,
            duration: self.effective_duration(),
            species: self
                .species_counts
                .iter()
                .filter(|&(_, &count)| count > 0)
                .map(|(name, &count)| SpeciesCount {
                    name: name.clone(),
                    count,
                })
                .collect(),
            edit_id: self.edit_id.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormMode {
    Create,
    Edit(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Saved; the page should navigate to `redirect`.
    Submitted { redirect: String },
    /// A submission from this form is still in flight.
    AlreadySubmitting,
}

/// The checklist page.
pub struct ChecklistForm<A> {
    api: Arc<A>,
    config: Config,
    notifier: Arc<dyn Notifier>,
    coordinator: RequestCoordinator,
    species_list: Vec<String>,
    draft: watch::Sender<ChecklistDraft>,
}

impl<A: BirdApi> ChecklistForm<A> {
    pub fn new(
        api: Arc<A>,
        config: Config,
        notifier: Arc<dyn Notifier>,
        species_list: Vec<String>,
        draft: ChecklistDraft,
    ) -> Self {
        let (draft, _rx) = watch::channel(draft);
        Self {
            api,
            config,
            notifier,
            coordinator: RequestCoordinator::new(),
            species_list,
            draft,
        }
    }

    /// Form for a checklist page URL: `lat`/`lng` preset the location and
    /// `edit_id` switches to edit mode.
    pub fn open(
        api: Arc<A>,
        config: Config,
        notifier: Arc<dyn Notifier>,
        species_list: Vec<String>,
        page_url: &str,
    ) -> Self {
        let mut draft = ChecklistDraft {
            edit_id: edit_id_from_url(page_url),
            ..ChecklistDraft::default()
        };

        if let Ok(url) = Url::parse(page_url) {
            let param = |name: &str| {
                url.query_pairs()
                    .find(|(key, _)| key == name)
                    .and_then(|(_, value)| value.parse::<f64>().ok())
            };
            if let (Some(lat), Some(lng)) = (param("lat"), param("lng")) {
                if let Err(e) = draft.set_location(lat, lng) {
                    warn!("Ignoring location from page URL: {e}");
                }
            }
        }

        Self::new(api, config, notifier, species_list, draft)
    }

    pub fn mode(&self) -> FormMode {
        match &self.draft.borrow().edit_id {
            Some(id) => FormMode::Edit(id.clone()),
            None => FormMode::Create,
        }
    }

    pub fn draft(&self) -> ChecklistDraft {
        self.draft.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ChecklistDraft> {
        self.draft.subscribe()
    }

    pub fn filtered_species(&self, query: &str) -> Vec<&str> {
        filter_species(&self.species_list, query)
    }

    pub fn increment(&self, species: &str) {
        self.draft.send_modify(|draft| draft.increment(species));
    }

    pub fn increment_by(&self, species: &str, count: u32) {
        self.draft.send_modify(|draft| draft.add(species, count));
    }

    pub fn set_location(&self, lat: f64, lng: f64) -> Result<()> {
        let point = LatLng::new(lat, lng)?;
        self.draft.send_modify(|draft| {
            draft.lat = Some(point.lat);
            draft.lng = Some(point.lng);
        });
        Ok(())
    }

    pub fn set_duration(&self, minutes: Option<u32>) {
        self.draft.send_modify(|draft| draft.duration_minutes = minutes);
    }

    /// In edit mode, fills the form from the stored checklist.
    ///
    /// On failure the form is left empty rather than keeping a guessed location.
    pub async fn load(&self) -> bool {
        let FormMode::Edit(edit_id) = self.mode() else {
            return true;
        };

        let api = &self.api;
        let outcome = self
            .coordinator
            .fetch(LOAD_KEY, Policy::Supersede, || api.checklist(&edit_id))
            .await;

        match outcome {
            Outcome::Fresh(checklist) => {
                info!("Loaded checklist {edit_id} for editing");
                self.draft
                    .send_replace(ChecklistDraft::from_checklist(&edit_id, &checklist));
                true
            }
            Outcome::Failed(e) => {
                error!("Error fetching checklist for editing: {e}");
                self.notifier.notify(&e);
                self.draft.send_replace(ChecklistDraft::default());
                false
            }
            Outcome::Stale | Outcome::Suppressed => false,
        }
    }

    /// Sends the draft as a new checklist or as an update of the edited one.
    ///
    /// The draft is kept as-is when sending fails so the user can retry.
    pub async fn submit(&self) -> Result<SubmitOutcome> {
        let payload = self.draft.borrow().payload();
        let payload = match payload {
            Ok(payload) => payload,
            Err(e) => {
                self.notifier.alert(&e);
                return Err(e);
            }
        };
        self.draft
            .send_modify(|draft| draft.duration_minutes = Some(payload.duration));

        let api = &self.api;
        let outcome = self
            .coordinator
            .fetch(SUBMIT_KEY, Policy::Suppress, || api.submit(&payload))
            .await;

        match outcome {
            Outcome::Fresh(()) => {
                info!(
                    "Checklist submitted with {} species",
                    payload.species.len()
                );
                Ok(SubmitOutcome::Submitted {
                    redirect: self.config.my_checklists_url(),
                })
            }
            Outcome::Suppressed => Ok(SubmitOutcome::AlreadySubmitting),
            Outcome::Failed(e) => {
                error!("Error submitting checklist: {e}");
                let e = AppError::SubmissionFailed(Box::new(e));
                self.notifier.alert(&e);
                Err(e)
            }
            // Suppress never issues a second request, so nothing can supersede a submission.
            Outcome::Stale => Ok(SubmitOutcome::AlreadySubmitting),
        }
    }
}
