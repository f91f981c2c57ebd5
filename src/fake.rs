//! Scripted backend and collaborators for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::sync::oneshot;

use crate::client::BirdApi;
use crate::collection::Confirm;
use crate::error::{AppError, Endpoint, Result};
use crate::geo::RegionQuery;
use crate::heatmap::SightingFilter;
use crate::notify::Notifier;
use crate::record::{
    Checklist, ChecklistPayload, Contributor, Sighting, SpeciesEntry, TrendPoint,
};

/// Queue of replies for one endpoint. Gated replies resolve when the test sends them.
struct Script<T> {
    replies: Mutex<VecDeque<oneshot::Receiver<Result<T>>>>,
}

impl<T> Default for Script<T> {
    fn default() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
        }
    }
}

impl<T> Script<T> {
    fn push(&self, reply: Result<T>) {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(reply);
        self.replies.lock().unwrap().push_back(rx);
    }

    fn gate(&self) -> oneshot::Sender<Result<T>> {
        let (tx, rx) = oneshot::channel();
        self.replies.lock().unwrap().push_back(rx);
        tx
    }

    async fn next(&self, endpoint: Endpoint) -> Option<Result<T>> {
        let rx = self.replies.lock().unwrap().pop_front()?;
        Some(
            rx.await
                .unwrap_or_else(|_| Err(AppError::network(endpoint, "reply dropped"))),
        )
    }
}

#[derive(Default)]
pub(crate) struct FakeApi {
    logged_out: AtomicBool,
    login_checks: AtomicUsize,
    species: Script<Vec<SpeciesEntry>>,
    trends: Script<Vec<TrendPoint>>,
    contributors: Script<Vec<Contributor>>,
    sightings: Script<Vec<Sighting>>,
    checklist: Script<Checklist>,
    list_failures: Mutex<VecDeque<AppError>>,
    submits: Script<()>,
    deletes: Script<()>,
    server_checklists: Mutex<Vec<Checklist>>,
    species_calls: Mutex<Vec<RegionQuery>>,
    trends_calls: Mutex<Vec<(RegionQuery, String)>>,
    contributors_calls: Mutex<Vec<RegionQuery>>,
    sighting_filters: Mutex<Vec<SightingFilter>>,
    checklist_calls: Mutex<Vec<String>>,
    list_calls: AtomicUsize,
    submitted: Mutex<Vec<ChecklistPayload>>,
    deleted: Mutex<Vec<String>>,
}

impl FakeApi {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn log_out(&self) {
        self.logged_out.store(true, Ordering::SeqCst);
    }

    pub(crate) fn login_checks(&self) -> usize {
        self.login_checks.load(Ordering::SeqCst)
    }

    pub(crate) fn push_species(&self, reply: Result<Vec<SpeciesEntry>>) {
        self.species.push(reply);
    }

    pub(crate) fn gate_species(&self) -> oneshot::Sender<Result<Vec<SpeciesEntry>>> {
        self.species.gate()
    }

    pub(crate) fn push_trends(&self, reply: Result<Vec<TrendPoint>>) {
        self.trends.push(reply);
    }

    pub(crate) fn gate_trends(&self) -> oneshot::Sender<Result<Vec<TrendPoint>>> {
        self.trends.gate()
    }

    pub(crate) fn push_contributors(&self, reply: Result<Vec<Contributor>>) {
        self.contributors.push(reply);
    }

    pub(crate) fn gate_contributors(&self) -> oneshot::Sender<Result<Vec<Contributor>>> {
        self.contributors.gate()
    }

    pub(crate) fn push_sightings(&self, reply: Result<Vec<Sighting>>) {
        self.sightings.push(reply);
    }

    pub(crate) fn gate_sightings(&self) -> oneshot::Sender<Result<Vec<Sighting>>> {
        self.sightings.gate()
    }

    pub(crate) fn push_checklist(&self, reply: Result<Checklist>) {
        self.checklist.push(reply);
    }

    pub(crate) fn fail_next_list(&self, error: AppError) {
        self.list_failures.lock().unwrap().push_back(error);
    }

    pub(crate) fn push_submit(&self, reply: Result<()>) {
        self.submits.push(reply);
    }

    pub(crate) fn gate_submit(&self) -> oneshot::Sender<Result<()>> {
        self.submits.gate()
    }

    pub(crate) fn push_delete(&self, reply: Result<()>) {
        self.deletes.push(reply);
    }

    pub(crate) fn set_checklists(&self, checklists: Vec<Checklist>) {
        *self.server_checklists.lock().unwrap() = checklists;
    }

    pub(crate) fn species_calls(&self) -> Vec<RegionQuery> {
        self.species_calls.lock().unwrap().clone()
    }

    pub(crate) fn trends_calls(&self) -> Vec<(RegionQuery, String)> {
        self.trends_calls.lock().unwrap().clone()
    }

    pub(crate) fn contributors_calls(&self) -> Vec<RegionQuery> {
        self.contributors_calls.lock().unwrap().clone()
    }

    pub(crate) fn sighting_filters(&self) -> Vec<SightingFilter> {
        self.sighting_filters.lock().unwrap().clone()
    }

    pub(crate) fn checklist_calls(&self) -> Vec<String> {
        self.checklist_calls.lock().unwrap().clone()
    }

    pub(crate) fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn submitted(&self) -> Vec<ChecklistPayload> {
        self.submitted.lock().unwrap().clone()
    }

    pub(crate) fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

impl BirdApi for FakeApi {
    async fn check_login(&self) -> Result<bool> {
        self.login_checks.fetch_add(1, Ordering::SeqCst);
        Ok(!self.logged_out.load(Ordering::SeqCst))
    }

    async fn species(&self, region: &RegionQuery) -> Result<Vec<SpeciesEntry>> {
        self.species_calls.lock().unwrap().push(region.clone());
        self.species
            .next(Endpoint::Species)
            .await
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn trends(&self, region: &RegionQuery, species: &str) -> Result<Vec<TrendPoint>> {
        self.trends_calls
            .lock()
            .unwrap()
            .push((region.clone(), species.to_string()));
        self.trends
            .next(Endpoint::Trends)
            .await
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn contributors(&self, region: &RegionQuery) -> Result<Vec<Contributor>> {
        self.contributors_calls.lock().unwrap().push(region.clone());
        self.contributors
            .next(Endpoint::Contributors)
            .await
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn sightings(&self, filter: &SightingFilter) -> Result<Vec<Sighting>> {
        self.sighting_filters.lock().unwrap().push(filter.clone());
        self.sightings
            .next(Endpoint::Sightings)
            .await
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn checklist(&self, id: &str) -> Result<Checklist> {
        self.checklist_calls.lock().unwrap().push(id.to_string());
        match self.checklist.next(Endpoint::Checklists).await {
            Some(reply) => reply,
            None => self
                .server_checklists
                .lock()
                .unwrap()
                .iter()
                .find(|c| c.id.as_deref() == Some(id))
                .cloned()
                .ok_or_else(|| AppError::ChecklistNotFound(id.to_string())),
        }
    }

    async fn my_checklists(&self) -> Result<Vec<Checklist>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let failure = self.list_failures.lock().unwrap().pop_front();
        match failure {
            Some(e) => Err(e),
            None => Ok(self.server_checklists.lock().unwrap().clone()),
        }
    }

    async fn submit(&self, payload: &ChecklistPayload) -> Result<()> {
        self.submitted.lock().unwrap().push(payload.clone());
        self.submits.next(Endpoint::Submit).await.unwrap_or(Ok(()))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.deleted.lock().unwrap().push(id.to_string());
        self.deletes.next(Endpoint::Delete).await.unwrap_or(Ok(()))?;
        self.server_checklists
            .lock()
            .unwrap()
            .retain(|c| c.id.as_deref() != Some(id));
        Ok(())
    }
}

#[derive(Debug, Default)]
pub(crate) struct RecordingNotifier {
    notices: Mutex<Vec<String>>,
    alerts: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub(crate) fn notices(&self) -> Vec<String> {
        self.notices.lock().unwrap().clone()
    }

    pub(crate) fn alerts(&self) -> Vec<String> {
        self.alerts.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, error: &AppError) {
        self.notices.lock().unwrap().push(error.to_string());
    }

    fn alert(&self, error: &AppError) {
        self.alerts.lock().unwrap().push(error.to_string());
    }
}

/// Answers every confirmation prompt the same way and counts the prompts.
#[derive(Debug)]
pub(crate) struct FixedConfirm {
    answer: bool,
    asked: AtomicUsize,
}

impl FixedConfirm {
    pub(crate) fn new(answer: bool) -> Self {
        Self {
            answer,
            asked: AtomicUsize::new(0),
        }
    }

    pub(crate) fn asked(&self) -> usize {
        self.asked.load(Ordering::SeqCst)
    }
}

impl Confirm for FixedConfirm {
    fn confirm(&self, _prompt: &str) -> bool {
        self.asked.fetch_add(1, Ordering::SeqCst);
        self.answer
    }
}
