//! The "my checklists" page.

use std::sync::Arc;

use log::{error, info, warn};
use tokio::sync::watch;

use crate::client::BirdApi;
use crate::config::Config;
use crate::coordinator::{Outcome, Policy, RequestCoordinator};
use crate::error::{AppError, Result};
use crate::geo::{LatLng, checklist_query};
use crate::notify::Notifier;
use crate::record::Checklist;

pub const DELETE_PROMPT: &str = "Are you sure you want to delete this checklist?";

const LIST_KEY: &str = "checklists";

/// Asks the user to confirm a destructive action.
pub trait Confirm {
    fn confirm(&self, prompt: &str) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The user declined; nothing was sent.
    Cancelled,
    /// A delete of the same checklist is still in flight.
    AlreadyDeleting,
}

pub struct ChecklistCollection<A> {
    api: Arc<A>,
    config: Config,
    notifier: Arc<dyn Notifier>,
    coordinator: RequestCoordinator,
    checklists: watch::Sender<Vec<Checklist>>,
}

impl<A: BirdApi> ChecklistCollection<A> {
    pub fn new(api: Arc<A>, config: Config, notifier: Arc<dyn Notifier>) -> Self {
        let (checklists, _rx) = watch::channel(Vec::new());
        Self {
            api,
            config,
            notifier,
            coordinator: RequestCoordinator::new(),
            checklists,
        }
    }

    /// Cached list from the last successful load.
    pub fn checklists(&self) -> Vec<Checklist> {
        self.checklists.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<Checklist>> {
        self.checklists.subscribe()
    }

    /// Reloads the user's checklists. An empty list is a valid result.
    pub async fn list(&self) -> Result<Vec<Checklist>> {
        let api = &self.api;
        let outcome = self
            .coordinator
            .fetch(LIST_KEY, Policy::Supersede, || api.my_checklists())
            .await;

        match outcome {
            Outcome::Fresh(checklists) => {
                info!("Loaded {} checklists", checklists.len());
                self.checklists.send_replace(checklists.clone());
                Ok(checklists)
            }
            Outcome::Failed(e) => {
                error!("Error fetching checklists: {e}");
                self.notifier.notify(&e);
                Err(e)
            }
            Outcome::Stale | Outcome::Suppressed => Ok(self.checklists()),
        }
    }

    /// Deletes checklist `id` once the user confirms, then refreshes the list.
    pub async fn delete(&self, id: &str, confirm: &dyn Confirm) -> Result<DeleteOutcome> {
        if !confirm.confirm(DELETE_PROMPT) {
            info!("Delete of checklist {id} cancelled");
            return Ok(DeleteOutcome::Cancelled);
        }

        let api = &self.api;
        let outcome = self
            .coordinator
            .fetch(&format!("delete:{id}"), Policy::Suppress, || api.delete(id))
            .await;

        match outcome {
            Outcome::Fresh(()) => {
                info!("Deleted checklist {id}");
                if let Err(e) = self.list().await {
                    warn!("Refresh after delete failed, dropping {id} locally: {e}");
                    self.checklists
                        .send_modify(|list| list.retain(|c| c.id.as_deref() != Some(id)));
                }
                Ok(DeleteOutcome::Deleted)
            }
            Outcome::Failed(e) => {
                error!("Error deleting checklist: {e}");
                let e = AppError::DeletionFailed {
                    id: id.to_string(),
                    source: Box::new(e),
                };
                self.notifier.alert(&e);
                Err(e)
            }
            Outcome::Stale | Outcome::Suppressed => Ok(DeleteOutcome::AlreadyDeleting),
        }
    }

    /// Checklist page link that opens `checklist` for editing.
    pub fn edit_url(&self, checklist: &Checklist) -> Option<String> {
        let id = checklist.id.as_deref()?;
        let point = LatLng {
            lat: checklist.latitude,
            lng: checklist.longitude,
        };
        Some(format!(
            "{}{}&edit_id={id}",
            self.config.url(&self.config.paths.checklist_page),
            checklist_query(point)
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Endpoint;
    use crate::fake::{FakeApi, FixedConfirm, RecordingNotifier};
    use crate::record::SpeciesCount;

    fn checklist(id: &str) -> Checklist {
        Checklist {
            id: Some(id.to_string()),
            latitude: 36.97,
            longitude: -122.03,
            duration: Some(30),
            species: vec![SpeciesCount {
                name: "American Robin".to_string(),
                count: 1,
            }],
        }
    }

    fn ids(checklists: &[Checklist]) -> Vec<&str> {
        checklists.iter().filter_map(|c| c.id.as_deref()).collect()
    }

    fn collection(api: &Arc<FakeApi>, notifier: &Arc<RecordingNotifier>) -> ChecklistCollection<FakeApi> {
        ChecklistCollection::new(
            api.clone(),
            Config::default().with_base_url("http://localhost:8000/birdwatcher"),
            notifier.clone(),
        )
    }

    #[tokio::test]
    async fn test_empty_list_is_not_an_error() {
        let api = Arc::new(FakeApi::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let collection = collection(&api, &notifier);

        assert!(collection.list().await.unwrap().is_empty());
        assert!(notifier.notices().is_empty());
    }

    #[tokio::test]
    async fn test_failed_list_keeps_cache() {
        let api = Arc::new(FakeApi::new());
        let notifier = Arc::new(RecordingNotifier::default());
        api.set_checklists(vec![checklist("1")]);
        let collection = collection(&api, &notifier);
        collection.list().await.unwrap();

        api.fail_next_list(AppError::network(Endpoint::Checklists, "HTTP 503"));
        assert!(collection.list().await.is_err());

        assert_eq!(ids(&collection.checklists()), vec!["1"]);
        assert_eq!(notifier.notices().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_without_confirmation_sends_nothing() {
        let api = Arc::new(FakeApi::new());
        let notifier = Arc::new(RecordingNotifier::default());
        api.set_checklists(vec![checklist("1")]);
        let collection = collection(&api, &notifier);
        let confirm = FixedConfirm::new(false);

        let outcome = collection.delete("1", &confirm).await.unwrap();

        assert_eq!(outcome, DeleteOutcome::Cancelled);
        assert_eq!(confirm.asked(), 1);
        assert!(api.deleted().is_empty());
    }

    #[tokio::test]
    async fn test_confirmed_delete_removes_entry() {
        let api = Arc::new(FakeApi::new());
        let notifier = Arc::new(RecordingNotifier::default());
        api.set_checklists(vec![checklist("1"), checklist("2")]);
        let collection = collection(&api, &notifier);
        collection.list().await.unwrap();

        let outcome = collection
            .delete("1", &FixedConfirm::new(true))
            .await
            .unwrap();

        assert_eq!(outcome, DeleteOutcome::Deleted);
        assert_eq!(api.deleted(), vec!["1"]);
        assert_eq!(ids(&collection.checklists()), vec!["2"]);
        assert_eq!(ids(&collection.list().await.unwrap()), vec!["2"]);
    }

    #[tokio::test]
    async fn test_failed_delete_keeps_list() {
        let api = Arc::new(FakeApi::new());
        let notifier = Arc::new(RecordingNotifier::default());
        api.set_checklists(vec![checklist("1")]);
        api.push_delete(Err(AppError::network(Endpoint::Delete, "HTTP 403")));
        let collection = collection(&api, &notifier);
        collection.list().await.unwrap();
        let list_calls = api.list_calls();

        let err = collection
            .delete("1", &FixedConfirm::new(true))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::DeletionFailed { ref id, .. } if id == "1"));
        assert_eq!(ids(&collection.checklists()), vec!["1"]);
        assert_eq!(api.list_calls(), list_calls);
        assert_eq!(notifier.alerts().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_falls_back_to_local_removal() {
        let api = Arc::new(FakeApi::new());
        let notifier = Arc::new(RecordingNotifier::default());
        api.set_checklists(vec![checklist("1"), checklist("2")]);
        let collection = collection(&api, &notifier);
        collection.list().await.unwrap();

        api.fail_next_list(AppError::network(Endpoint::Checklists, "HTTP 503"));
        collection
            .delete("2", &FixedConfirm::new(true))
            .await
            .unwrap();

        assert_eq!(ids(&collection.checklists()), vec!["1"]);
    }

    #[test]
    fn test_edit_url() {
        let api = Arc::new(FakeApi::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let collection = collection(&api, &notifier);

        assert_eq!(
            collection.edit_url(&checklist("17")).as_deref(),
            Some("http://localhost:8000/birdwatcher/checklist?lat=36.97000&lng=-122.03000&edit_id=17")
        );
        let unsaved = Checklist {
            id: None,
            ..checklist("x")
        };
        assert_eq!(collection.edit_url(&unsaved), None);
    }
}
