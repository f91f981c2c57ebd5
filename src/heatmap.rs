//! Home map: sightings heat layer and its species filter.

use std::sync::Arc;

use log::{debug, error};
use tokio::sync::watch;

use crate::client::BirdApi;
use crate::config::Config;
use crate::coordinator::{Outcome, Policy, RequestCoordinator};
use crate::geo::{Bounds, LatLng, checklist_query, statistics_query};
use crate::notify::Notifier;
use crate::record::Sighting;

const SIGHTINGS_KEY: &str = "sightings";

/// Filter applied to the heat layer's sightings request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SightingFilter {
    /// Free text typed into the species search box.
    pub search: String,
    /// Species explicitly picked from the list.
    pub species: Vec<String>,
}

impl SightingFilter {
    pub fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if !self.search.is_empty() {
            params.push(("s", self.search.clone()));
        }
        // A picked list that no longer matches the search text is ignored.
        if self
            .species
            .iter()
            .any(|species| contains_ignore_case(species, &self.search))
        {
            params.push(("l", self.species.join(",")));
        }
        params
    }

    pub fn is_empty(&self) -> bool {
        self.search.is_empty() && self.species.is_empty()
    }
}

pub(crate) fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Sorts `sightings` by weight, heaviest first, and returns the display maximum
/// for the heat layer: the smaller of the median and the largest weight.
///
/// Returns `None` for no sightings, in which case the layer keeps its default.
pub fn heatmap_max(sightings: &mut [Sighting]) -> Option<f64> {
    sightings.sort_by(|a, b| b.weight.total_cmp(&a.weight));
    let max = sightings.first()?.weight;
    let median = sightings[sightings.len() / 2].weight;
    Some(median.min(max))
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeatLayer {
    pub sightings: Vec<Sighting>,
    /// Display maximum; `None` means the heat layer's own default.
    pub max: Option<f64>,
}

impl HeatLayer {
    /// Replaces the points. The max is only adjusted when there are points to scale by.
    pub fn apply(&mut self, mut sightings: Vec<Sighting>) {
        if let Some(max) = heatmap_max(&mut sightings) {
            self.max = Some(max);
        }
        self.sightings = sightings;
    }
}

/// State behind the home map page.
pub struct HomeMap<A> {
    api: Arc<A>,
    config: Config,
    notifier: Arc<dyn Notifier>,
    coordinator: RequestCoordinator,
    layer: watch::Sender<HeatLayer>,
}

impl<A: BirdApi> HomeMap<A> {
    pub fn new(api: Arc<A>, config: Config, notifier: Arc<dyn Notifier>) -> Self {
        let (layer, _rx) = watch::channel(HeatLayer::default());
        Self {
            api,
            config,
            notifier,
            coordinator: RequestCoordinator::new(),
            layer,
        }
    }

    /// Loads sightings for `filter`. A newer call abandons an older one still in flight.
    pub async fn load_sightings(&self, filter: &SightingFilter) -> bool {
        let api = &self.api;
        let outcome = self
            .coordinator
            .fetch(SIGHTINGS_KEY, Policy::Supersede, || api.sightings(filter))
            .await;

        match outcome {
            Outcome::Fresh(sightings) => {
                debug!("Loaded {} sightings", sightings.len());
                self.layer.send_modify(|layer| layer.apply(sightings));
                true
            }
            Outcome::Failed(e) => {
                error!("Error loading sightings: {e}");
                self.notifier.notify(&e);
                false
            }
            Outcome::Stale | Outcome::Suppressed => false,
        }
    }

    pub fn layer(&self) -> HeatLayer {
        self.layer.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<HeatLayer> {
        self.layer.subscribe()
    }

    /// Target of the popup's "Add Sighting" action.
    pub fn add_sighting_url(&self, point: LatLng) -> String {
        format!(
            "{}{}",
            self.config.url(&self.config.paths.checklist_page),
            checklist_query(point)
        )
    }

    /// Target of the "View Statistics" action for the box between two drag handles.
    pub fn statistics_url(&self, min_handle: LatLng, max_handle: LatLng) -> String {
        let bounds = Bounds::from_corners(min_handle, max_handle);
        format!(
            "{}{}",
            self.config.url(&self.config.paths.location_page),
            statistics_query(&bounds)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, Endpoint};
    use crate::fake::{FakeApi, RecordingNotifier};

    fn weighted(weights: &[f64]) -> Vec<Sighting> {
        weights
            .iter()
            .map(|&weight| Sighting {
                lat: 0.0,
                lng: 0.0,
                weight,
            })
            .collect()
    }

    #[test]
    fn test_heatmap_max_uses_median() {
        let mut sightings = weighted(&[3.0, 10.0, 1.0, 7.0, 7.0]);
        assert_eq!(heatmap_max(&mut sightings), Some(7.0));
        let sorted: Vec<f64> = sightings.iter().map(|s| s.weight).collect();
        assert_eq!(sorted, vec![10.0, 7.0, 7.0, 3.0, 1.0]);
    }

    #[test]
    fn test_heatmap_max_single_and_pair() {
        assert_eq!(heatmap_max(&mut weighted(&[4.0])), Some(4.0));
        // n = 2: index 1 of [9, 2]
        assert_eq!(heatmap_max(&mut weighted(&[2.0, 9.0])), Some(2.0));
    }

    #[test]
    fn test_empty_sightings_keep_layer_max() {
        assert_eq!(heatmap_max(&mut []), None);

        let mut layer = HeatLayer {
            sightings: weighted(&[5.0]),
            max: Some(5.0),
        };
        layer.apply(Vec::new());
        assert!(layer.sightings.is_empty());
        assert_eq!(layer.max, Some(5.0));
    }

    #[test]
    fn test_filter_params() {
        assert!(SightingFilter::default().params().is_empty());

        let filter = SightingFilter {
            search: "jay".to_string(),
            species: vec!["Steller's Jay".to_string(), "Blue Jay".to_string()],
        };
        assert_eq!(
            filter.params(),
            vec![
                ("s", "jay".to_string()),
                ("l", "Steller's Jay,Blue Jay".to_string())
            ]
        );

        let mismatched = SightingFilter {
            search: "robin".to_string(),
            species: vec!["Blue Jay".to_string()],
        };
        assert_eq!(mismatched.params(), vec![("s", "robin".to_string())]);
    }

    #[tokio::test]
    async fn test_load_sightings_updates_layer() {
        let api = Arc::new(FakeApi::new());
        api.push_sightings(Ok(weighted(&[1.0, 7.0, 10.0, 3.0, 7.0])));
        let notifier = Arc::new(RecordingNotifier::default());
        let map = HomeMap::new(api.clone(), Config::default(), notifier.clone());

        let filter = SightingFilter {
            search: "robin".to_string(),
            species: vec![],
        };
        assert!(map.load_sightings(&filter).await);

        let layer = map.layer();
        assert_eq!(layer.sightings.len(), 5);
        assert_eq!(layer.max, Some(7.0));
        assert_eq!(api.sighting_filters(), vec![filter]);
        assert!(notifier.notices().is_empty());
    }

    #[tokio::test]
    async fn test_superseded_sightings_are_dropped() {
        let api = Arc::new(FakeApi::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let map = HomeMap::new(api.clone(), Config::default(), notifier.clone());

        let reply_old = api.gate_sightings();
        let reply_new = api.gate_sightings();
        let old_filter = SightingFilter {
            search: "rob".to_string(),
            species: vec![],
        };
        let new_filter = SightingFilter {
            search: "jay".to_string(),
            species: vec![],
        };

        let responses = async {
            while api.sighting_filters().len() < 2 {
                tokio::task::yield_now().await;
            }
            reply_new.send(Ok(weighted(&[4.0]))).unwrap();
            tokio::task::yield_now().await;
            reply_old.send(Ok(weighted(&[9.0, 8.0]))).unwrap();
        };
        let (old_applied, new_applied, ()) = futures::join!(
            map.load_sightings(&old_filter),
            map.load_sightings(&new_filter),
            responses
        );

        assert!(!old_applied);
        assert!(new_applied);
        let layer = map.layer();
        assert_eq!(layer.sightings, weighted(&[4.0]));
        assert_eq!(layer.max, Some(4.0));
        assert!(notifier.notices().is_empty());
    }

    #[tokio::test]
    async fn test_failed_sightings_load_is_reported() {
        let api = Arc::new(FakeApi::new());
        api.push_sightings(Err(AppError::network(Endpoint::Sightings, "offline")));
        let notifier = Arc::new(RecordingNotifier::default());
        let map = HomeMap::new(api, Config::default(), notifier.clone());

        assert!(!map.load_sightings(&SightingFilter::default()).await);
        assert_eq!(map.layer(), HeatLayer::default());
        assert_eq!(notifier.notices(), vec!["Request to sightings endpoint failed: offline"]);
    }

    #[test]
    fn test_popup_links() {
        let map = HomeMap::new(
            Arc::new(FakeApi::new()),
            Config::default().with_base_url("http://localhost:8000/birdwatcher"),
            Arc::new(RecordingNotifier::default()),
        );
        assert_eq!(
            map.add_sighting_url(LatLng { lat: 1.0, lng: 2.0 }),
            "http://localhost:8000/birdwatcher/checklist?lat=1.00000&lng=2.00000"
        );
        assert_eq!(
            map.statistics_url(LatLng { lat: 2.0, lng: 4.0 }, LatLng { lat: 1.0, lng: 3.0 }),
            "http://localhost:8000/birdwatcher/location?bounds=3.00000,1.00000,4.00000,2.00000"
        );
    }
}
