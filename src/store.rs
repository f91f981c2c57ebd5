//! Region-derived data behind the statistics page.

use std::sync::Arc;

use log::{debug, error, info};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::client::BirdApi;
use crate::coordinator::{Outcome, Policy, RequestCoordinator};
use crate::error::AppError;
use crate::geo::{GeoSelection, RegionQuery, Selection, bounds_from_url};
use crate::notify::Notifier;
use crate::record::{Contributor, SpeciesEntry, TrendPoint};

const SPECIES_KEY: &str = "species";
const CONTRIBUTORS_KEY: &str = "contributors";
const REGION_LOGIN_KEY: &str = "login:region";
const TRENDS_LOGIN_KEY: &str = "login:trends";

fn trends_key(species: &str) -> String {
    format!("trends:{species}")
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DerivedData {
    pub region: Option<RegionQuery>,
    pub selected_species: Option<String>,
    pub species_list: Vec<SpeciesEntry>,
    pub trends_data: Vec<TrendPoint>,
    pub contributors: Vec<Contributor>,
}

impl DerivedData {
    pub fn chart(&self) -> Option<ChartSeries> {
        ChartSeries::from_trends(self.selected_species.as_deref()?, &self.trends_data)
    }
}

/// Line chart input for a species trend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartSeries {
    pub title: String,
    pub labels: Vec<String>,
    pub values: Vec<u64>,
}

impl ChartSeries {
    /// `None` when there is nothing to draw.
    pub fn from_trends(species: &str, points: &[TrendPoint]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        Some(Self {
            title: format!("Sightings for {species}"),
            labels: points.iter().map(|p| p.date.to_string()).collect(),
            values: points.iter().map(|p| p.total_count).collect(),
        })
    }
}

pub struct DerivedDataStore<A> {
    api: Arc<A>,
    notifier: Arc<dyn Notifier>,
    coordinator: RequestCoordinator,
    state: watch::Sender<DerivedData>,
}

impl<A: BirdApi> DerivedDataStore<A> {
    pub fn new(api: Arc<A>, notifier: Arc<dyn Notifier>) -> Self {
        let (state, _rx) = watch::channel(DerivedData::default());
        Self {
            api,
            notifier,
            coordinator: RequestCoordinator::new(),
            state,
        }
    }

    pub fn snapshot(&self) -> DerivedData {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DerivedData> {
        self.state.subscribe()
    }

    pub fn coordinator(&self) -> &RequestCoordinator {
        &self.coordinator
    }

    /// Makes `region` current and reloads everything derived from it.
    ///
    /// Species and contributors load concurrently; a failure of one leaves the
    /// other untouched. Trends are reloaded too when a species is selected.
    pub async fn select_region(&self, region: RegionQuery) {
        info!("Region selected: {region:?}");
        self.state
            .send_modify(|state| state.region = Some(region.clone()));
        let selected_species = self.state.borrow().selected_species.clone();

        if !self.ensure_logged_in(REGION_LOGIN_KEY).await {
            return;
        }

        let trends = async {
            if let Some(species) = &selected_species {
                self.load_trends(&region, species).await;
            }
        };
        futures::join!(
            self.load_species(&region),
            self.load_contributors(&region),
            trends
        );
    }

    /// Makes `species` current and loads its trend for the selected region.
    pub async fn select_species(&self, species: &str) {
        info!("Species selected: {species}");
        self.state
            .send_modify(|state| state.selected_species = Some(species.to_string()));
        let region = self.state.borrow().region.clone();

        let Some(region) = region else {
            debug!("No region selected yet, trends for {species} deferred");
            return;
        };
        if self.ensure_logged_in(TRENDS_LOGIN_KEY).await {
            self.load_trends(&region, species).await;
        }
    }

    pub async fn load_species(&self, region: &RegionQuery) -> bool {
        let api = &self.api;
        let outcome = self
            .coordinator
            .fetch(SPECIES_KEY, Policy::Supersede, || api.species(region))
            .await;
        self.apply(outcome, "species list", |state, species_list| {
            state.species_list = species_list;
        })
    }

    pub async fn load_contributors(&self, region: &RegionQuery) -> bool {
        let api = &self.api;
        let outcome = self
            .coordinator
            .fetch(CONTRIBUTORS_KEY, Policy::Supersede, || {
                api.contributors(region)
            })
            .await;
        self.apply(outcome, "contributors", |state, contributors| {
            state.contributors = contributors;
        })
    }

    pub async fn load_trends(&self, region: &RegionQuery, species: &str) -> bool {
        let api = &self.api;
        let outcome = self
            .coordinator
            .fetch(&trends_key(species), Policy::Supersede, || {
                api.trends(region, species)
            })
            .await;
        // Another species may have been picked while this one was loading.
        self.apply(outcome, "trends", |state, trends_data| {
            if state.selected_species.as_deref() == Some(species) {
                state.trends_data = trends_data;
            } else {
                debug!("Dropping trends for {species}, no longer selected");
            }
        })
    }

    async fn ensure_logged_in(&self, key: &str) -> bool {
        let api = &self.api;
        match self
            .coordinator
            .fetch(key, Policy::Supersede, || api.check_login())
            .await
        {
            Outcome::Fresh(true) => true,
            Outcome::Fresh(false) => {
                let e = AppError::Unauthenticated;
                error!("Blocked query: {e}");
                self.notifier.alert(&e);
                false
            }
            Outcome::Failed(e) => {
                error!("Error checking login: {e}");
                self.notifier.notify(&e);
                false
            }
            Outcome::Stale | Outcome::Suppressed => false,
        }
    }

    fn apply<T>(
        &self,
        outcome: Outcome<T>,
        what: &str,
        update: impl FnOnce(&mut DerivedData, T),
    ) -> bool {
        match outcome {
            Outcome::Fresh(value) => {
                self.state.send_modify(|state| update(state, value));
                true
            }
            Outcome::Failed(e) => {
                error!("Error loading {what}: {e}");
                self.notifier.notify(&e);
                false
            }
            Outcome::Stale | Outcome::Suppressed => false,
        }
    }
}

/// The statistics page: a region selection wired to a derived-data store.
///
/// Entering the page spawns a task that refreshes the store whenever the
/// selection changes, abandoning any refresh still running for an older
/// selection. Dropping the page stops that task.
pub struct StatisticsPage<A> {
    selection: GeoSelection,
    store: Arc<DerivedDataStore<A>>,
    follower: JoinHandle<()>,
}

impl<A: BirdApi + 'static> StatisticsPage<A> {
    /// Must be called from within a Tokio runtime.
    pub fn enter(api: Arc<A>, notifier: Arc<dyn Notifier>) -> Self {
        let selection = GeoSelection::new();
        let store = Arc::new(DerivedDataStore::new(api, notifier));
        let follower = tokio::spawn(follow_selection(store.clone(), selection.subscribe()));

        Self {
            selection,
            store,
            follower,
        }
    }

    /// Enters the page and preselects the region named by the URL's `bounds` parameter.
    pub fn enter_at(api: Arc<A>, notifier: Arc<dyn Notifier>, page_url: &str) -> Self {
        let page = Self::enter(api, notifier);
        let preselected = bounds_from_url(page_url).and_then(|bounds| match bounds {
            Some(bounds) => page.selection.select_box(bounds).map(Some),
            None => Ok(None),
        });
        if let Err(e) = preselected {
            error!("Failed to load bounds from query string: {e}");
            page.store.notifier.notify(&e);
        }
        page
    }

    pub fn selection(&self) -> &GeoSelection {
        &self.selection
    }

    pub fn store(&self) -> &DerivedDataStore<A> {
        &self.store
    }

    pub fn store_handle(&self) -> Arc<DerivedDataStore<A>> {
        self.store.clone()
    }

    pub async fn select_species(&self, species: &str) {
        self.store.select_species(species).await;
    }
}

impl<A> Drop for StatisticsPage<A> {
    fn drop(&mut self) {
        self.follower.abort();
    }
}

async fn follow_selection<A: BirdApi>(
    store: Arc<DerivedDataStore<A>>,
    mut selections: watch::Receiver<Option<Selection>>,
) {
    loop {
        let current = *selections.borrow_and_update();
        if let Some(selection) = current {
            let refresh = store.select_region(selection.into());
            tokio::pin!(refresh);
            tokio::select! {
                () = &mut refresh => {}
                changed = selections.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    debug!("Selection changed, abandoning refresh for {selection}");
                    continue;
                }
            }
        }
        if selections.changed().await.is_err() {
            return;
        }
    }
}
