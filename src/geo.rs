//! Region selection on the map.
//!
//! A selection is either a single clicked point or a bounding box. Bounds are
//! always stored normalised (`south <= north`, `west <= east`), so anything that
//! holds a [`Bounds`] can rely on that ordering.

use std::fmt;

use reqwest::Url;
use tokio::sync::watch;

use crate::error::{AppError, Result};

/// Equatorial circumference used by the map library to size click boxes.
const EARTH_CIRCUMFERENCE_M: f64 = 40_075_017.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Result<Self> {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
            return Err(AppError::InvalidCoordinate { lat, lng });
        }
        Ok(Self { lat, lng })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    north: f64,
    south: f64,
    east: f64,
    west: f64,
}

impl Bounds {
    /// Box spanned by two corners given in any order, e.g. two drag handles.
    pub fn from_corners(a: LatLng, b: LatLng) -> Self {
        Self {
            north: a.lat.max(b.lat),
            south: a.lat.min(b.lat),
            east: a.lng.max(b.lng),
            west: a.lng.min(b.lng),
        }
    }

    /// Square box reaching `meters` from `center` in each direction.
    pub fn around(center: LatLng, meters: f64) -> Self {
        let lat_accuracy = 180.0 * meters / EARTH_CIRCUMFERENCE_M;
        let lng_accuracy = lat_accuracy / center.lat.to_radians().cos();
        Self {
            north: (center.lat + lat_accuracy).min(90.0),
            south: (center.lat - lat_accuracy).max(-90.0),
            east: (center.lng + lng_accuracy).min(180.0),
            west: (center.lng - lng_accuracy).max(-180.0),
        }
    }

    /// Parses `west,south,east,north` as used by the location page's `bounds` parameter.
    pub fn from_bbox_str(raw: &str) -> Result<Self> {
        let coords = raw
            .split(',')
            .map(|part| part.trim().parse::<f64>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| AppError::InvalidBounds(raw.to_string()))?;

        let [west, south, east, north] = coords[..] else {
            return Err(AppError::InvalidBounds(raw.to_string()));
        };

        Ok(Self::from_corners(
            LatLng::new(south, west)?,
            LatLng::new(north, east)?,
        ))
    }

    pub fn to_bbox_string(&self) -> String {
        format!("{},{},{},{}", self.west, self.south, self.east, self.north)
    }

    pub fn north(&self) -> f64 {
        self.north
    }

    pub fn south(&self) -> f64 {
        self.south
    }

    pub fn east(&self) -> f64 {
        self.east
    }

    pub fn west(&self) -> f64 {
        self.west
    }

    pub fn center(&self) -> LatLng {
        LatLng {
            lat: (self.north + self.south) / 2.0,
            lng: (self.east + self.west) / 2.0,
        }
    }

    /// Checks every edge against the coordinate ranges.
    pub fn validate(&self) -> Result<()> {
        LatLng::new(self.south, self.west)?;
        LatLng::new(self.north, self.east)?;
        Ok(())
    }

    pub fn contains(&self, point: LatLng) -> bool {
        (self.south..=self.north).contains(&point.lat)
            && (self.west..=self.east).contains(&point.lng)
    }
}

/// Half-size in meters of the box created by a click at `zoom`; 20m at max zoom (18).
pub fn click_box_meters(zoom: f64) -> f64 {
    20.0 / 2f64.powf(zoom - 18.0)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Selection {
    Point(LatLng),
    Box(Bounds),
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selection::Point(p) => write!(f, "point ({:.5}, {:.5})", p.lat, p.lng),
            Selection::Box(b) => write!(f, "box [{}]", b.to_bbox_string()),
        }
    }
}

/// How a derived-data query names its region.
#[derive(Debug, Clone, PartialEq)]
pub enum RegionQuery {
    Point(LatLng),
    Bounds(Bounds),
    RegionId(String),
}

impl RegionQuery {
    pub fn params(&self) -> Vec<(&'static str, String)> {
        match self {
            RegionQuery::Point(p) => vec![
                ("latitude", p.lat.to_string()),
                ("longitude", p.lng.to_string()),
            ],
            RegionQuery::Bounds(b) => vec![("bounds", b.to_bbox_string())],
            RegionQuery::RegionId(id) => vec![("region_id", id.clone())],
        }
    }
}

impl From<Selection> for RegionQuery {
    fn from(selection: Selection) -> Self {
        match selection {
            Selection::Point(p) => RegionQuery::Point(p),
            Selection::Box(b) => RegionQuery::Bounds(b),
        }
    }
}

/// The current region selection, published to subscribers on every change.
#[derive(Debug)]
pub struct GeoSelection {
    tx: watch::Sender<Option<Selection>>,
}

impl Default for GeoSelection {
    fn default() -> Self {
        Self::new()
    }
}

impl GeoSelection {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    pub fn select_point(&self, lat: f64, lng: f64) -> Result<Selection> {
        let point = LatLng::new(lat, lng)?;
        Ok(self.replace(Selection::Point(point)))
    }

    pub fn select_box(&self, bounds: Bounds) -> Result<Selection> {
        bounds.validate()?;
        Ok(self.replace(Selection::Box(bounds)))
    }

    /// Selects the box a map click at `zoom` produces around the clicked point.
    pub fn select_click(&self, lat: f64, lng: f64, zoom: f64) -> Result<Selection> {
        let point = LatLng::new(lat, lng)?;
        self.select_box(Bounds::around(point, click_box_meters(zoom)))
    }

    pub fn current_selection(&self) -> Option<Selection> {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Selection>> {
        self.tx.subscribe()
    }

    fn replace(&self, selection: Selection) -> Selection {
        self.tx.send_replace(Some(selection));
        selection
    }
}

/// Query string linking to the statistics page for `bounds`.
pub fn statistics_query(bounds: &Bounds) -> String {
    format!(
        "?bounds={:.5},{:.5},{:.5},{:.5}",
        bounds.west, bounds.south, bounds.east, bounds.north
    )
}

/// Query string linking to the checklist page for a clicked point.
pub fn checklist_query(point: LatLng) -> String {
    format!("?lat={:.5}&lng={:.5}", point.lat, point.lng)
}

fn query_param(page_url: &str, name: &str) -> Option<String> {
    let url = Url::parse(page_url).ok()?;
    url.query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

/// `edit_id` of a checklist page URL, if it opens a checklist for editing.
pub fn edit_id_from_url(page_url: &str) -> Option<String> {
    query_param(page_url, "edit_id")
}

/// Region preselected by a location page URL's `bounds` parameter.
pub fn bounds_from_url(page_url: &str) -> Result<Option<Bounds>> {
    query_param(page_url, "bounds")
        .map(|raw| Bounds::from_bbox_str(&raw))
        .transpose()
}
