use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

/// Species seen in a region, with the summed count of individuals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "SpeciesRow")]
pub struct SpeciesEntry {
    pub common_name: String,
    pub total_count: u64,
}

/// One day of sightings for a species.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TrendRow")]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub total_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ContributorRow")]
pub struct Contributor {
    pub observer_id: String,
    pub checklist_count: u64,
}

/// A weighted sighting point for the heat layer, sent as `[lat, lng, weight]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(f64, f64, f64)", into = "(f64, f64, f64)")]
pub struct Sighting {
    pub lat: f64,
    pub lng: f64,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeciesCount {
    pub name: String,
    pub count: u32,
}

/// A checklist as stored by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checklist {
    #[serde(default, alias = "event_id", deserialize_with = "de_opt_id")]
    pub id: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, alias = "duration_minutes")]
    pub duration: Option<u32>,
    #[serde(default)]
    pub species: Vec<SpeciesCount>,
}

/// Body of a create or update request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChecklistPayload {
    pub lat: f64,
    pub lng: f64,
    pub duration: u32,
    pub species: Vec<SpeciesCount>,
    #[serde(rename = "editId")]
    pub edit_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DataEnvelope<T> {
    data: Option<Vec<T>>,
}

impl<T> DataEnvelope<T> {
    pub(crate) fn into_rows(self) -> Vec<T> {
        self.data.unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SightingsEnvelope {
    #[serde(default)]
    pub sightings: Vec<Sighting>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChecklistsEnvelope {
    #[serde(default)]
    pub checklists: Vec<Checklist>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LoginStatus {
    #[serde(default)]
    pub logged_in: bool,
}

// Rows come either as objects or as raw positional SQL rows.

#[derive(Deserialize)]
#[serde(untagged)]
enum SpeciesRow {
    Object {
        common_name: String,
        #[serde(default)]
        total_count: Option<u64>,
    },
    Row(String, Option<u64>),
}

impl From<SpeciesRow> for SpeciesEntry {
    fn from(row: SpeciesRow) -> Self {
        let (common_name, total_count) = match row {
            SpeciesRow::Object {
                common_name,
                total_count,
            } => (common_name, total_count),
            SpeciesRow::Row(name, count) => (name, count),
        };
        Self {
            common_name,
            total_count: total_count.unwrap_or(0),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TrendRow {
    Object {
        date: String,
        #[serde(default)]
        total_count: Option<u64>,
    },
    Row(String, Option<u64>),
}

impl TryFrom<TrendRow> for TrendPoint {
    type Error = String;

    fn try_from(row: TrendRow) -> Result<Self, Self::Error> {
        let (date, total_count) = match row {
            TrendRow::Object { date, total_count } => (date, total_count),
            TrendRow::Row(date, count) => (date, count),
        };
        Ok(Self {
            date: parse_day(&date)?,
            total_count: total_count.unwrap_or(0),
        })
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ContributorRow {
    Object {
        observer_id: IdValue,
        #[serde(default)]
        checklist_count: Option<u64>,
    },
    Row(IdValue, Option<u64>),
}

impl From<ContributorRow> for Contributor {
    fn from(row: ContributorRow) -> Self {
        let (observer_id, checklist_count) = match row {
            ContributorRow::Object {
                observer_id,
                checklist_count,
            } => (observer_id, checklist_count),
            ContributorRow::Row(id, count) => (id, count),
        };
        Self {
            observer_id: observer_id.into(),
            checklist_count: checklist_count.unwrap_or(0),
        }
    }
}

impl From<(f64, f64, f64)> for Sighting {
    fn from((lat, lng, weight): (f64, f64, f64)) -> Self {
        Self { lat, lng, weight }
    }
}

impl From<Sighting> for (f64, f64, f64) {
    fn from(s: Sighting) -> Self {
        (s.lat, s.lng, s.weight)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IdValue {
    Number(i64),
    Text(String),
}

impl From<IdValue> for String {
    fn from(id: IdValue) -> Self {
        match id {
            IdValue::Number(n) => n.to_string(),
            IdValue::Text(s) => s,
        }
    }
}

fn de_opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<IdValue>::deserialize(deserializer)?.map(String::from))
}

/// Accepts `YYYY-MM-DD` optionally followed by a time part.
fn parse_day(raw: &str) -> Result<NaiveDate, String> {
    let day = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").map_err(|e| format!("invalid date '{raw}': {e}"))
}
