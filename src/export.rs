use std::fs::File;
use std::io::Write;

use csv::Writer;
use log::info;
use serde::Serialize;

use crate::checklist::DEFAULT_DURATION_MINUTES;
use crate::error::Result;
use crate::record::Checklist;

#[derive(Debug, Serialize)]
struct ChecklistRow<'a> {
    checklist_id: &'a str,
    latitude: f64,
    longitude: f64,
    duration_minutes: u32,
    species: &'a str,
    count: u32,
}

impl<'a> ChecklistRow<'a> {
    fn new(checklist: &'a Checklist, species: &'a str, count: u32) -> Self {
        Self {
            checklist_id: checklist.id.as_deref().unwrap_or_default(),
            latitude: checklist.latitude,
            longitude: checklist.longitude,
            duration_minutes: checklist.duration.unwrap_or(DEFAULT_DURATION_MINUTES),
            species,
            count,
        }
    }
}

/// Writes one row per (checklist, species); a checklist without species still gets a row.
pub fn write_csv<W: Write>(checklists: &[Checklist], out: W) -> Result<usize> {
    let mut writer = Writer::from_writer(out);
    let mut rows = 0;

    for checklist in checklists {
        if checklist.species.is_empty() {
            writer.serialize(ChecklistRow::new(checklist, "", 0))?;
            rows += 1;
        }
        for sighting in &checklist.species {
            writer.serialize(ChecklistRow::new(checklist, &sighting.name, sighting.count))?;
            rows += 1;
        }
    }

    writer.flush()?;
    Ok(rows)
}

pub fn save_to_csv(checklists: &[Checklist], filename: &str) -> Result<()> {
    let file = File::create(filename)?;
    let rows = write_csv(checklists, file)?;
    info!("Saved {rows} rows to {filename}");
    Ok(())
}
