use std::time::Instant;

use birdwatcher::heatmap::HeatLayer;
use birdwatcher::record::Checklist;
use birdwatcher::store::DerivedData;

pub fn print_hms(start: &Instant) {
    let secs = start.elapsed().as_secs();
    let millis = start.elapsed().subsec_millis();
    println!(
        "Elapsed: {:02}:{:02}:{:02}.{:03}",
        secs / 3600,
        (secs % 3600) / 60,
        secs % 60,
        millis
    );
}

pub fn print_statistics(data: &DerivedData) {
    if let Some(region) = &data.region {
        let params = region
            .params()
            .into_iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join("&");
        println!("Region: {params}");
    }

    if data.species_list.is_empty() {
        println!("No species recorded in this region");
    } else {
        let mut species = data.species_list.iter().collect::<Vec<_>>();
        species.sort_by(|a, b| b.total_count.cmp(&a.total_count));

        println!("\nSpecies ({}):", species.len());
        for entry in species {
            println!("  {} ({} sightings)", entry.common_name, entry.total_count);
        }
    }

    if !data.contributors.is_empty() {
        println!("\nTop contributors:");
        for contributor in &data.contributors {
            println!(
                "  Observer {} - {} checklists",
                contributor.observer_id, contributor.checklist_count
            );
        }
    }

    if let Some(chart) = data.chart() {
        println!("\n{}:", chart.title);
        for (label, value) in chart.labels.iter().zip(&chart.values) {
            println!("  {label}: {value}");
        }
    } else if let Some(species) = &data.selected_species {
        println!("\nNo trend data for {species}");
    }
}

pub fn print_heat_layer(layer: &HeatLayer) {
    println!("Sightings: {}", layer.sightings.len());
    match layer.max {
        Some(max) => println!("Heatmap max: {max}"),
        None => println!("Heatmap max: default"),
    }
    for sighting in layer.sightings.iter().take(5) {
        println!(
            "  ({:.5}, {:.5}) weight {}",
            sighting.lat, sighting.lng, sighting.weight
        );
    }
}

pub fn print_checklists(checklists: &[Checklist]) {
    if checklists.is_empty() {
        println!("No checklists yet");
        return;
    }

    for checklist in checklists {
        let total: u32 = checklist.species.iter().map(|s| s.count).sum();
        println!(
            "{}  ({:.5}, {:.5})  {} min  {} species, {} birds",
            checklist.id.as_deref().unwrap_or("-"),
            checklist.latitude,
            checklist.longitude,
            checklist
                .duration
                .map_or_else(|| "?".to_string(), |d| d.to_string()),
            checklist.species.len(),
            total
        );
    }
}
