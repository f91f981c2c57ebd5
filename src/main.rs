mod parse;
mod util;

use std::error::Error;
use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use birdwatcher::checklist::{ChecklistDraft, ChecklistForm, SubmitOutcome};
use birdwatcher::client::HttpApi;
use birdwatcher::collection::{ChecklistCollection, Confirm, DeleteOutcome};
use birdwatcher::config::Config;
use birdwatcher::error::AppError;
use birdwatcher::export::save_to_csv;
use birdwatcher::geo::{Bounds, GeoSelection, RegionQuery};
use birdwatcher::heatmap::{HomeMap, SightingFilter};
use birdwatcher::notify::{ConsoleNotifier, Notifier};
use birdwatcher::store::DerivedDataStore;
use clap::Parser;
use env_logger::Env;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};

use crate::parse::{Args, Command, parse_count};
use crate::util::{print_checklists, print_heat_layer, print_hms, print_statistics};

/// Reads the delete confirmation from stdin unless `--yes` was given.
struct StdinConfirm {
    assume_yes: bool,
}

impl Confirm for StdinConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        if self.assume_yes {
            return true;
        }

        print!("{prompt} [y/N] ");
        if io::stdout().flush().is_err() {
            return false;
        }
        let mut answer = String::new();
        if io::stdin().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
    }
}

fn region_query(
    bounds: Option<String>,
    lat: Option<f64>,
    lng: Option<f64>,
    region_id: Option<String>,
) -> Result<RegionQuery, AppError> {
    let selection = GeoSelection::new();
    if let Some(raw) = bounds {
        return Ok(selection.select_box(Bounds::from_bbox_str(&raw)?)?.into());
    }
    match (lat, lng, region_id) {
        (Some(lat), Some(lng), _) => Ok(selection.select_point(lat, lng)?.into()),
        (_, _, Some(id)) => Ok(RegionQuery::RegionId(id)),
        _ => Err(AppError::MissingLocation),
    }
}

fn spinner(message: &str) -> Result<ProgressBar, Box<dyn Error>> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner} [{elapsed_precise}] {msg}")?);
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));
    Ok(spinner)
}

async fn run(
    command: Command,
    api: Arc<HttpApi>,
    config: Config,
    notifier: Arc<dyn Notifier>,
) -> Result<(), Box<dyn Error>> {
    match command {
        Command::Heatmap { search, species } => {
            let home = HomeMap::new(api, config, notifier);
            let filter = SightingFilter { search, species };
            debug!("Sightings filter: {:?}", filter.params());
            if home.load_sightings(&filter).await {
                print_heat_layer(&home.layer());
            }
        }
        Command::Stats {
            bounds,
            lat,
            lng,
            region_id,
            species,
        } => {
            let region = region_query(bounds, lat, lng, region_id)?;
            let store = DerivedDataStore::new(api, notifier);

            let progress = spinner("Loading statistics")?;
            if let Some(species) = &species {
                store.select_species(species).await;
            }
            store.select_region(region).await;
            progress.finish_and_clear();

            print_statistics(&store.snapshot());
        }
        Command::Submit {
            lat,
            lng,
            duration,
            counts,
            edit_id,
        } => {
            let counts = counts
                .iter()
                .map(|raw| parse_count(raw))
                .collect::<Result<Vec<_>, _>>()?;

            let draft = ChecklistDraft {
                edit_id,
                ..ChecklistDraft::default()
            };
            let form = ChecklistForm::new(api, config, notifier, Vec::new(), draft);
            if !form.load().await {
                return Ok(());
            }

            if let (Some(lat), Some(lng)) = (lat, lng) {
                form.set_location(lat, lng)?;
            }
            if duration.is_some() {
                form.set_duration(duration);
            }
            for (name, count) in &counts {
                form.increment_by(name, *count);
            }

            match form.submit().await {
                Ok(SubmitOutcome::Submitted { redirect }) => {
                    println!("Checklist saved. Your checklists: {redirect}");
                }
                Ok(SubmitOutcome::AlreadySubmitting) => println!("Submission already in progress"),
                Err(_) => {}
            }
        }
        Command::List { csv } => {
            let collection = ChecklistCollection::new(api, config, notifier);
            let Ok(checklists) = collection.list().await else {
                return Ok(());
            };

            print_checklists(&checklists);
            for checklist in &checklists {
                if let Some(url) = collection.edit_url(checklist) {
                    info!("Edit: {url}");
                }
            }
            if let Some(filename) = csv {
                save_to_csv(&checklists, &filename)?;
            }
        }
        Command::Delete { id, yes } => {
            let collection = ChecklistCollection::new(api, config, notifier);
            let confirm = StdinConfirm { assume_yes: yes };
            match collection.delete(&id, &confirm).await {
                Ok(DeleteOutcome::Deleted) => println!("Deleted checklist {id}"),
                Ok(DeleteOutcome::Cancelled) => println!("Cancelled"),
                Ok(DeleteOutcome::AlreadyDeleting) => println!("Delete already in progress"),
                Err(_) => {}
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn Error>> {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();

    let mut config = Config::load();
    if let Some(base_url) = &args.base_url {
        config = config.with_base_url(base_url);
    }
    if let Some(retries) = args.retries {
        config = config.with_max_retries(retries);
    }
    if let Some(delay) = args.delay {
        config = config.with_delay(delay);
    }

    let api = Arc::new(HttpApi::new(config.clone())?);
    let notifier = Arc::new(ConsoleNotifier::new());

    let start = Instant::now();
    run(args.command, api, config, notifier.clone()).await?;
    if args.verbose {
        print_hms(&start);
    }

    if notifier.reported() > 0 {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}
