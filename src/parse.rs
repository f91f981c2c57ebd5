use clap::{ArgGroup, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "birdwatcher")]
#[command(about = "A CLI client for the Bird-Watcher sighting tracker")]
#[command(version = "0.1")]
pub(crate) struct Args {
    /// Base URL of the Bird-Watcher server (overrides BIRDWATCHER_URL)
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Maximum number of retry attempts for reads
    #[arg(long, global = true)]
    pub retries: Option<u32>,

    /// Base delay between retries in milliseconds
    #[arg(long, global = true)]
    pub delay: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Load the home map heat layer
    Heatmap {
        /// Species search text
        #[arg(short, long, default_value = "")]
        search: String,

        /// Comma separated species picked from the list
        #[arg(short = 'l', long, value_delimiter = ',')]
        species: Vec<String>,
    },

    /// Species, trends and top contributors for a region
    #[command(group(ArgGroup::new("region").required(true).args(["bounds", "lat", "region_id"])))]
    Stats {
        /// Bounding box as west,south,east,north
        #[arg(long, allow_hyphen_values = true)]
        bounds: Option<String>,

        #[arg(long, requires = "lng", allow_hyphen_values = true)]
        lat: Option<f64>,

        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lng: Option<f64>,

        #[arg(long)]
        region_id: Option<String>,

        /// Species to load the trend for
        #[arg(short, long)]
        species: Option<String>,
    },

    /// Submit a new checklist, or update one with --edit-id
    Submit {
        #[arg(long, allow_hyphen_values = true)]
        lat: Option<f64>,

        #[arg(long, allow_hyphen_values = true)]
        lng: Option<f64>,

        /// Duration in minutes (defaults to 60)
        #[arg(long)]
        duration: Option<u32>,

        /// Species seen, as NAME or NAME=COUNT; repeat to add more
        #[arg(short, long = "count")]
        counts: Vec<String>,

        /// Checklist to edit
        #[arg(short, long)]
        edit_id: Option<String>,
    },

    /// List my checklists
    List {
        /// Also export them to this CSV file
        #[arg(long)]
        csv: Option<String>,
    },

    /// Delete one of my checklists
    Delete {
        id: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

/// Parses a `--count` value: `NAME` counts one, `NAME=N` counts N.
pub(crate) fn parse_count(raw: &str) -> Result<(String, u32), String> {
    let (name, count) = match raw.rsplit_once('=') {
        Some((name, count)) => {
            let count = count
                .trim()
                .parse::<u32>()
                .map_err(|e| format!("invalid count in '{raw}': {e}"))?;
            (name, count)
        }
        None => (raw, 1),
    };

    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing species name in '{raw}'"));
    }
    Ok((name.to_string(), count))
}
