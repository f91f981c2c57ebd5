pub mod checklist;
pub mod client;
pub mod collection;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod export;
pub mod geo;
pub mod heatmap;
pub mod notify;
pub mod record;
pub mod store;

#[cfg(test)]
mod fake;
