use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::AppError;

/// Where user-facing error notices go.
pub trait Notifier: Send + Sync {
    /// Non-blocking notice, e.g. a failed background load.
    fn notify(&self, error: &AppError);

    /// Blocking notice: the triggering action did not happen.
    fn alert(&self, error: &AppError);
}

/// Prints notices to stderr for the command line front end.
#[derive(Debug, Default)]
pub struct ConsoleNotifier {
    reported: AtomicUsize,
}

impl ConsoleNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of notices printed so far.
    pub fn reported(&self) -> usize {
        self.reported.load(Ordering::Relaxed)
    }
}

impl Notifier for ConsoleNotifier {
    fn notify(&self, error: &AppError) {
        self.reported.fetch_add(1, Ordering::Relaxed);
        eprintln!("warning: {error}");
    }

    fn alert(&self, error: &AppError) {
        self.reported.fetch_add(1, Ordering::Relaxed);
        eprintln!("error: {error}");
    }
}
