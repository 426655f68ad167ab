//! Progress reporting utilities

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Segment progress for a running diff.
///
/// Starts as a spinner and turns into a bar once the first progress update
/// arrives; the segment total keeps growing while differing segments are
/// bisected. Draws to stderr, never to stdout.
#[derive(Debug)]
pub struct DiffProgress {
    bar: ProgressBar,
}

impl DiffProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_spinner()
                .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
                .template("{spinner:.green} {msg}")
                .expect("Invalid progress template"),
        );
        bar.set_message("Comparing segments...");
        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Update completed/known segment counts
    pub fn update(&self, done: u64, total: u64) {
        if self.bar.length().is_none() || self.bar.length() == Some(0) {
            self.bar.disable_steady_tick();
            self.bar.set_style(
                ProgressStyle::default_bar()
                    .template(
                        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>5}/{len:5} segments",
                    )
                    .expect("Invalid progress template")
                    .progress_chars("#>-"),
            );
        }
        self.bar.set_length(total);
        self.bar.set_position(done);
    }

    /// Finish with a closing message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}

impl Default for DiffProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DiffProgress {
    fn drop(&mut self) {
        // Clean up silently if the run ended early
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}
