use std::sync::Mutex;

use indicatif::{ProgressBar, ProgressStyle};

/// One indicatif bar per pipeline stage, replaced whenever the stage changes.
pub struct CliProgress {
    enabled: bool,
    bar: Mutex<Option<(String, ProgressBar)>>,
}

impl CliProgress {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            bar: Mutex::new(None),
        }
    }

    pub fn update(&self, stage: &str, current: u64, total: u64, message: &str) {
        if !self.enabled {
            return;
        }
        let Ok(mut guard) = self.bar.lock() else {
            return;
        };

        let same_stage = guard.as_ref().is_some_and(|(s, _)| s == stage);
        if !same_stage {
            if let Some((_, old)) = guard.take() {
                old.finish_and_clear();
            }
            *guard = Some((stage.to_string(), new_bar(total)));
        }

        if let Some((_, pb)) = guard.as_ref() {
            if total > 0 {
                pb.set_length(total);
                pb.set_position(current + 1);
            } else {
                pb.set_position(current);
            }
            pb.set_message(message.to_string());
        }
    }

    pub fn finish(&self) {
        if let Ok(mut guard) = self.bar.lock() {
            if let Some((_, pb)) = guard.take() {
                pb.finish_and_clear();
            }
        }
    }
}

fn new_bar(total: u64) -> ProgressBar {
    if total == 0 {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner} {pos} found, {msg}") {
            pb.set_style(style);
        }
        return pb;
    }
    let pb = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::with_template("[{bar:40}] {pos}/{len} {msg}") {
        pb.set_style(style);
    }
    pb
}
