//! Progress bar utilities using indicatif for terminal output

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;

use crate::domain::models::{ProgressDetail, ProgressEvent};

const PROGRESS_TEMPLATE: &str =
    "[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} iterations {msg} (ETA: {eta})";

const PROGRESS_CHARS: &str = "█▓▒░ ";

/// Progress bar over the iteration budget, drawn on stderr.
///
/// Hidden when `visible` is false, e.g. in JSON mode.
pub fn create_iteration_bar(total: u64, visible: bool) -> ProgressBar {
    let pb = ProgressBar::new(total);
    if !visible {
        pb.set_draw_target(ProgressDrawTarget::hidden());
        return pb;
    }
    let style = ProgressStyle::default_bar()
        .template(PROGRESS_TEMPLATE)
        .map(|s| s.progress_chars(PROGRESS_CHARS))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// One-line summary of a progress event for the bar message.
pub fn describe_event(event: &ProgressEvent) -> String {
    let best = event
        .best_score
        .map_or_else(|| "-".to_string(), |s| format!("{s:.3}"));
    let what = match &event.detail {
        ProgressDetail::Started => "seed archived".to_string(),
        ProgressDetail::Accepted {
            archived: true,
            evicted: Some(_),
            ..
        } => "accepted, evicted one".to_string(),
        ProgressDetail::Accepted { archived: true, .. } => "accepted".to_string(),
        ProgressDetail::Accepted { archived: false, .. } => "accepted, not archived".to_string(),
        ProgressDetail::Rejected { .. } => "rejected".to_string(),
        ProgressDetail::Aborted { reason } => format!("aborted: {reason}"),
        ProgressDetail::Finished { reason } => reason.clone(),
    };
    format!("best {best} | {what}")
}

/// Extension trait for ProgressBar to add common utility methods
pub trait ProgressBarExt {
    /// Finish with a success message
    fn finish_success(&self, message: impl Into<String>);

    /// Finish with an error message
    fn finish_error(&self, message: impl Into<String>);

    /// Finish with a warning message
    fn finish_warning(&self, message: impl Into<String>);

    /// Apply a progress event
    fn apply_event(&self, event: &ProgressEvent);
}

impl ProgressBarExt for ProgressBar {
    fn finish_success(&self, message: impl Into<String>) {
        self.finish_with_message(format!("✓ {}", message.into()));
    }

    fn finish_error(&self, message: impl Into<String>) {
        self.finish_with_message(format!("✗ {}", message.into()));
    }

    fn finish_warning(&self, message: impl Into<String>) {
        self.finish_with_message(format!("! {}", message.into()));
    }

    fn apply_event(&self, event: &ProgressEvent) {
        self.set_position(event.iteration.min(self.length().unwrap_or(u64::MAX)));
        self.set_message(describe_event(event));
    }
}
