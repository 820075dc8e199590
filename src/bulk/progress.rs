//! Completion counter for a bulk run, optionally drawn as a terminal bar.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

const BAR_TEMPLATE: &str = "{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})";

#[derive(Debug)]
pub struct Progress {
    completed: AtomicUsize,
    total: usize,
    bar: Option<ProgressBar>,
}

impl Progress {
    /// Counter only, nothing drawn.
    pub fn hidden(total: usize) -> Self {
        Self {
            completed: AtomicUsize::new(0),
            total,
            bar: None,
        }
    }

    /// Counter plus a bar on stderr labelled `label`.
    pub fn with_bar(total: usize, label: impl Into<String>) -> Self {
        let style = ProgressStyle::with_template(BAR_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        let bar = ProgressBar::with_draw_target(Some(total as u64), ProgressDrawTarget::stderr())
            .with_style(style)
            .with_message(label.into());
        Self {
            completed: AtomicUsize::new(0),
            total,
            bar: Some(bar),
        }
    }

    /// Record one finished unit; returns the new count.
    pub fn tick(&self) -> usize {
        let done = self.completed.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(bar) = &self.bar {
            bar.inc(1);
        }
        done
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Guard that ticks once when dropped, whichever way the unit ends.
    pub fn guard(self: &Arc<Self>) -> ProgressTick {
        ProgressTick(Arc::clone(self))
    }

    pub fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish();
        }
    }

    pub fn abandon(&self) {
        if let Some(bar) = &self.bar {
            bar.abandon();
        }
    }
}

#[must_use = "the tick happens when the guard is dropped"]
pub struct ProgressTick(Arc<Progress>);

impl Drop for ProgressTick {
    fn drop(&mut self) {
        self.0.tick();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guards_tick_on_drop() {
        let progress = Arc::new(Progress::hidden(3));
        {
            let _a = progress.guard();
            let _b = progress.guard();
            assert_eq!(progress.completed(), 0);
        }
        assert_eq!(progress.completed(), 2);
        assert_eq!(progress.tick(), 3);
        assert_eq!(progress.total(), 3);
    }

    #[test]
    fn bar_tracks_counter() {
        let progress = Progress::with_bar(2, "test");
        progress.tick();
        progress.tick();
        progress.finish();
        assert_eq!(progress.completed(), 2);
    }
}
