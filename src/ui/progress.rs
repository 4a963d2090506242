//! Build progress bar with a plain fallback

use super::context::UiContext;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

const TICK_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ";

/// Progress over a known number of templates
pub struct BuildProgress {
    bar: Option<ProgressBar>,
    total: u64,
    done: u64,
}

impl BuildProgress {
    pub fn new(ctx: &UiContext, total: u64) -> Self {
        let bar = ctx.is_interactive().then(|| {
            let bar = ProgressBar::new(total);
            if let Ok(bar_style) = ProgressStyle::default_bar()
                .template("  {spinner:.cyan} Compiling {bar:20.cyan/dim} {pos}/{len} {msg:.dim}")
            {
                bar.set_style(bar_style.tick_chars(TICK_CHARS).progress_chars("━╸─"));
            }
            bar.enable_steady_tick(Duration::from_millis(120));
            bar
        });
        Self {
            bar,
            total,
            done: 0,
        }
    }

    /// Record one finished template
    pub fn advance(&mut self, name: &str) {
        self.done += 1;
        match self.bar {
            Some(ref bar) => {
                bar.set_message(name.to_string());
                bar.inc(1);
            }
            None => println!("  [{}/{}] {}", self.done, self.total, name),
        }
    }

    pub fn finish(self) {
        if let Some(bar) = self.bar {
            bar.finish_and_clear();
        }
    }
}
