//! CLI presentation
//!
//! Styled output on an interactive terminal, plain `[OK]`/`[WARN]` lines in
//! CI or when piped.
//!
//! ```rust,ignore
//! use trellis::ui::{self, BuildProgress, UiContext};
//!
//! let ctx = UiContext::detect();
//! let mut progress = BuildProgress::new(&ctx, 12);
//! progress.advance("pages/index.tmpl");
//! progress.finish();
//! ui::step_warn_hint(&ctx, "No 404 page", "Create pages/404.tmpl");
//! ```

mod context;
mod output;
mod progress;

pub use context::UiContext;
pub use output::{remark, step_error, step_info, step_ok_detail, step_warn, step_warn_hint};
pub use progress::BuildProgress;
