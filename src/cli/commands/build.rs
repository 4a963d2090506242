//! Build command - precompile every template

use crate::app::App;
use crate::cli::args::BuildArgs;
use crate::config::Config;
use crate::error::{TrellisError, TrellisResult};
use crate::ui::{self, BuildProgress, UiContext};

/// Execute the build command
pub async fn execute(args: BuildArgs, config: &Config) -> TrellisResult<()> {
    let ctx = UiContext::detect();

    if !config.cache.persistent {
        ui::step_warn_hint(
            &ctx,
            "Persistent cache is disabled, templates are only checked",
            "Set cache.persistent = true",
        );
    }

    let app = App::from_config(config, false).await?;
    let templates = app.templates("").await?;
    if templates.is_empty() {
        ui::step_warn_hint(
            &ctx,
            "No templates found",
            &format!("Looked under {}", config.project.root.display()),
        );
        return Ok(());
    }

    let mut progress = BuildProgress::new(&ctx, templates.len() as u64);
    let mut warnings = Vec::new();
    let mut failures = Vec::new();

    for name in &templates {
        match app.load(name).await {
            Ok(artifact) => {
                for diagnostic in &artifact.diagnostics {
                    warnings.push(format!("{}:{}: {}", name, diagnostic.line, diagnostic.message));
                }
            }
            Err(e) => failures.push(e),
        }
        progress.advance(name);
    }
    progress.finish();
    app.cache().flush().await;

    for warning in &warnings {
        ui::step_warn(&ctx, warning);
    }
    for failure in &failures {
        ui::step_error(&ctx, &failure.to_string());
    }

    let stats = app.cache().stats();
    ui::step_ok_detail(
        &ctx,
        &format!("{} templates compiled", stats.compiles),
        &format!("{} reused from cache", stats.persistent_hits),
    );

    if !failures.is_empty() {
        return Err(TrellisError::User(format!(
            "{} of {} templates failed to compile",
            failures.len(),
            templates.len()
        )));
    }
    if args.strict && !warnings.is_empty() {
        return Err(TrellisError::User(format!(
            "{} warnings with --strict",
            warnings.len()
        )));
    }

    Ok(())
}
