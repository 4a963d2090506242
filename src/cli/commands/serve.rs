//! Serve command - run the HTTP server

use crate::app::App;
use crate::cli::args::ServeArgs;
use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::error::TrellisResult;
use crate::transport::Server;
use crate::ui::{self, UiContext};
use tracing::warn;

/// Execute the serve command
pub async fn execute(args: ServeArgs, config: &Config) -> TrellisResult<()> {
    let ctx = UiContext::detect();
    let host = args.host.unwrap_or_else(|| config.server.host.clone());
    let port = args.port.unwrap_or(config.server.port);

    let app = App::from_config(config, args.dev).await?;
    if app.routes().is_empty() && app.fallback_route().is_none() {
        ui::step_warn_hint(
            &ctx,
            &format!("No pages found under {}", app.pages_dir()),
            &format!("Create {}/index.tmpl", app.pages_dir()),
        );
    }

    let dispatcher = Dispatcher::new(app, config.server.max_reroute_depth)?;
    let server = Server::bind(&format!("{}:{}", host, port), dispatcher).await?;

    ui::step_ok_detail(&ctx, "Serving", &format!("http://{}", server.local_addr()?));
    if args.dev {
        ui::remark(&ctx, "Development mode: edited templates recompile on the next request");
    }

    server.serve(shutdown_signal()).await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
