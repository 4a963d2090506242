//! Routes command - list the routes of the project

use crate::app::App;
use crate::cli::args::{OutputFormat, RoutesArgs};
use crate::config::Config;
use crate::error::TrellisResult;
use console::style;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct RouteRow {
    pattern: String,
    file: String,
    kind: &'static str,
}

/// Execute the routes command
pub async fn execute(args: RoutesArgs, config: &Config) -> TrellisResult<()> {
    let app = App::from_config(config, false).await?;

    let mut rows: Vec<RouteRow> = app
        .routes()
        .into_iter()
        .map(|route| RouteRow {
            kind: if route.is_dynamic() { "dynamic" } else { "static" },
            pattern: route.pattern,
            file: route.file,
        })
        .collect();
    if let Some(fallback) = app.fallback_route() {
        rows.push(RouteRow {
            pattern: "*".to_string(),
            file: fallback.file,
            kind: "fallback",
        });
    }

    match args.format {
        OutputFormat::Table => print_table(&rows),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
        OutputFormat::Plain => {
            for row in &rows {
                println!("{}", row.pattern);
            }
        }
    }

    Ok(())
}

fn print_table(rows: &[RouteRow]) {
    if rows.is_empty() {
        println!("No routes found.");
        return;
    }

    println!("{:<32} {:<10} {}", "ROUTE", "KIND", "FILE");
    println!("{}", "-".repeat(72));
    for row in rows {
        let kind = match row.kind {
            "static" => style(row.kind).green(),
            "dynamic" => style(row.kind).cyan(),
            _ => style(row.kind).dim(),
        };
        println!("{:<32} {:<10} {}", row.pattern, kind, row.file);
    }
    println!();
    println!("Total: {} route(s)", rows.len());
}
