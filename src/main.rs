use std::io::Read;

use anyhow::Context;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use clipmind::app::{AppFactory, AppService, IndexMode};

mod cli;

fn init_tracing(verbose: u8) {
    let filter = match std::env::var("RUST_LOG") {
        Ok(env) => EnvFilter::new(env),
        Err(_) => match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        },
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = cli::Args::parse();
    init_tracing(args.verbose);

    let paths = AppFactory::get_paths()?;

    let index_mode = match args.command {
        cli::Command::Rebuild {} => IndexMode::Fresh,
        _ => IndexMode::Load,
    };
    tracing::debug!(base = %paths.base_path.display(), ?index_mode, "opening store");
    let app = AppFactory::create_app_service(&paths, index_mode)?;

    match args.command {
        cli::Command::IngestText { text } => {
            let text = match text {
                Some(text) => text,
                None => {
                    let mut buf = String::new();
                    std::io::stdin()
                        .read_to_string(&mut buf)
                        .context("failed to read text from stdin")?;
                    buf
                }
            };

            let outcome = app.ingest_text(&text)?;
            app.flush()?;
            print_json(&outcome)?;
        }

        cli::Command::IngestScreenshot { paths } => {
            let mut outcomes = Vec::with_capacity(paths.len());
            for path in paths {
                let outcome = app
                    .ingest_screenshot(&path)
                    .with_context(|| format!("failed to ingest {}", path.display()))?;
                outcomes.push(outcome);
            }
            app.flush()?;
            print_json(&outcomes)?;
        }

        cli::Command::Search {
            query,
            mode,
            k,
            after,
            since,
        } => {
            let after = match since {
                Some(since) => Some(cli::parse_since(&since, chrono::Utc::now())?),
                None => after,
            };

            print_json(&app.search(&query, k, mode, after)?)?;
        }

        cli::Command::Rebuild {} => rebuild(&app)?,

        cli::Command::Stats {} => print_json(&app.stats()?)?,

        cli::Command::Recent { limit, source } => print_json(&app.recent(source, limit)?)?,

        cli::Command::Delete { id } => {
            app.delete_item(id)?;
            println!("item {id} deleted");
        }

        cli::Command::Asset { id } => println!("{}", app.asset_path(id)?.display()),

        cli::Command::Backfill {} => {
            let updated = app.backfill_hashes()?;
            println!("{updated} items updated");
        }
    }

    Ok(())
}

fn rebuild(app: &AppService) -> anyhow::Result<()> {
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("{spinner} [{bar:40}] {pos}/{len} items ({eta})")?
            .progress_chars("█░"),
    );

    let report = app.rebuild_from_store(|done, total| {
        bar.set_length(total as u64);
        bar.set_position(done as u64);
    })?;

    bar.finish_and_clear();
    print_json(&report)
}
