use anyhow::{anyhow, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use clipmind::{app::SearchMode, items::SourceKind};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// More log output (-v debug, -vv trace)
    #[clap(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Offer a piece of copied text for indexing
    IngestText {
        /// The text, read from stdin when omitted
        text: Option<String>,
    },
    /// Offer one or more screenshot files for indexing
    IngestScreenshot {
        #[clap(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Semantic search over everything captured
    Search {
        query: String,

        /// Which spaces and sources to search
        #[clap(short, long, value_enum, default_value_t = SearchMode::All)]
        mode: SearchMode,

        /// Number of results (config default when omitted)
        #[clap(short)]
        k: Option<usize>,

        /// Only items created after this unix timestamp
        #[clap(long, conflicts_with = "since")]
        after: Option<i64>,

        /// Only items from the last period, e.g. 30m, 12h, 3d, 2w
        #[clap(long)]
        since: Option<String>,
    },
    /// Re-encode every stored item into fresh vector spaces
    Rebuild {},
    /// Item and vector counts
    Stats {},
    /// Latest items first
    Recent {
        #[clap(short, long, default_value = "20")]
        limit: usize,

        #[clap(short, long, value_parser = parse_source)]
        source: Option<SourceKind>,
    },
    /// Delete an item (its vectors stay until the next rebuild)
    Delete { id: u64 },
    /// Print the asset path of a screenshot item
    Asset { id: u64 },
    /// Fill in content hashes missing from older items
    Backfill {},
}

fn parse_source(value: &str) -> Result<SourceKind, String> {
    value.parse::<SourceKind>().map_err(|e| e.to_string())
}

/// Turn a relative period like `3d` into an absolute unix timestamp.
pub fn parse_since(value: &str, now: chrono::DateTime<chrono::Utc>) -> anyhow::Result<i64> {
    let value = value.trim();
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| anyhow!("missing unit in '{value}', expected one of m, h, d, w"))?;
    let (amount, unit) = value.split_at(split);

    let amount: i64 = amount
        .parse()
        .map_err(|_| anyhow!("invalid amount in '{value}'"))?;

    let period = match unit {
        "m" => chrono::Duration::try_minutes(amount),
        "h" => chrono::Duration::try_hours(amount),
        "d" => chrono::Duration::try_days(amount),
        "w" => chrono::Duration::try_weeks(amount),
        _ => bail!("unknown unit '{unit}' in '{value}', expected one of m, h, d, w"),
    }
    .ok_or_else(|| anyhow!("period '{value}' is out of range"))?;

    Ok((now - period).timestamp())
}
