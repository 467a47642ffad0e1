//! Print the canonical join key of place names, one per line.
//!
//! Names come from the arguments, or from stdin (one per line) when none
//! are given. Handy for checking why a cave and a site failed to match.

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;

use meso_core::{canonical_name, logging, Stopwords};

#[derive(Parser, Debug)]
#[command(name = "canonical", about = "Show the canonical join key of place names")]
struct Args {
    /// Names to normalise; read from stdin when empty.
    names: Vec<String>,

    /// Extra stopwords on top of the built-in list (repeatable).
    #[arg(short, long = "stopword")]
    stopwords: Vec<String>,

    /// Emit JSON lines `{"name": .., "canonical": ..}` instead of TSV.
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct Row<'a> {
    name: &'a str,
    canonical: &'a str,
}

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init("canonical", false);
    let stopwords = Stopwords::with_extra(&args.stopwords).context("Bad stopword list")?;

    let names: Vec<String> = if args.names.is_empty() {
        io::stdin()
            .lock()
            .lines()
            .collect::<io::Result<Vec<_>>>()
            .context("Cannot read stdin")?
    } else {
        args.names
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for name in names.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
        let canonical = canonical_name(name, &stopwords);
        if args.json {
            serde_json::to_writer(&mut out, &Row { name, canonical: &canonical })?;
            writeln!(out)?;
        } else {
            writeln!(out, "{name}\t{canonical}")?;
        }
    }
    Ok(())
}
