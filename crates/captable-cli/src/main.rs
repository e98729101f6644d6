use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use captable_core::{CapTable, GenerateOptions, Preview};
use clap::{Parser, Subcommand, ValueEnum};
use log::info;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Debug, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(
    name = "captable",
    about = "Generate cap table workbooks in which every derived number is a live formula."
)]
struct Args {
    /// Log generation phases (same as RUST_LOG=debug).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write the `.xlsx` workbook for a cap table document.
    Generate {
        /// Cap table document (JSON).
        input: PathBuf,

        /// Workbook to write. Nothing is written if generation fails.
        #[arg(short, long)]
        output: PathBuf,

        /// Generation options (JSON): presentation order, table style,
        /// full-calc-on-load flag.
        #[arg(long)]
        options: Option<PathBuf>,
    },
    /// Validate a document and print the share counts the workbook will
    /// compute.
    Check {
        /// Cap table document (JSON).
        input: PathBuf,

        /// Output format.
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    match args.command {
        Command::Generate {
            input,
            output,
            options,
        } => {
            let doc = read_document(&input)?;
            let options = match options {
                Some(path) => read_json::<GenerateOptions>(&path, "options")?,
                None => GenerateOptions::default(),
            };
            captable_core::generate_to_path(&doc, &options, &output).with_context(|| {
                format!("generating workbook for {}", input.display())
            })?;
            info!("wrote {}", output.display());
            Ok(())
        }
        Command::Check { input, format } => {
            let doc = read_document(&input)?;
            let preview = Preview::compute(&doc)
                .with_context(|| format!("checking {}", input.display()))?;

            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            match format {
                OutputFormat::Text => write_text_report(&mut out, &doc, &preview)?,
                OutputFormat::Json => {
                    serde_json::to_writer_pretty(&mut out, &preview)?;
                    out.write_all(b"\n")?;
                }
            }
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read_document(path: &Path) -> Result<CapTable> {
    read_json(path, "cap table")
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {what} {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {what} {}", path.display()))
}

fn write_text_report(out: &mut impl Write, doc: &CapTable, preview: &Preview) -> Result<()> {
    writeln!(out, "{}: OK", doc.company.name)?;
    writeln!(out, "  founding shares: {}", shares(preview.founding_shares))?;
    writeln!(out)?;

    if preview.rounds.is_empty() {
        writeln!(out, "No financing rounds.")?;
    } else {
        writeln!(
            out,
            "{:<24} {:>16} {:>12} {:>16} {:>16}",
            "Round", "Pre-Round", "PPS", "Issued", "Post-Round"
        )?;
        for round in &preview.rounds {
            writeln!(
                out,
                "{:<24} {:>16} {:>12.4} {:>16} {:>16}",
                round.name,
                shares(round.pre_round_shares),
                round.price_per_share,
                shares(round.shares_issued),
                shares(round.pre_round_shares + round.shares_issued),
            )?;
        }
    }
    writeln!(out)?;

    writeln!(out, "{:<24} {:>16} {:>10}", "Holder", "Shares", "Own %")?;
    for holding in &preview.holdings {
        writeln!(
            out,
            "{:<24} {:>16} {:>9.2}%",
            holding.holder,
            shares(holding.shares),
            holding.ownership * 100.0
        )?;
    }
    writeln!(out, "{:<24} {:>16}", "Total", shares(preview.total_shares))?;
    Ok(())
}

/// Whole shares with thousands separators.
fn shares(value: f64) -> String {
    let rounded = format!("{:.0}", value.abs());
    let mut grouped = String::with_capacity(rounded.len() + rounded.len() / 3);
    for (idx, ch) in rounded.chars().enumerate() {
        if idx > 0 && (rounded.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if value < 0.0 {
        format!("-{grouped}")
    } else {
        grouped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shares_are_grouped_by_thousands() {
        assert_eq!(shares(0.0), "0");
        assert_eq!(shares(999.0), "999");
        assert_eq!(shares(1_000.0), "1,000");
        assert_eq!(shares(12_500_000.4), "12,500,000");
        assert_eq!(shares(-2_500.0), "-2,500");
    }

    #[test]
    fn clap_definition_is_consistent() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }
}
