//! aton: the ATON CLI
//!
//! # Usage
//!
//! ```bash
//! # Encode a JSON document
//! aton encode data.json --mode ultra --stats
//!
//! # Decode back to JSON
//! aton decode data.aton
//!
//! # Query a JSON or ATON document
//! aton query data.json "products WHERE price > 100 ORDER BY price DESC"
//!
//! # Stream one table in chunks
//! aton stream data.json --table products --chunk-size 500
//! ```

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use aton::prelude::*;
use aton::query::{QueryExpression, QueryNode};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "aton")]
#[command(version)]
#[command(about = "Adaptive Token-Oriented Notation encoder, decoder and query tool", long_about = None)]
#[command(after_help = "EXAMPLES:
    aton encode data.json --mode ultra
    aton decode data.aton
    aton query data.json \"products WHERE price BETWEEN 50 AND 300\"")]
struct Cli {
    /// Config file (defaults to $ATON_CONFIG or <config dir>/aton/config.toml)
    #[arg(long, global = true, env = "ATON_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    Fast,
    Balanced,
    Ultra,
    Adaptive,
}

impl From<Mode> for CompressionMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Fast => CompressionMode::Fast,
            Mode::Balanced => CompressionMode::Balanced,
            Mode::Ultra => CompressionMode::Ultra,
            Mode::Adaptive => CompressionMode::Adaptive,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Encode a JSON document as ATON
    Encode {
        /// Input file, or stdin when omitted
        input: Option<PathBuf>,

        /// Compression mode
        #[arg(short, long, value_enum)]
        mode: Option<Mode>,

        /// Do not infer defaults
        #[arg(long)]
        no_optimize: bool,

        /// Mark tables as queryable
        #[arg(long)]
        queryable: bool,

        /// Attach a query line to the output
        #[arg(short, long)]
        query: Option<String>,

        /// Print size statistics to stderr (not with --query)
        #[arg(long)]
        stats: bool,
    },
    /// Decode ATON back to JSON
    Decode {
        input: Option<PathBuf>,
    },
    /// Run a query against a JSON or ATON document
    Query {
        input: PathBuf,
        query: String,
    },
    /// Encode one table in chunks
    Stream {
        input: Option<PathBuf>,

        #[arg(short, long)]
        table: Option<String>,

        #[arg(short, long)]
        chunk_size: Option<usize>,
    },
    /// Parse and explain a query
    Explain {
        query: String,
    },
    /// List compression modes
    Modes,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "aton=debug" } else { "aton=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<EncoderConfig> {
    let config = match path {
        Some(path) => EncoderConfig::load(path)?,
        None => EncoderConfig::discover()?,
    };
    config.check()?;
    Ok(config)
}

fn read_input(input: Option<&Path>) -> Result<String> {
    match input {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}

fn read_document(input: Option<&Path>) -> Result<Document> {
    let content = read_input(input)?;
    let value: Value = serde_json::from_str(&content).context("Input is not valid JSON")?;
    match value {
        Value::Object(map) => Ok(map),
        _ => anyhow::bail!("Data must be a dictionary of tables"),
    }
}

/// JSON when it parses as a JSON object, ATON otherwise.
fn read_any(input: &Path) -> Result<Document> {
    let content = read_input(Some(input))?;
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&content) {
        return Ok(map);
    }
    Ok(aton::decode(&content)?)
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Encode {
            input,
            mode,
            no_optimize,
            queryable,
            query,
            stats,
        } => {
            let mut config = config;
            if let Some(mode) = mode {
                config.compression = mode.into();
            }
            config.optimize &= !no_optimize;
            config.queryable |= queryable;

            let document = read_document(input.as_deref())?;
            let encoder = Encoder::new(config);
            match (query, stats) {
                (Some(q), _) => println!("{}", encoder.encode_with_query(&document, &q)?),
                (None, true) => {
                    let (text, report) = encoder.encode_with_stats(&document)?;
                    println!("{}", text);
                    print_stats(&report);
                }
                (None, false) => println!("{}", encoder.encode(&document)?),
            }
        }
        Commands::Decode { input } => {
            let text = read_input(input.as_deref())?;
            let document = aton::decode(&text)?;
            println!("{}", serde_json::to_string_pretty(&document)?);
        }
        Commands::Query { input, query } => {
            let document = read_any(&input)?;
            let rows = QueryEngine::new().run(&document, &query)?;
            print_rows(&rows);
        }
        Commands::Stream {
            input,
            table,
            chunk_size,
        } => {
            let document = read_document(input.as_deref())?;
            let encoder = StreamEncoder::new(chunk_size.unwrap_or(config.chunk_size))?
                .optimize(config.optimize);
            for chunk in encoder.stream_encode(&document, table.as_deref())? {
                eprintln!(
                    "{} chunk {}/{} ({} records, {:.0}%)",
                    "▸".cyan(),
                    chunk.chunk_id + 1,
                    chunk.total_chunks,
                    chunk.metadata.records_in_chunk,
                    chunk.metadata.progress * 100.0
                );
                println!("{}", chunk.data);
            }
        }
        Commands::Explain { query } => explain_query(&query)?,
        Commands::Modes => {
            for mode in CompressionMode::ALL {
                println!("{:10} {}", mode.as_str().cyan().bold(), mode.description().dimmed());
            }
        }
    }
    Ok(())
}

fn print_stats(stats: &CompressionStats) {
    eprintln!("{}", "Compression Stats:".green().bold());
    eprintln!("  {} {}", "Mode:".dimmed(), stats.mode.to_string().cyan());
    eprintln!("  {} {} bytes", "Original:".dimmed(), stats.original_size);
    eprintln!("  {} {} bytes", "Encoded:".dimmed(), stats.compressed_size);
    eprintln!(
        "  {} {:.1}%",
        "Saved:".dimmed(),
        (1.0 - stats.compression_ratio) * 100.0
    );
    eprintln!("  {} {} entries", "Dictionary:".dimmed(), stats.dictionary_size);
    eprintln!("  {} {:.2} ms", "Time:".dimmed(), stats.encoding_time_ms);
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn print_rows(rows: &[Record]) {
    if rows.is_empty() {
        println!("{}", "(no results)".dimmed());
        return;
    }

    let columns: Vec<&String> = rows[0].keys().collect();
    let widths: Vec<usize> = columns
        .iter()
        .map(|col| {
            rows.iter()
                .map(|row| row.get(*col).map(cell).unwrap_or_default().chars().count())
                .max()
                .unwrap_or(0)
                .max(col.chars().count())
        })
        .collect();

    let header: Vec<String> = columns
        .iter()
        .zip(&widths)
        .map(|(col, width)| format!("{:width$}", col, width = *width))
        .collect();
    println!("{}", header.join(" │ ").white().bold());

    let sep: Vec<String> = widths.iter().map(|w| "─".repeat(*w)).collect();
    println!("{}", sep.join("─┼─").dimmed());

    for row in rows {
        let cells: Vec<String> = columns
            .iter()
            .zip(&widths)
            .map(|(col, width)| {
                let val = row.get(*col).map(cell).unwrap_or_default();
                format!("{:width$}", val, width = *width)
            })
            .collect();
        println!("{}", cells.join(" │ "));
    }

    println!();
    println!("{} row(s) returned", rows.len().to_string().cyan());
}

fn explain_query(query: &str) -> Result<()> {
    println!("{}", "ATON Query Explanation".cyan().bold());
    println!();
    println!("{} {}", "Query:".dimmed(), query.yellow());
    println!();

    let parsed = aton::parse(query)?;
    println!("{}", "Parsed Structure:".green().bold());
    println!("  {} {}", "Table:".dimmed(), parsed.table.white());
    match &parsed.select_fields {
        Some(fields) => println!("  {} {}", "Select:".dimmed(), fields.join(", ").white()),
        None => println!("  {} {}", "Select:".dimmed(), "*".white()),
    }
    if let Some(expr) = &parsed.where_expression {
        println!("  {}", "Where:".dimmed());
        print_expression(expr, 2);
    }
    if let Some(field) = &parsed.order_by {
        println!(
            "  {} {} {}",
            "Order:".dimmed(),
            field.white(),
            parsed.order_direction.to_string().cyan()
        );
    }
    if let Some(limit) = parsed.limit {
        println!("  {} {}", "Limit:".dimmed(), limit);
    }
    if parsed.offset > 0 {
        println!("  {} {}", "Offset:".dimmed(), parsed.offset);
    }

    println!();
    println!("{}", "Normalized:".green().bold());
    println!("  {}", parsed.to_string().white());
    Ok(())
}

fn print_expression(expr: &QueryExpression, depth: usize) {
    let indent = "  ".repeat(depth);
    println!("{}{}", indent, expr.operator.as_str().cyan());
    for node in &expr.conditions {
        match node {
            QueryNode::Condition(cond) => println!("{}  {}", indent, cond.to_string().yellow()),
            QueryNode::Expression(sub) => print_expression(sub, depth + 1),
        }
    }
}
