use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use log::info;

use rowscope::config;
use rowscope::encoding::EncodingChoice;
use rowscope::index::{FileIndex, IndexOptions, data_row_to_index_row};
use rowscope::parse::Delimiter;
use rowscope::reader;

#[derive(Parser)]
#[command(
    name = "rowscope",
    about = "Terminal viewer for very large CSV/TSV files",
    args_conflicts_with_subcommands = true
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Delimited text file to view
    input: Option<PathBuf>,

    /// Text encoding: auto, utf8, gbk or ascii
    #[arg(long, global = true)]
    encoding: Option<EncodingChoice>,

    /// Field delimiter: ',', tab, ';' or '|' (detected when omitted)
    #[arg(long, global = true)]
    delimiter: Option<Delimiter>,

    /// Log output file path (enables logging when specified)
    #[arg(long, global = true)]
    log: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Index a file and print its shape
    Info {
        /// Delimited text file
        input: PathBuf,
    },
    /// Print a range of data rows, tab-separated
    Rows {
        /// Delimited text file
        input: PathBuf,

        /// First data row to print (1-based)
        #[arg(long, default_value_t = 1)]
        start: u64,

        /// Number of rows to print
        #[arg(long, default_value_t = 20)]
        count: usize,

        /// Only print these columns (comma-separated header names)
        #[arg(long)]
        columns: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Some(log_path) = &cli.log {
        let file = match std::fs::File::create(log_path) {
            Ok(f) => f,
            Err(e) => {
                eprintln!("Error: failed to open log file {}: {e}", log_path.display());
                std::process::exit(1);
            }
        };
        env_logger::Builder::from_default_env()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();
    } else if cli.command.is_some() {
        env_logger::init();
    }
    // viewer mode + no --log → logger not initialized (the UI owns the terminal)

    let mut cfg = match config::load_config() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    };
    cfg.merge_cli(cli.encoding, cli.delimiter);
    let config = cfg.resolve();

    let result = match cli.command {
        Some(Command::Info { input }) => cmd_info(input, config.index),
        Some(Command::Rows {
            input,
            start,
            count,
            columns,
        }) => cmd_rows(input, config.index, start, count, columns.as_deref()),
        None => match cli.input {
            Some(path) => rowscope::viewer::run(path, config),
            None => {
                eprintln!("Error: input file required (see --help)");
                std::process::exit(1);
            }
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn cmd_info(input: PathBuf, options: IndexOptions) -> Result<()> {
    let (index, timing) = FileIndex::build(&input, options)
        .with_context(|| format!("failed to index {}", input.display()))?;

    let mut out = io::stdout().lock();
    writeln!(out, "path:       {}", input.display())?;
    writeln!(out, "encoding:   {}", index.encoding())?;
    writeln!(out, "delimiter:  {}", index.delimiter())?;
    writeln!(
        out,
        "columns:    {} ({})",
        index.header().len(),
        index.header().join(", ")
    )?;
    writeln!(
        out,
        "rows:       {} data rows (+{} header)",
        index.data_row_count(),
        index.total_row_count().min(1)
    )?;
    writeln!(out, "indexed in: {:.1}ms", timing.millis())?;
    Ok(())
}

fn cmd_rows(
    input: PathBuf,
    options: IndexOptions,
    start: u64,
    count: usize,
    columns: Option<&str>,
) -> Result<()> {
    if start == 0 {
        bail!("--start is 1-based");
    }
    let (index, _) = FileIndex::build(&input, options)
        .with_context(|| format!("failed to index {}", input.display()))?;
    let data_rows = index.data_row_count();
    if start > data_rows {
        bail!("start row {start} is past the last row ({data_rows})");
    }

    let selected: Vec<usize> = match columns {
        None => (0..index.header().len()).collect(),
        Some(list) => {
            let names: Vec<&str> = list.split(',').map(str::trim).collect();
            let picked: Vec<usize> = index
                .header()
                .iter()
                .enumerate()
                .filter(|(_, h)| names.contains(&h.as_str()))
                .map(|(i, _)| i)
                .collect();
            if picked.is_empty() {
                bail!("none of the columns {list:?} exist in the header");
            }
            picked
        }
    };

    let read = reader::read_rows(&index, data_row_to_index_row(start - 1), count)?;
    info!(
        "cmd_rows: {} rows in {:.1}ms (lossy={})",
        read.slice.len(),
        read.timing.millis(),
        read.lossy_rows
    );

    let mut out = BufWriter::new(io::stdout().lock());
    let header: Vec<&str> = selected
        .iter()
        .map(|&i| index.header()[i].as_str())
        .collect();
    writeln!(out, "row\t{}", header.join("\t"))?;
    for (n, row) in read.slice.rows.iter().enumerate() {
        let cells: Vec<String> = selected
            .iter()
            .map(|&i| escape(row.get(i).map_or("", String::as_str)))
            .collect();
        writeln!(out, "{}\t{}", start + n as u64, cells.join("\t"))?;
    }
    out.flush()?;
    if read.truncated {
        bail!("read stopped early after {} rows", read.slice.len());
    }
    Ok(())
}

/// Keep one row per output line.
fn escape(field: &str) -> String {
    field
        .replace('\\', "\\\\")
        .replace('\t', "\\t")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
}
