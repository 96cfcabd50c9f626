use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use medsearch_core::document::parse_date;
use medsearch_core::{EngineConfig, FilterPredicate, IdfMode, IngestRequest, NewDocument, SearchEngine, SearchRequest};
use serde::{Deserialize, Serialize};
use tracing_subscriber::{EnvFilter, fmt};
use walkdir::WalkDir;

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct InputDoc {
    title: String,
    #[serde(alias = "body", alias = "content")]
    text: String,
    #[serde(default, alias = "patient_id")]
    subject_id: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default, alias = "id")]
    name: Option<String>,
}

#[derive(Parser)]
#[command(name = "medsearch-indexer")]
#[command(about = "Index and search a closed corpus of reports", long_about = None)]
struct Cli {
    /// Index directory
    #[arg(long, global = true, default_value = "./index")]
    index: String,
    /// Blob store directory for original uploads (disabled if omitted)
    #[arg(long, global = true)]
    blobs: Option<String>,
    /// IDF variant used for ranking: smoothed or plain
    #[arg(long, global = true, default_value = "smoothed")]
    idf: IdfMode,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index report files (or every file under a directory) as one batch
    Add {
        /// Files or directories
        #[arg(required = true)]
        paths: Vec<String>,
        /// Title for every file; defaults to each file's stem
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        subject_id: Option<String>,
        /// Report date, YYYY-MM-DD; defaults to today
        #[arg(long)]
        date: Option<String>,
    },
    /// Import already-extracted reports from a JSON array/object or JSONL file
    Import {
        input: String,
    },
    /// Ranked search with optional filters
    Search {
        query: String,
        #[arg(long, short, default_value_t = 10)]
        k: usize,
        #[arg(long)]
        subject_id: Option<String>,
        /// Inclusive lower date bound, YYYY-MM-DD
        #[arg(long)]
        from: Option<String>,
        /// Inclusive upper date bound, YYYY-MM-DD
        #[arg(long)]
        to: Option<String>,
    },
    /// List every indexed document
    List,
    /// Print one stored document
    Show {
        doc_id: String,
    },
    /// Delete all documents and postings
    Rebuild {
        /// Confirm the destructive rebuild
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
    /// Index statistics
    Stats,
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    let mut config = EngineConfig::new(&cli.index).with_idf(cli.idf);
    if let Some(dir) = &cli.blobs {
        config = config.with_blob_dir(dir);
    }
    let engine = SearchEngine::open(config)?;
    if let Some(event) = engine.recovery() {
        eprintln!("warning: index was corrupt and has been recreated empty ({})", event.reason);
    }

    match cli.command {
        Commands::Add { paths, title, subject_id, date } => add_files(&engine, &paths, title, subject_id, date),
        Commands::Import { input } => import(&engine, Path::new(&input)),
        Commands::Search { query, k, subject_id, from, to } => {
            let filter = FilterPredicate {
                subject_id,
                date_from: from.as_deref().map(parse_date).transpose()?,
                date_to: to.as_deref().map(parse_date).transpose()?,
            };
            let hits = engine.search(&SearchRequest { query, limit: k, filter })?;
            print_json(&hits)
        }
        Commands::List => print_json(&engine.list_documents()),
        Commands::Show { doc_id } => print_json(&engine.get_document(&doc_id)?),
        Commands::Rebuild { yes } => {
            if !yes {
                bail!("rebuild deletes every indexed document; pass --yes to confirm");
            }
            engine.rebuild_index()?;
            tracing::info!(index = %cli.index, "index rebuilt");
            Ok(())
        }
        Commands::Stats => print_json(&engine.stats()),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn collect_files(paths: &[String]) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = Vec::new();
    for input in paths {
        let input_path = Path::new(input);
        if input_path.is_dir() {
            for entry in WalkDir::new(input_path).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
                if entry.path().is_file() {
                    files.push(entry.path().to_path_buf());
                }
            }
        } else if input_path.is_file() {
            files.push(input_path.to_path_buf());
        } else {
            tracing::warn!(path = %input, "skipping missing path");
        }
    }
    files
}

fn add_files(engine: &SearchEngine, paths: &[String], title: Option<String>, subject_id: Option<String>, date: Option<String>) -> Result<()> {
    let date = date.as_deref().map(parse_date).transpose()?;
    let files = collect_files(paths);
    if files.is_empty() {
        bail!("no files to index");
    }

    let mut requests = Vec::with_capacity(files.len());
    for file in &files {
        let bytes = fs::read(file).with_context(|| format!("reading {}", file.display()))?;
        let name = file.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        let stem = file.file_stem().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| name.clone());
        requests.push(IngestRequest {
            title: title.clone().unwrap_or(stem),
            name,
            bytes,
            content_type: None,
            subject_id: subject_id.clone(),
            date,
        });
    }

    let outcomes = engine.ingest_batch(requests)?;
    for o in &outcomes {
        for w in &o.warnings {
            eprintln!("warning: {w}");
        }
    }
    tracing::info!(num_docs = outcomes.len(), "indexed files");
    print_json(&outcomes)
}

fn import(engine: &SearchEngine, file: &Path) -> Result<()> {
    let mut inputs: Vec<InputDoc> = Vec::new();
    if file.extension().and_then(|s| s.to_str()) == Some("jsonl") {
        let reader = BufReader::new(File::open(file)?);
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() { continue; }
            inputs.push(serde_json::from_str(&line)?);
        }
    } else {
        let reader = BufReader::new(File::open(file)?);
        let json: serde_json::Value = serde_json::from_reader(reader)?;
        match json {
            serde_json::Value::Array(arr) => {
                for v in arr {
                    inputs.push(serde_json::from_value(v)?);
                }
            }
            serde_json::Value::Object(_) => inputs.push(serde_json::from_value(json)?),
            _ => bail!("expected a JSON object or array in {}", file.display()),
        }
    }

    let mut docs = Vec::with_capacity(inputs.len());
    for input in inputs {
        docs.push(NewDocument {
            name: input.name,
            title: input.title,
            subject_id: input.subject_id,
            date: input.date.as_deref().map(parse_date).transpose()?,
            content: input.text,
        });
    }
    let ids = engine.index_documents(docs)?;
    tracing::info!(num_docs = ids.len(), input = %file.display(), "import complete");
    print_json(&ids)
}
