use anyhow::Context;
use clap::{Parser, Subcommand};
use pipestore::{
    ArtifactStore, AssembleOptions, Dataset, Group, JsonFileSettings, PipelineArtifacts,
    SettingsProvider, VectorAssembler,
};
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Inspect and assemble pipeline artifacts
#[derive(Parser, Debug)]
#[command(name = "pipestore")]
#[command(about = "Inspect and assemble document-pipeline artifacts", long_about = None)]
struct Args {
    /// Path to the pipeline settings file
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the groups of a store (or of a group inside it)
    Groups {
        store: PathBuf,
        /// Slash-separated group path, e.g. `tfidf/worker-0`
        #[arg(short, long)]
        group: Option<String>,
    },
    /// List the datasets of a store (or of a group inside it)
    Datasets {
        store: PathBuf,
        #[arg(short, long)]
        group: Option<String>,
    },
    /// Print a dataset's metadata and contents
    Show {
        store: PathBuf,
        dataset: String,
        #[arg(short, long)]
        group: Option<String>,
    },
    /// Assemble one score method's shards into a `_ref`-ordered matrix
    Assemble {
        method: String,
        /// Use the reduced `VX` vectors
        #[arg(long)]
        reduced: bool,
        /// Fail on duplicate `_ref` values
        #[arg(long)]
        strict: bool,
    },
    /// Load the imported CSV files and report their size
    Import {
        /// Payload columns to load besides `_ref`
        #[arg(short, long, value_delimiter = ',')]
        columns: Vec<String>,
    },
}

fn open_group<'s>(store: &'s ArtifactStore, path: Option<&str>) -> pipestore::Result<Group<'s>> {
    let mut group = store.root();
    for part in path.unwrap_or("").split('/').filter(|p| !p.is_empty()) {
        group = group.group(part)?;
    }
    Ok(group)
}

fn load_artifacts(config: &Path) -> anyhow::Result<PipelineArtifacts> {
    let config = JsonFileSettings::new(config)
        .load()
        .with_context(|| format!("loading settings from {:?}", config))?;
    Ok(PipelineArtifacts::new(config))
}

fn print_dataset(dataset: &Dataset) {
    match dataset {
        Dataset::I64(a) => println!("{}", a),
        Dataset::F32(a) => println!("{}", a),
        Dataset::F64(a) => println!("{}", a),
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match args.command {
        Command::Groups { store, group } => {
            let store = ArtifactStore::open_read_only(&store)?;
            for name in open_group(&store, group.as_deref())?.list_groups()? {
                println!("{}", name);
            }
        }
        Command::Datasets { store, group } => {
            let store = ArtifactStore::open_read_only(&store)?;
            let group = open_group(&store, group.as_deref())?;
            for name in group.list_datasets()? {
                let info = group.dataset_info(&name)?;
                println!("{}\t{}\t{:?}", name, info.dtype, info.shape);
            }
        }
        Command::Show { store, dataset, group } => {
            let store = ArtifactStore::open_read_only(&store)?;
            let group = open_group(&store, group.as_deref())?;
            let info = group.dataset_info(&dataset)?;
            println!("name:        {}/{}", group.name().trim_end_matches('/'), dataset);
            println!("dtype:       {}", info.dtype);
            println!("shape:       {:?}", info.shape);
            println!("compression: {:?}", info.compression);
            println!("sha256:      {}", info.checksum);
            print_dataset(&group.read_dataset(&dataset)?);
        }
        Command::Assemble { method, reduced, strict } => {
            let artifacts = load_artifacts(&args.config)?;
            let assembler = VectorAssembler::from_config(artifacts.config())?;
            let options = AssembleOptions {
                use_reduced: reduced,
                strict_unique_refs: strict,
            };
            let docs = assembler.assemble::<f32>(&method, options)?;
            info!("Store: {:?}", assembler.store_path());
            println!("documents: {}", docs.len());
            println!("dim:       {}", docs.dim());
            if let (Some(first), Some(last)) = (docs.refs.first(), docs.refs.last()) {
                println!("_ref:      {}..={}", first, last);
            }
        }
        Command::Import { columns } => {
            let artifacts = load_artifacts(&args.config)?;
            let columns: Vec<&str> = columns.iter().map(String::as_str).collect();
            let table = artifacts.load_import_data(&columns)?;
            println!("rows:    {}", table.len());
            println!("columns: {}", table.columns().join(","));
        }
    }

    Ok(())
}
