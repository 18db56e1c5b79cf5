//! AtlasGrid CLI
//!
//! Import, browse, select and export datasets stored under a data directory.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use atlasgrid::export::ExportEvent;
use atlasgrid::ingest::ImportEvent;
use atlasgrid::{Config, ExportFormat, GridError, Result, Session};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

/// How long `show` and `select range` wait for visible pages
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// AtlasGrid CLI
#[derive(Parser, Debug)]
#[command(name = "atlasgrid")]
#[command(about = "Windowed import, browse, select and export of large datasets")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./atlasgrid_data")]
    data_dir: PathBuf,

    /// Viewport width in pixels
    #[arg(long, default_value = "1200")]
    width: f32,

    /// Viewport height in pixels
    #[arg(long, default_value = "800")]
    height: f32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Import a CSV, TSV or JSON file as a new dataset
    Import {
        /// Source file
        path: PathBuf,
    },

    /// List datasets
    List,

    /// Print the visible window of a dataset
    Show {
        /// Dataset id
        id: u64,

        /// Scroll to this offset (pixels) instead of the saved one
        #[arg(long)]
        scroll: Option<f32>,
    },

    /// Change the selection of a dataset
    Select {
        /// Dataset id
        id: u64,

        #[command(subcommand)]
        action: SelectAction,
    },

    /// Delete a dataset with its selection
    Delete {
        /// Dataset id
        id: u64,
    },

    /// Export the selection of a dataset
    Export {
        /// Dataset id
        id: u64,

        /// Output format (csv, json)
        #[arg(short, long, default_value = "csv")]
        format: ExportFormat,

        /// Directory the export file is written to
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum SelectAction {
    /// Flip one business id
    Toggle { business_id: i64 },

    /// Add the loaded records between two flat indices
    Range { anchor: usize, target: usize },

    /// Select every business id of the dataset
    All,

    /// Empty the selection
    Clear,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,atlasgrid=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();
    tracing::debug!("AtlasGrid v{}", atlasgrid::VERSION);

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let config = Config::builder().data_dir(&args.data_dir).build();
    let mut session = Session::open(config)?;

    match args.command {
        Commands::Import { path } => {
            let handle = session.begin_import(&path)?;
            tracing::info!("Importing {} as dataset {}", path.display(), handle.dataset_id());
            for event in handle.events().iter() {
                match event {
                    ImportEvent::Progress(p) => {
                        tracing::info!("{} rows stored, {} dropped", p.processed, p.dropped())
                    }
                    ImportEvent::State(state) => tracing::debug!("import {}", state),
                }
            }
            let dataset = handle.wait()?;
            println!("{}\t{}\t{} rows", dataset.id, dataset.name, dataset.total_rows);
        }

        Commands::List => {
            for dataset in session.datasets()? {
                println!(
                    "{}\t{}\t{} rows\t{} bytes\t{}",
                    dataset.id,
                    dataset.name,
                    dataset.total_rows,
                    dataset.byte_size,
                    dataset.imported_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }

        Commands::Show { id, scroll } => {
            let view = session.open_dataset(id, args.width)?;
            view.first_layout(args.height);
            if let Some(offset) = scroll {
                view.scroll_to(offset, args.height);
            }
            view.cache_mut().wait_idle(FETCH_TIMEOUT);
            print_window(&session, args.height);
        }

        Commands::Select { id, action } => {
            let view = session.open_dataset(id, args.width)?;
            view.first_layout(args.height);
            view.cache_mut().wait_idle(FETCH_TIMEOUT);

            match action {
                SelectAction::Toggle { business_id } => {
                    let selected = session.selection_mut().toggle(business_id)?;
                    println!("{} {}", business_id, if selected { "selected" } else { "unselected" });
                }
                SelectAction::Range { anchor, target } => {
                    let added = session.extend_range(anchor, target)?;
                    println!("{} added", added);
                }
                SelectAction::All => {
                    let count = session.selection_mut().select_all()?;
                    println!("{} selected", count);
                }
                SelectAction::Clear => {
                    session.selection_mut().clear()?;
                    println!("selection cleared");
                }
            }
            println!("{} selected in dataset {}", session.selection().len(), id);
        }

        Commands::Delete { id } => {
            if session.store().get_dataset(id)?.is_none() {
                return Err(GridError::NotFound(format!("dataset {}", id)));
            }
            session.delete_dataset(id)?;
            println!("dataset {} deleted", id);
        }

        Commands::Export { id, format, out } => {
            session.open_dataset(id, args.width)?;
            let handle = session.begin_export(format)?;
            for event in handle.events().iter() {
                match event {
                    ExportEvent::Progress(percent) => tracing::debug!("export {:.0}%", percent),
                    ExportEvent::State(state) => tracing::info!("export {}", state),
                }
            }
            let artifact = session
                .take_export()
                .ok_or_else(|| GridError::Worker("export handle missing".to_string()))?
                .wait()?;

            fs::create_dir_all(&out)?;
            let path = out.join(&artifact.filename);
            fs::write(&path, &artifact.payload)?;
            println!("{} rows written to {}", artifact.rows, path.display());
        }
    }

    session.close()
}

/// One line per visible card, `*` marking selected ones
fn print_window(session: &Session, viewport_height: f32) {
    let Some(view) = session.view() else {
        return;
    };
    let dataset = view.dataset();
    let layout = view.layout();
    println!(
        "{} ({} rows, {} columns, offset {:.0}/{:.0})",
        dataset.name,
        dataset.total_rows,
        layout.columns(),
        view.scroll_offset(),
        layout.max_scroll(viewport_height)
    );

    let Some((first, last)) = view.visible_items(viewport_height) else {
        println!("(empty)");
        return;
    };
    for index in first..=last {
        match view.cache().get(index) {
            Some(record) => {
                let mark = if session.selection().is_selected(record.business_id) {
                    '*'
                } else {
                    ' '
                };
                println!(
                    "{} {:>8}  {:>10}  {}  [{} images]",
                    mark,
                    index,
                    record.business_id,
                    record.title,
                    record.images.len()
                );
            }
            None => println!("  {:>8}  (loading)", index),
        }
    }
}
