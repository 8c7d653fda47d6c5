use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use boq_lifecycle::boq::{DefaultTarget, LineCollection};

pub mod commands;

#[derive(Parser)]
#[command(name = "boq-lifecycle")]
#[command(about = "Bill of Quantities lifecycle: import BOQ and WBS lines, derive items and tasks")]
#[command(long_about = "Drives a BOQ record through its stages: import BOQ lines, import WBS lines, \
                       load fetched details, create missing items and create tasks. Run \
                       'boq-lifecycle actions <id>' to see what a record allows next.")]
pub struct Cli {
    /// Directory holding BOQ records (overrides storage.data_dir)
    #[arg(long, global = true, help = "Directory holding one JSON file per BOQ record")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum CollectionArg {
    Boq,
    Wbs,
}

impl From<CollectionArg> for LineCollection {
    fn from(arg: CollectionArg) -> Self {
        match arg {
            CollectionArg::Boq => LineCollection::BoqLines,
            CollectionArg::Wbs => LineCollection::WbsLines,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create an empty BOQ record
    Create {
        /// BOQ record identity
        id: String,
        /// Project the BOQ belongs to
        #[arg(long, help = "Project reference stored on the record")]
        project: String,
        /// Warehouse passed to the task service with every created task
        #[arg(long)]
        warehouse: Option<String>,
    },
    /// List stored BOQ records
    List,
    /// Show a record's stage flags and line counts
    Show {
        id: String,
        /// Print the full record as JSON
        #[arg(long, help = "Dump the complete record as JSON")]
        json: bool,
    },
    /// List the actions the record currently allows
    Actions { id: String },
    /// Import BOQ or WBS lines from a .csv or .json file
    Import {
        id: String,
        #[arg(value_enum)]
        kind: CollectionArg,
        /// Row file (.csv with a header row, or .json array of objects)
        file: PathBuf,
    },
    /// Set a line default and fill it into lines that have none
    Default {
        id: String,
        /// boq-uom, boq-item-group, wbs-uom or wbs-item-group
        target: DefaultTarget,
        /// New default; omit to clear it
        value: Option<String>,
    },
    /// Link WBS lines to BOQ lines and mark details as fetched
    Fetch { id: String },
    /// Create catalog items for lines without one
    DeriveItems { id: String },
    /// Create a task for every WBS line without one
    DeriveTasks { id: String },
    /// Delete all BOQ or WBS lines and clear the dependent stage flags
    Reset {
        id: String,
        #[arg(value_enum)]
        which: CollectionArg,
    },
}
