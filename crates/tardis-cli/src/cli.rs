use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "tardis-migrate",
    version,
    about = "Migrate, mirror and archive research datafiles",
    after_help = "\
Configuration file lookup order:
  1. --config <path>             (explicit flag)
  2. $TARDIS_MIGRATE_CONFIG      (environment variable)
  3. ./tardis-migrate.yaml       (project)
  4. Platform user config dir + /tardis-migrate/config.yaml
  5. /etc/tardis-migrate/config.yaml

Sizes accept K, M, G and T suffixes (powers of 1024)."
)]
pub(crate) struct Cli {
    /// Path to configuration file (overrides TARDIS_MIGRATE_CONFIG and default search)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Package experiments into tar.gz archives
    Archive(ArchiveArgs),

    /// List archive records of experiments
    Archivelist {
        /// Experiment ids
        ids: Vec<u64>,

        /// Every experiment in the catalog
        #[arg(long)]
        all: bool,
    },

    /// Move datafiles to a destination
    Migrate {
        /// Datafile ids
        #[arg(required = true)]
        ids: Vec<u64>,

        /// Destination name (defaults to default_destination)
        #[arg(long)]
        dest: Option<String>,

        /// Repoint the records but keep the local copies
        #[arg(long = "noRemove")]
        no_remove: bool,

        /// Only check what would be migrated
        #[arg(long = "dryRun")]
        dry_run: bool,
    },

    /// Copy datafiles to a destination without repointing them
    Mirror {
        /// Datafile ids
        #[arg(required = true)]
        ids: Vec<u64>,

        /// Destination name (defaults to default_destination)
        #[arg(long)]
        dest: Option<String>,

        /// Only check what would be mirrored
        #[arg(long = "dryRun")]
        dry_run: bool,
    },

    /// Migrate the highest scoring datafiles until AMOUNT bytes are freed
    Reclaim {
        /// Amount of local storage to free, e.g. 500M or 2G
        amount: String,

        /// Destination name (defaults to default_destination)
        #[arg(long)]
        dest: Option<String>,

        /// Only show which datafiles would be migrated
        #[arg(long = "dryRun")]
        dry_run: bool,
    },

    /// Show migration priority of local datafiles
    Score {
        /// Only datafiles of this experiment
        #[arg(long, conflicts_with = "dataset")]
        experiment: Option<u64>,

        /// Only datafiles of this dataset
        #[arg(long)]
        dataset: Option<u64>,

        /// Show at most N datafiles
        #[arg(long)]
        limit: Option<usize>,
    },

    /// List configured destinations and whether they respond
    Destinations,

    /// Recompute local checksums and mark datafiles verified
    Verify {
        /// Datafile ids
        #[arg(required = true)]
        ids: Vec<u64>,
    },

    /// Write a starter configuration file
    Config {
        /// Where to write it (default ./tardis-migrate.yaml)
        dest: Option<String>,
    },
}

#[derive(Args)]
pub(crate) struct ArchiveArgs {
    /// Experiment ids
    pub ids: Vec<u64>,

    /// Every experiment in the catalog
    #[arg(long)]
    pub all: bool,

    /// Report what would happen without writing anything
    #[arg(long = "dryRun")]
    pub dry_run: bool,

    /// Skip experiments unchanged since their last archive
    #[arg(long)]
    pub incremental: bool,

    /// Write archives into this local directory
    #[arg(long, conflicts_with = "location")]
    pub directory: Option<PathBuf>,

    /// Upload archives to this destination
    #[arg(long)]
    pub location: Option<String>,

    /// Ask the destination to move uploaded archives offline
    #[arg(long = "sendOffline")]
    pub send_offline: bool,

    /// Re-hash local datafiles while packaging
    #[arg(long)]
    pub checksums: bool,

    /// Delete archived local copies afterwards
    #[arg(long = "removeData")]
    pub remove_data: bool,

    /// Delete archived data and the experiment record afterwards
    #[arg(long = "removeAll")]
    pub remove_all: bool,

    /// Keep only the newest N archives of each experiment
    #[arg(long = "keepOnly")]
    pub keep_only: Option<usize>,

    /// Smallest acceptable archive size
    #[arg(long = "minSize")]
    pub min_size: Option<String>,

    /// Largest acceptable archive size
    #[arg(long = "maxSize")]
    pub max_size: Option<String>,

    /// Stop starting new archives once this much has been archived
    #[arg(long = "maxTotalSize")]
    pub max_total_size: Option<String>,

    /// Keep archives that violate the size limits, and remove data of
    /// partial archives
    #[arg(long)]
    pub force: bool,
}
