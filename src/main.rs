//! LineageOS build publisher CLI
//!
//! Entry point for the `publish-builds` command-line tool.

use clap::{Args, Parser, Subcommand};
use lineage_publisher::{logging, AnyBackend, Build, BuildFilter, Config, MergeOutcome, Publisher};
use std::path::{Path, PathBuf};
use std::process;

#[derive(Parser)]
#[command(name = "publish-builds")]
#[command(about = "Publish LineageOS builds", version)]
struct Cli {
    /// Log filter when RUST_LOG is unset (e.g. "debug", "lineage_publisher=trace")
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ConfigArgs {
    /// Path to configuration file; several are processed in turn
    #[arg(long, short = 'c', required = true, num_args = 1..)]
    config: Vec<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile the manifest and backend with the builds on disk
    Index {
        #[command(flatten)]
        configs: ConfigArgs,

        /// Index builds for a given device model
        #[arg(long, short = 'm')]
        model: Option<String>,
    },

    /// Publish a single build file or build directory
    Add {
        #[command(flatten)]
        configs: ConfigArgs,

        /// Path to the build
        build: PathBuf,
    },

    /// Unpublish builds matching a filter
    Delete {
        #[command(flatten)]
        configs: ConfigArgs,

        /// Only print builds to be deleted
        #[arg(long, short = 'p')]
        dry: bool,

        /// Delete all builds
        #[arg(long, short = 'a')]
        all: bool,

        /// Delete builds for a given device model
        #[arg(long, short = 'm')]
        model: Option<String>,

        /// Delete builds for this version
        #[arg(long, short = 'v')]
        version: Option<String>,

        /// Delete builds starting from this date
        #[arg(long, short = 's')]
        start_date: Option<String>,

        /// Delete builds ending with this date (inclusive)
        #[arg(long, short = 'e')]
        end_date: Option<String>,

        /// Delete builds from this date
        #[arg(long, short = 'd')]
        date: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();
    logging::init(&cli.log_level);

    // Usage errors fail before any config is touched.
    let delete_filter = match &cli.command {
        Commands::Delete {
            all: false,
            model,
            version,
            start_date,
            end_date,
            date,
            ..
        } => match BuildFilter::new(model.clone(), version.clone()).with_dates(
            start_date.as_deref(),
            end_date.as_deref(),
            date.as_deref(),
        ) {
            Ok(filter) => Some(filter),
            Err(e) => {
                eprintln!("Error: {}", e);
                process::exit(1);
            }
        },
        _ => None,
    };

    let configs = match &cli.command {
        Commands::Index { configs, .. } | Commands::Add { configs, .. } | Commands::Delete { configs, .. } => {
            &configs.config
        }
    };

    for config_path in configs {
        println!("Using config {}", config_path.display());
        let mut publisher = open_publisher(config_path);

        match &cli.command {
            Commands::Index { model, .. } => run_index(&mut publisher, model.as_deref()),
            Commands::Add { build, .. } => run_add(&mut publisher, build),
            Commands::Delete { dry, .. } => run_delete(&mut publisher, delete_filter.as_ref(), *dry),
        }

        println!();
    }
}

fn open_publisher(config_path: &Path) -> Publisher<AnyBackend> {
    let config = match Config::load(config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            process::exit(1);
        }
    };

    let backend = match AnyBackend::from_config(&config) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("Error creating backend: {}", e);
            process::exit(1);
        }
    };

    Publisher::new(&config, backend)
}

fn run_index(publisher: &mut Publisher<AnyBackend>, model: Option<&str>) {
    let result = match model {
        Some(device) => publisher.index_device_builds(device),
        None => publisher.index_builds(),
    };

    match result {
        Ok(report) => {
            println!(
                "Indexed {} builds: {} added, {} updated, {} unchanged, {} skipped, {} evicted, {} removed, {} failed",
                report.scanned,
                report.added,
                report.updated,
                report.unchanged,
                report.skipped,
                report.evicted,
                report.removed,
                report.failed
            );
        }
        Err(e) => {
            eprintln!("Error indexing builds: {}", e);
            process::exit(1);
        }
    }
}

fn run_add(publisher: &mut Publisher<AnyBackend>, path: &Path) {
    let build = match lineage_publisher::artifact::load_build(path) {
        Ok(b) => b,
        Err(e) => {
            println!("{}", e);
            process::exit(1);
        }
    };

    match publisher.add_build(build) {
        Ok(MergeOutcome::Added) => println!("Added build"),
        Ok(MergeOutcome::Updated {
            removed_files,
            added_files,
        }) => println!(
            "Updated build: {} files removed, {} files added",
            removed_files, added_files
        ),
        Ok(MergeOutcome::Unchanged) => println!("Build already published"),
        Ok(MergeOutcome::Skipped(reason)) => println!("Skipped build: {:?}", reason),
        Err(e) => {
            eprintln!("Error adding build: {}", e);
            process::exit(1);
        }
    }
}

fn run_delete(publisher: &mut Publisher<AnyBackend>, filter: Option<&BuildFilter>, dry: bool) {
    let builds: Vec<Build> = match filter {
        Some(filter) => publisher.find_builds(filter),
        None => publisher.find_all_builds(),
    }
    .unwrap_or_else(|e| {
        eprintln!("Error reading manifest: {}", e);
        process::exit(1);
    });

    if builds.is_empty() {
        println!("No builds found");
    }

    for build in &builds {
        if dry {
            println!("Found build {}", build.name);
            continue;
        }

        println!("Removing build {}", build.name);
        match publisher.remove_build(build) {
            Ok(_) => println!("Removed build {}", build.name),
            Err(e) => eprintln!("Failed to remove build {}: {}", build.name, e),
        }
    }
}
