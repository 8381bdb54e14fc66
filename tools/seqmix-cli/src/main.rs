//! seqmix CLI: build a channel recipe from image sequences and export it.
//!
//! Usage:
//!   seqmix discover <DIR>                      List frame sequences in a directory
//!   seqmix init <PROJECT>                      Create a project file
//!   seqmix add-sequence <PROJECT> <DIR> <PAT>  Load a sequence into a project
//!   seqmix info <PROJECT>                      Show sequences, channels and recipe
//!   seqmix add-channel <PROJECT> <SEQ:CHAN>    Add an output channel
//!   seqmix import-attrs <PROJECT> <SEQ>        Copy attributes into the output set
//!   seqmix set-export <PROJECT> [OPTIONS]      Change export settings
//!   seqmix validate <PROJECT>                  Report recipe issues
//!   seqmix export <PROJECT>                    Write the output sequence

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use seqmix_common::config::AppConfig;
use seqmix_project_model::{AlignmentMode, CompressionPolicy, FrameRangePolicy};

mod commands;

#[derive(Parser)]
#[command(
    name = "seqmix",
    about = "Recombine channels and metadata across image sequences",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// What to do when an imported attribute already exists with another value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OnConflict {
    /// Report conflicts and change nothing
    Fail,
    /// Keep the output set's value
    Keep,
    /// Take the imported value
    Replace,
}

/// Attribute value type for `set-attr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AttrKind {
    Int,
    Float,
    String,
}

#[derive(Subcommand)]
enum Commands {
    /// List the frame sequences found in a directory
    Discover {
        /// Directory to scan
        dir: PathBuf,

        /// Consider every file, not only known image extensions
        #[arg(long)]
        all_files: bool,
    },

    /// Create a new, empty project file
    Init {
        /// Project file to create
        project: PathBuf,

        /// Project name (defaults to the file stem)
        #[arg(short, long)]
        name: Option<String>,

        /// Output filename pattern
        #[arg(long, default_value = "output.%04d.tif")]
        pattern: String,
    },

    /// Load a sequence into a project and probe it
    AddSequence {
        project: PathBuf,

        /// Directory holding the frames
        dir: PathBuf,

        /// Filename pattern, e.g. beauty.%04d.png or beauty.####.png
        pattern: String,

        /// Sequence id (defaults to the pattern's prefix)
        #[arg(long)]
        id: Option<String>,
    },

    /// Unload a sequence; channels that used it are kept and reported
    RemoveSequence { project: PathBuf, id: String },

    /// Show sequences, their channels and attributes, and the recipe
    Info { project: PathBuf },

    /// Add an output channel sourced from SEQ:CHANNEL[@SUBIMAGE]
    AddChannel {
        project: PathBuf,
        source: String,

        /// Output channel name (defaults to the source channel name)
        #[arg(short, long)]
        name: Option<String>,

        /// Explicit output format, e.g. float or half
        #[arg(long)]
        format: Option<String>,
    },

    /// Rename an output channel
    RenameChannel {
        project: PathBuf,
        from: String,
        to: String,
    },

    /// Remove an output channel
    RemoveChannel { project: PathBuf, name: String },

    /// Move an output channel to a zero-based position
    MoveChannel {
        project: PathBuf,
        name: String,
        position: usize,
    },

    /// Set or clear an output channel's explicit format
    SetFormat {
        project: PathBuf,
        name: String,

        /// New format; omit to clear the override
        format: Option<String>,
    },

    /// Copy attributes from a sequence into the output attribute set
    ImportAttrs {
        project: PathBuf,
        sequence: String,

        /// Attribute names; none imports all
        names: Vec<String>,

        #[arg(long, default_value = "0")]
        subimage: usize,

        #[arg(long, value_enum, default_value = "fail")]
        on_conflict: OnConflict,
    },

    /// Add or edit an output attribute
    SetAttr {
        project: PathBuf,
        name: String,
        value: String,

        #[arg(long = "type", value_enum, default_value = "string")]
        kind: AttrKind,
    },

    /// Remove an output attribute
    RemoveAttr { project: PathBuf, name: String },

    /// Change export settings
    SetExport {
        project: PathBuf,

        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Output filename pattern
        #[arg(long)]
        pattern: Option<String>,

        /// STOP_AT_SHORTEST, HOLD_LAST or PROCESS_AVAILABLE
        #[arg(long)]
        policy: Option<FrameRangePolicy>,

        /// BY_FRAME_NUMBER or BY_INDEX
        #[arg(long)]
        alignment: Option<AlignmentMode>,

        /// Compression selector passed to the image store
        #[arg(long)]
        compression: Option<String>,

        /// skip: copy unchanged single-sequence recipes; always: re-encode
        #[arg(long)]
        compression_policy: Option<CompressionPolicy>,

        /// Inclusive output frame range, START-END
        #[arg(long)]
        range: Option<String>,

        /// Remove the frame range restriction
        #[arg(long, conflicts_with = "range")]
        clear_range: bool,
    },

    /// Validate the recipe and print every issue
    Validate {
        project: PathBuf,

        /// Print issues as JSON
        #[arg(long)]
        json: bool,
    },

    /// Export the recipe
    Export { project: PathBuf },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::load();

    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    seqmix_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Discover { dir, all_files } => commands::discover::run(&config, dir, all_files),
        Commands::Init {
            project,
            name,
            pattern,
        } => commands::init::run(&config, project, name, pattern),
        Commands::AddSequence {
            project,
            dir,
            pattern,
            id,
        } => commands::sequence::add(&mut config, project, dir, pattern, id),
        Commands::RemoveSequence { project, id } => commands::sequence::remove(project, id),
        Commands::Info { project } => commands::info::run(project),
        Commands::AddChannel {
            project,
            source,
            name,
            format,
        } => commands::channel::add(project, source, name, format),
        Commands::RenameChannel { project, from, to } => {
            commands::channel::rename(project, from, to)
        }
        Commands::RemoveChannel { project, name } => commands::channel::remove(project, name),
        Commands::MoveChannel {
            project,
            name,
            position,
        } => commands::channel::move_to(project, name, position),
        Commands::SetFormat {
            project,
            name,
            format,
        } => commands::channel::set_format(project, name, format),
        Commands::ImportAttrs {
            project,
            sequence,
            names,
            subimage,
            on_conflict,
        } => commands::attrs::import(project, sequence, names, subimage, on_conflict),
        Commands::SetAttr {
            project,
            name,
            value,
            kind,
        } => commands::attrs::set(project, name, value, kind),
        Commands::RemoveAttr { project, name } => commands::attrs::remove(project, name),
        Commands::SetExport {
            project,
            output_dir,
            pattern,
            policy,
            alignment,
            compression,
            compression_policy,
            range,
            clear_range,
        } => commands::set_export::run(
            &mut config,
            project,
            commands::set_export::ExportChanges {
                output_dir,
                pattern,
                policy,
                alignment,
                compression,
                compression_policy,
                range,
                clear_range,
            },
        ),
        Commands::Validate { project, json } => commands::validate::run(project, json),
        Commands::Export { project } => commands::export::run(&mut config, project).await,
    }
}
