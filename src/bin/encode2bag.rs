use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use encode2bag::app::{App, BagOptions};
use encode2bag::bagit::BagItMaterializer;
use encode2bag::config::ConfigLoader;
use encode2bag::domain::{ArchiveFormat, Creator};
use encode2bag::output::{self, JsonOutput, LogSink, OutputMode};
use encode2bag::portal::PortalHttpClient;

#[derive(Parser)]
#[command(name = "encode2bag")]
#[command(about = "Utility for converting ENCODE search URLs or metadata files into BDBags")]
#[command(after_help = "For more information see: http://github.com/ini-bdds/encode2bag")]
#[command(version, author)]
struct Cli {
    #[command(flatten)]
    source: Source,

    /// Name for the output bag directory/bag archive file; generated when omitted.
    #[arg(long, value_name = "directory name")]
    output_name: Option<String>,

    /// Base directory in which the bag will be created; a temporary directory when omitted.
    #[arg(long, value_name = "path")]
    output_path: Option<PathBuf>,

    /// Archive the output bag using the specified format.
    #[arg(long, value_enum)]
    archiver: Option<ArchiveFormat>,

    /// Generate a Research Object compatible manifest (http://www.researchobject.org).
    #[arg(long)]
    create_ro_manifest: bool,

    /// Name of the person or entity responsible for the creation of this bag.
    #[arg(long, value_name = "person or entity name")]
    creator_name: Option<String>,

    /// ORCID identifier of the bag creator.
    #[arg(long, value_name = "orcid")]
    creator_orcid: Option<String>,

    /// Replace an existing bag directory instead of moving it aside.
    #[arg(long)]
    overwrite: bool,

    /// Keep the bag directory after archiving it.
    #[arg(long)]
    keep_bag_dir: bool,

    /// Path to an encode2bag.json config file.
    #[arg(long, value_name = "file")]
    config: Option<PathBuf>,

    /// Print the result as JSON.
    #[arg(long)]
    json: bool,

    /// Suppress logging output.
    #[arg(long, conflicts_with = "debug")]
    quiet: bool,

    /// Enable debug logging output.
    #[arg(long)]
    debug: bool,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct Source {
    /// ENCODE search url, e.g. "https://www.encodeproject.org/search/?type=Experiment&assay_title=RNA-seq".
    #[arg(long, value_name = "search url")]
    url: Option<String>,

    /// ENCODE format metadata file, e.g. "metadata.tsv".
    #[arg(long, value_name = "file")]
    metadata_file: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);
    let debug = cli.debug;

    eprintln!();
    if let Err(report) = run(cli) {
        if debug {
            eprintln!("{report:?}");
        } else {
            eprintln!("Error: {report}");
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn init_tracing(cli: &Cli) {
    let level = if cli.quiet {
        "error"
    } else if cli.debug {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> miette::Result<()> {
    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Plain
    };

    let options = BagOptions {
        remote_file_manifest: None,
        working_dir: None,
        output_name: cli.output_name,
        output_path: cli.output_path.or(config.base_path),
        archive_format: cli.archiver.or(config.archiver),
        creator: Creator {
            name: cli.creator_name,
            uri: None,
            orcid: cli.creator_orcid,
        },
        create_ro_manifest: cli.create_ro_manifest,
        overwrite: cli.overwrite || config.overwrite,
        keep_bag_directory: cli.keep_bag_dir,
    };

    let portal = PortalHttpClient::new(&config.http)?;
    let app = App::new(portal, BagItMaterializer::new());
    let result = match (cli.source.url, cli.source.metadata_file) {
        (Some(url), _) => app.create_bag_from_url(&url, &options, &LogSink),
        (None, Some(path)) => app.create_bag_from_metadata_file(&path, &options, &LogSink),
        (None, None) => {
            return Err(miette::Report::msg(
                "either the --url argument or the --metadata-file argument must be specified",
            ));
        }
    }?;

    match output_mode {
        OutputMode::Json => JsonOutput::print_bag(&result).into_diagnostic()?,
        OutputMode::Plain => output::print_bag_path(&result).into_diagnostic()?,
    }
    Ok(())
}
