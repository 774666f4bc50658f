use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use directories::BaseDirs;
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use rat_fetch::app::{App, FetchOptions};
use rat_fetch::config::ConfigLoader;
use rat_fetch::convert::DicomConverter;
use rat_fetch::domain::Dataset;
use rat_fetch::error::RatError;
use rat_fetch::output::{DoctorResult, JsonOutput, ListResult, ProbeResult};
use rat_fetch::probe;

#[derive(Parser)]
#[command(name = "rat-fetch")]
#[command(about = "Fetch the rat liver MRI studies from Zenodo as DICOM or NIfTI")]
#[command(version, author)]
struct Cli {
    /// Path to a rat-fetch.json config file.
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Download a study, a named group or `all`")]
    Fetch(FetchArgs),
    #[command(about = "List the known studies and groups")]
    List,
    #[command(about = "Check whether zenodo.org is reachable")]
    Probe,
    #[command(about = "Show configuration and converter availability")]
    Doctor,
}

#[derive(Args)]
struct FetchArgs {
    /// S01..S15, rifampicin_effect_size, six_compound, field_strength, chronic or all.
    dataset: String,
    /// Download folder; NIfTI output goes to its `_nifti` sibling.
    #[arg(long)]
    folder: Option<PathBuf>,
    #[arg(long)]
    unzip: bool,
    /// Convert to NIfTI with dcm2niix (implies --unzip).
    #[arg(long)]
    convert: bool,
    /// Re-download and re-process even when results exist on disk.
    #[arg(long)]
    force: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<RatError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &RatError) -> u8 {
    match error {
        RatError::InvalidDataset(_)
        | RatError::ConfigRead(_)
        | RatError::ConfigParse(_)
        | RatError::ConfigValue { .. } => 2,
        RatError::ZenodoHttp(_)
        | RatError::ZenodoStatus { .. }
        | RatError::StudyNotInRecord { .. }
        | RatError::IncompleteDownload { .. }
        | RatError::MissingTool(_)
        | RatError::Conversion(_) => 3,
        RatError::Filesystem(_) | RatError::Archive(_) => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Fetch(args) => run_fetch(args, cli.config.as_deref()),
        Commands::List => JsonOutput::print_list(&ListResult::catalog()).into_diagnostic(),
        Commands::Probe => {
            let result = ProbeResult {
                host: probe::ZENODO_HOST.to_string(),
                online: probe::zenodo_online(),
            };
            JsonOutput::print_probe(&result).into_diagnostic()
        }
        Commands::Doctor => {
            let config = ConfigLoader::resolve(cli.config.as_deref())?;
            let app = App::from_config(&config)?;
            let result = DoctorResult {
                record_id: config.record_id.clone(),
                zenodo_api: config.zenodo_api.clone(),
                converter_available: app.converter().is_available(),
                converter: app.converter().tool_info(),
            };
            JsonOutput::print_doctor(&result).into_diagnostic()
        }
    }
}

fn run_fetch(args: FetchArgs, config_path: Option<&str>) -> miette::Result<()> {
    let FetchArgs {
        dataset,
        folder,
        unzip,
        convert,
        force,
    } = args;

    let dataset: Dataset = dataset.parse()?;
    let config = ConfigLoader::resolve(config_path)?;
    let folder = match folder {
        Some(folder) => folder,
        None => default_folder()?,
    };

    let app = App::from_config(&config)?;
    let options = FetchOptions {
        unzip,
        convert,
        force,
    };
    let result = app.fetch(dataset, &folder, options)?;
    JsonOutput::print_fetch(&result).into_diagnostic()
}

fn default_folder() -> Result<PathBuf, RatError> {
    BaseDirs::new()
        .map(|dirs| downloads_under(dirs.cache_dir()))
        .ok_or_else(|| RatError::Filesystem("unable to resolve cache directory".to_string()))
}

/// `$XDG_CACHE_HOME/rat-fetch/downloads` on Linux, the platform cache dir elsewhere.
fn downloads_under(cache_dir: &Path) -> PathBuf {
    cache_dir.join("rat-fetch").join("downloads")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_folder_lives_in_cache_dir() {
        let cache = Path::new("/var/cache/user");
        assert_eq!(
            downloads_under(cache),
            PathBuf::from("/var/cache/user/rat-fetch/downloads")
        );
        if let Some(dirs) = BaseDirs::new() {
            assert!(default_folder().unwrap().starts_with(dirs.cache_dir()));
        }
    }
}
