//! Conformance harness for the fetch pipeline.
//!
//! A scenario is one (dataset, unzip, convert) combination. Each run gets its own
//! temporary directory, upstream hiccups are turned into skips and everything else
//! is checked against the on-disk layout the pipeline promises.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::convert::have_dcm2niix;
use crate::error::RatError;
use crate::fs_util;
use crate::layout::NIFTI_SUFFIX;

pub const DOWNLOAD_DIR: &str = "downloads";
pub const SKIP_SLOW_ENV: &str = "RAT_FETCH_SKIP_SLOW";

/// Substrings that mark an upstream failure as transient.
pub const TRANSIENT_MARKERS: [&str; 4] = ["502", "503", "504", "ConnectionError"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipCondition {
    ConverterMissing,
    SlowTier,
}

impl SkipCondition {
    pub fn holds(&self, env: &Environment) -> bool {
        match self {
            SkipCondition::ConverterMissing => !env.converter_available,
            SkipCondition::SlowTier => !env.include_slow,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            SkipCondition::ConverterMissing => "dcm2niix not installed, skipping conversion test",
            SkipCondition::SlowTier => "slow scenario excluded by RAT_FETCH_SKIP_SLOW",
        }
    }
}

/// What the current runner can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Environment {
    pub converter_available: bool,
    pub include_slow: bool,
}

impl Environment {
    pub fn detect() -> Self {
        Self::from_lookup(have_dcm2niix(), |key| std::env::var(key).ok())
    }

    /// Slow scenarios run unless `RAT_FETCH_SKIP_SLOW` is set to a truthy value.
    pub fn from_lookup<F>(converter_available: bool, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let skip_slow = lookup(SKIP_SLOW_ENV)
            .map(|value| matches!(value.trim(), "1" | "true" | "yes"))
            .unwrap_or(false);
        Self {
            converter_available,
            include_slow: !skip_slow,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scenario {
    pub name: &'static str,
    pub dataset: &'static str,
    pub unzip: bool,
    pub convert: bool,
    pub skip_if: &'static [SkipCondition],
}

pub static SCENARIOS: [Scenario; 6] = [
    Scenario {
        name: "S01-download_only",
        dataset: "S01",
        unzip: false,
        convert: false,
        skip_if: &[],
    },
    Scenario {
        name: "S01-unzip+convert",
        dataset: "S01",
        unzip: true,
        convert: true,
        skip_if: &[SkipCondition::ConverterMissing],
    },
    Scenario {
        name: "group-rifampicin_effect_size-unzip_only",
        dataset: "rifampicin_effect_size",
        unzip: true,
        convert: false,
        skip_if: &[SkipCondition::SlowTier],
    },
    Scenario {
        name: "group-six_compound-unzip+convert",
        dataset: "six_compound",
        unzip: true,
        convert: true,
        skip_if: &[SkipCondition::SlowTier, SkipCondition::ConverterMissing],
    },
    Scenario {
        name: "group-field_strength-unzip_only",
        dataset: "field_strength",
        unzip: true,
        convert: false,
        skip_if: &[SkipCondition::SlowTier],
    },
    Scenario {
        name: "group-chronic-unzip+convert",
        dataset: "chronic",
        unzip: true,
        convert: true,
        skip_if: &[SkipCondition::SlowTier, SkipCondition::ConverterMissing],
    },
];

impl Scenario {
    pub fn find(name: &str) -> Option<&'static Scenario> {
        SCENARIOS.iter().find(|scenario| scenario.name == name)
    }

    /// Every condition that holds; the scenario is skipped when this is non-empty.
    pub fn skip_reasons(&self, env: &Environment) -> Vec<&'static str> {
        self.skip_if
            .iter()
            .filter(|condition| condition.holds(env))
            .map(SkipCondition::reason)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Passed { returned: Vec<PathBuf> },
    Skipped { reason: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct LayoutViolation(pub String);

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] RatError),

    #[error("layout check failed: {0}")]
    Layout(#[from] LayoutViolation),

    #[error("could not prepare scenario directory: {0}")]
    Setup(String),
}

pub fn is_transient_message(message: &str) -> bool {
    TRANSIENT_MARKERS.iter().any(|marker| message.contains(marker))
        || message.to_ascii_lowercase().contains("connection error")
}

/// Transient errors become a skip reason, anything else is handed back as a failure.
pub fn classify(err: RatError) -> Result<String, RatError> {
    if err.is_transient() || is_transient_message(&err.to_string()) {
        return Ok(format!("Zenodo transient error ({err}); skipping."));
    }
    Err(err)
}

pub fn assert_layout(
    download_dir: &Path,
    returned: &[PathBuf],
    unzip: bool,
    convert: bool,
) -> Result<(), LayoutViolation> {
    if !download_dir.is_dir() {
        return Err(LayoutViolation("Download folder was not created".to_string()));
    }
    if fs_util::list_files(download_dir, ".zip").is_empty() {
        return Err(LayoutViolation("No ZIP files downloaded".to_string()));
    }

    if returned.is_empty() {
        return Err(LayoutViolation(
            "Function returned an empty list of paths".to_string(),
        ));
    }
    if let Some(missing) = returned.iter().find(|path| !path.exists()) {
        return Err(LayoutViolation(format!(
            "Returned path {} does not exist",
            missing.display()
        )));
    }

    if unzip && !fs_util::contains_file(download_dir, ".dcm") {
        return Err(LayoutViolation("No DICOMs found after unzip".to_string()));
    }

    if convert {
        let nifti_root = nifti_root(download_dir);
        let found = fs_util::contains_file(&nifti_root, ".nii")
            || fs_util::contains_file(&nifti_root, ".nii.gz");
        if !found {
            return Err(LayoutViolation("No NIfTI files produced".to_string()));
        }
    }
    Ok(())
}

pub fn nifti_root(download_dir: &Path) -> PathBuf {
    let name = download_dir
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| DOWNLOAD_DIR.to_string());
    let sibling = format!("{name}{NIFTI_SUFFIX}");
    match download_dir.parent() {
        Some(parent) => parent.join(sibling),
        None => PathBuf::from(sibling),
    }
}

/// Runs one scenario against `fetch` in a fresh temporary directory.
pub fn run_scenario<F>(
    scenario: &Scenario,
    env: &Environment,
    fetch: F,
) -> Result<Outcome, HarnessError>
where
    F: FnOnce(&str, &Path, bool, bool) -> Result<Vec<PathBuf>, RatError>,
{
    let reasons = scenario.skip_reasons(env);
    if !reasons.is_empty() {
        return Ok(Outcome::Skipped {
            reason: reasons.join("; "),
        });
    }

    let root = tempfile::Builder::new()
        .prefix("rat-fetch-scenario")
        .tempdir()
        .map_err(|err| HarnessError::Setup(err.to_string()))?;
    let download_dir = root.path().join(DOWNLOAD_DIR);

    let returned = match fetch(
        scenario.dataset,
        &download_dir,
        scenario.unzip,
        scenario.convert,
    ) {
        Ok(paths) => paths,
        Err(err) => {
            let reason = classify(err)?;
            return Ok(Outcome::Skipped { reason });
        }
    };

    assert_layout(&download_dir, &returned, scenario.unzip, scenario.convert)?;
    Ok(Outcome::Passed { returned })
}
