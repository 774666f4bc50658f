use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use flate2::Compression;
use flate2::write::GzEncoder;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::RatError;
use crate::fs_util;

pub const DCM2NIIX_ENV: &str = "RAT_FETCH_DCM2NIIX";
const DCM2NIIX: &str = "dcm2niix";

#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub dcm2niix: Option<String>,
    pub path: Option<String>,
}

pub trait DicomConverter: Send + Sync {
    /// Converts every DICOM series under `input_dir` and returns the volumes written
    /// into `output_dir`.
    fn convert(&self, input_dir: &Path, output_dir: &Path) -> Result<Vec<PathBuf>, RatError>;
    fn is_available(&self) -> bool;
}

#[derive(Debug, Clone)]
pub struct Dcm2niixConverter {
    binary: Option<PathBuf>,
    compress: bool,
}

impl Dcm2niixConverter {
    pub fn new(compress: bool) -> Self {
        Self {
            binary: locate_dcm2niix(),
            compress,
        }
    }

    pub fn with_binary(binary: Option<PathBuf>, compress: bool) -> Self {
        Self { binary, compress }
    }

    pub fn tool_info(&self) -> ToolInfo {
        ToolInfo {
            dcm2niix: self
                .binary
                .as_ref()
                .and_then(|path| tool_version(path, &["--version"])),
            path: self
                .binary
                .as_ref()
                .map(|path| path.to_string_lossy().to_string()),
        }
    }

    fn require_binary(&self) -> Result<&PathBuf, RatError> {
        self.binary
            .as_ref()
            .ok_or_else(|| RatError::MissingTool(DCM2NIIX.to_string()))
    }

    fn run_cmd(&self, program: &Path, args: &[String]) -> Result<(), RatError> {
        debug!(program = %program.display(), ?args, "running converter");
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|err| RatError::Conversion(err.to_string()))?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let message = if stderr.is_empty() {
            format!("command failed: {}", program.display())
        } else {
            stderr
        };
        Err(RatError::Conversion(message))
    }
}

impl DicomConverter for Dcm2niixConverter {
    fn convert(&self, input_dir: &Path, output_dir: &Path) -> Result<Vec<PathBuf>, RatError> {
        let binary = self.require_binary()?;
        fs::create_dir_all(output_dir).map_err(|err| RatError::Filesystem(err.to_string()))?;

        let args = vec![
            "-z".to_string(),
            "n".to_string(),
            "-f".to_string(),
            "%s_%p".to_string(),
            "-o".to_string(),
            output_dir.to_string_lossy().to_string(),
            input_dir.to_string_lossy().to_string(),
        ];
        self.run_cmd(binary, &args)?;

        let mut volumes = fs_util::find_files(output_dir, ".nii");
        if self.compress {
            volumes = volumes
                .iter()
                .map(|path| gzip_in_place(path))
                .collect::<Result<Vec<_>, _>>()?;
        }
        volumes.extend(fs_util::find_files(output_dir, ".nii.gz"));
        volumes.sort();
        volumes.dedup();

        if volumes.is_empty() {
            return Err(RatError::Conversion(format!(
                "no NIfTI volumes produced from {}",
                input_dir.display()
            )));
        }
        info!(count = volumes.len(), output = %output_dir.display(), "converted series");
        Ok(volumes)
    }

    fn is_available(&self) -> bool {
        self.binary.is_some()
    }
}

/// Whether the DICOM to NIfTI converter can be found in this environment.
pub fn have_dcm2niix() -> bool {
    locate_dcm2niix().is_some()
}

pub fn locate_dcm2niix() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os(DCM2NIIX_ENV).map(PathBuf::from) {
        if path.is_file() {
            return Some(path);
        }
    }
    find_in_path(DCM2NIIX)
}

/// Replaces `volume.nii` with `volume.nii.gz`.
pub fn gzip_in_place(path: &Path) -> Result<PathBuf, RatError> {
    let mut target = path.as_os_str().to_owned();
    target.push(".gz");
    let target = PathBuf::from(target);

    let mut input = fs::File::open(path).map_err(|err| RatError::Filesystem(err.to_string()))?;
    let output =
        fs::File::create(&target).map_err(|err| RatError::Filesystem(err.to_string()))?;
    let mut encoder = GzEncoder::new(output, Compression::default());
    io::copy(&mut input, &mut encoder).map_err(|err| RatError::Filesystem(err.to_string()))?;
    encoder
        .finish()
        .map_err(|err| RatError::Filesystem(err.to_string()))?;
    fs::remove_file(path).map_err(|err| RatError::Filesystem(err.to_string()))?;
    Ok(target)
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for path in std::env::split_paths(&path_var) {
        let exe = path.join(format!("{name}.exe"));
        if exe.is_file() {
            return Some(exe);
        }
        let plain = path.join(name);
        if plain.is_file() {
            return Some(plain);
        }
    }
    None
}

fn tool_version(path: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new(path).args(args).output().ok()?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    let line = stdout.lines().find(|line| !line.trim().is_empty())?;
    Some(line.trim().to_string())
}
