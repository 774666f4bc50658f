use std::fs;
use std::path::{Path, PathBuf};

use camino::Utf8PathBuf;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::{ConfigLoader, FetchConfig};
use crate::convert::{Dcm2niixConverter, DicomConverter};
use crate::domain::{Dataset, StudyId};
use crate::error::RatError;
use crate::fs_util;
use crate::layout::{Layout, write_bytes_atomic};
use crate::zenodo::{RecordFile, ZenodoClient, ZenodoHttpClient, find_study_file};

#[derive(Debug, Clone, Copy, Default)]
pub struct FetchOptions {
    pub unzip: bool,
    pub convert: bool,
    pub force: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveAction {
    Download,
    Cached,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudyResult {
    pub study: StudyId,
    pub action: ArchiveAction,
    pub archive: Utf8PathBuf,
    pub bytes: u64,
    pub extract_dir: Option<Utf8PathBuf>,
    pub dicom_files: usize,
    pub nifti_dir: Option<Utf8PathBuf>,
    pub nifti_files: usize,
}

impl StudyResult {
    fn paths(&self) -> impl Iterator<Item = &Utf8PathBuf> {
        std::iter::once(&self.archive)
            .chain(self.extract_dir.as_ref())
            .chain(self.nifti_dir.as_ref())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchResult {
    pub dataset: String,
    pub record_id: String,
    pub download_root: Utf8PathBuf,
    pub nifti_root: Option<Utf8PathBuf>,
    pub items: Vec<StudyResult>,
}

impl FetchResult {
    /// Archive, extraction folder and NIfTI folder of every study, in study order.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.items
            .iter()
            .flat_map(|item| item.paths())
            .map(|path| path.as_std_path().to_path_buf())
            .collect()
    }
}

#[derive(Debug, Serialize)]
struct FetchManifest<'a> {
    tool: String,
    fetched_at: String,
    #[serde(flatten)]
    result: &'a FetchResult,
}

#[derive(Clone)]
pub struct App<Z: ZenodoClient, C: DicomConverter> {
    record_id: String,
    zenodo: Z,
    converter: C,
}

impl<Z: ZenodoClient, C: DicomConverter> App<Z, C> {
    pub fn new(record_id: impl Into<String>, zenodo: Z, converter: C) -> Self {
        Self {
            record_id: record_id.into(),
            zenodo,
            converter,
        }
    }

    pub fn zenodo(&self) -> &Z {
        &self.zenodo
    }

    pub fn converter(&self) -> &C {
        &self.converter
    }

    pub fn fetch(
        &self,
        dataset: Dataset,
        folder: &Path,
        options: FetchOptions,
    ) -> Result<FetchResult, RatError> {
        let mut options = options;
        if options.convert && !options.unzip {
            info!("conversion requested, enabling unzip");
            options.unzip = true;
        }

        let layout = Layout::from_path(folder)?;
        layout.ensure_download_root()?;
        info!(%dataset, folder = %layout.download_root(), "fetching dataset");

        let mut record_files: Option<Vec<RecordFile>> = None;
        let mut items = Vec::new();
        for study in dataset.studies() {
            items.push(self.fetch_study(study, &layout, options, &mut record_files)?);
        }

        let result = FetchResult {
            dataset: dataset.to_string(),
            record_id: self.record_id.clone(),
            download_root: layout.download_root().to_path_buf(),
            nifti_root: options
                .convert
                .then(|| layout.nifti_root().to_path_buf()),
            items,
        };
        write_manifest(&layout, &result)?;
        Ok(result)
    }

    fn fetch_study(
        &self,
        study: StudyId,
        layout: &Layout,
        options: FetchOptions,
        record_files: &mut Option<Vec<RecordFile>>,
    ) -> Result<StudyResult, RatError> {
        let archive = layout.archive_path(&study);
        let (action, bytes) = match self.cached_archive(&archive, options.force) {
            Some(bytes) => {
                info!(%study, "using archive already on disk");
                (ArchiveAction::Cached, bytes)
            }
            None => {
                if record_files.is_none() {
                    *record_files = Some(self.zenodo.record_files(&self.record_id)?);
                }
                let files = record_files.as_deref().unwrap_or_default();
                let file = find_study_file(files, &study, &self.record_id)?;
                let bytes = self.zenodo.download(file, archive.as_std_path())?;
                (ArchiveAction::Download, bytes)
            }
        };

        let mut result = StudyResult {
            study,
            action,
            archive: archive.clone(),
            bytes,
            extract_dir: None,
            dicom_files: 0,
            nifti_dir: None,
            nifti_files: 0,
        };

        if options.unzip {
            let extract_dir = layout.extract_dir(&study);
            let existing = fs_util::find_files(extract_dir.as_std_path(), ".dcm");
            result.dicom_files = if !options.force && !existing.is_empty() {
                info!(%study, "archive already extracted");
                existing.len()
            } else {
                fs_util::validate_zip(archive.as_std_path())?;
                fs_util::extract_zip(archive.as_std_path(), extract_dir.as_std_path())?;
                fs_util::find_files(extract_dir.as_std_path(), ".dcm").len()
            };
            if result.dicom_files == 0 {
                warn!(%study, "no DICOM files found after extraction");
            }
            result.extract_dir = Some(extract_dir);
        }

        if options.convert {
            let extract_dir = layout.extract_dir(&study);
            let nifti_dir = layout.nifti_dir(&study);
            let existing = existing_volumes(nifti_dir.as_std_path());
            result.nifti_files = if !options.force && !existing.is_empty() {
                info!(%study, "NIfTI volumes already present");
                existing.len()
            } else {
                self.converter
                    .convert(extract_dir.as_std_path(), nifti_dir.as_std_path())?
                    .len()
            };
            result.nifti_dir = Some(nifti_dir);
        }

        Ok(result)
    }

    fn cached_archive(&self, archive: &Utf8PathBuf, force: bool) -> Option<u64> {
        if force || !archive.as_std_path().is_file() {
            return None;
        }
        match fs_util::validate_zip(archive.as_std_path()) {
            Ok(()) => fs::metadata(archive.as_std_path()).ok().map(|meta| meta.len()),
            Err(err) => {
                warn!(%archive, error = %err, "discarding corrupt archive");
                None
            }
        }
    }
}

impl App<ZenodoHttpClient, Dcm2niixConverter> {
    pub fn from_config(config: &FetchConfig) -> Result<Self, RatError> {
        Ok(Self::new(
            config.record_id.clone(),
            ZenodoHttpClient::new(config)?,
            Dcm2niixConverter::new(config.compress_nifti),
        ))
    }
}

/// Downloads `dataset` into `folder`, optionally unzipping and converting it to NIfTI.
///
/// `dataset` is a study code (`S01`..`S15`), one of the group names or `all`.
/// NIfTI volumes are written to the sibling folder `<folder>_nifti`. Returns the
/// archive, extraction and NIfTI paths of every study.
pub fn rat_fetch(
    dataset: &str,
    folder: impl AsRef<Path>,
    unzip: bool,
    convert: bool,
) -> Result<Vec<PathBuf>, RatError> {
    let dataset: Dataset = dataset.parse()?;
    let config = ConfigLoader::resolve(None)?;
    let app = App::from_config(&config)?;
    let options = FetchOptions {
        unzip,
        convert,
        force: false,
    };
    Ok(app.fetch(dataset, folder.as_ref(), options)?.paths())
}

fn existing_volumes(dir: &Path) -> Vec<PathBuf> {
    let mut volumes = fs_util::find_files(dir, ".nii");
    volumes.extend(fs_util::find_files(dir, ".nii.gz"));
    volumes
}

fn write_manifest(layout: &Layout, result: &FetchResult) -> Result<(), RatError> {
    let manifest = FetchManifest {
        tool: format!("rat-fetch/{}", env!("CARGO_PKG_VERSION")),
        fetched_at: chrono::Utc::now().to_rfc3339(),
        result,
    };
    let bytes = serde_json::to_vec_pretty(&manifest)
        .map_err(|err| RatError::Filesystem(err.to_string()))?;
    write_bytes_atomic(&layout.manifest_path(), &bytes)
}
