use std::fs;
use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};

use crate::domain::StudyId;
use crate::error::RatError;

pub const NIFTI_SUFFIX: &str = "_nifti";
pub const MANIFEST_FILE: &str = "rat_fetch.json";

/// Path rules for one download folder and its `_nifti` sibling.
#[derive(Debug, Clone)]
pub struct Layout {
    download_root: Utf8PathBuf,
    nifti_root: Utf8PathBuf,
}

impl Layout {
    pub fn new(download_root: Utf8PathBuf) -> Self {
        let nifti_root = nifti_root_for(&download_root);
        Self {
            download_root,
            nifti_root,
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, RatError> {
        let root = Utf8PathBuf::from_path_buf(path.to_path_buf()).map_err(|path| {
            RatError::Filesystem(format!("non-utf8 download folder: {}", path.display()))
        })?;
        Ok(Self::new(root))
    }

    pub fn download_root(&self) -> &Utf8Path {
        &self.download_root
    }

    pub fn nifti_root(&self) -> &Utf8Path {
        &self.nifti_root
    }

    pub fn archive_path(&self, study: &StudyId) -> Utf8PathBuf {
        self.download_root.join(format!("{study}.zip"))
    }

    pub fn extract_dir(&self, study: &StudyId) -> Utf8PathBuf {
        self.download_root.join(study.code())
    }

    pub fn nifti_dir(&self, study: &StudyId) -> Utf8PathBuf {
        self.nifti_root.join(study.code())
    }

    pub fn manifest_path(&self) -> Utf8PathBuf {
        self.download_root.join(MANIFEST_FILE)
    }

    pub fn ensure_download_root(&self) -> Result<(), RatError> {
        fs::create_dir_all(self.download_root.as_std_path())
            .map_err(|err| RatError::Filesystem(err.to_string()))
    }
}

/// `<parent>/<name>_nifti` for a download folder `<parent>/<name>`.
pub fn nifti_root_for(download_root: &Utf8Path) -> Utf8PathBuf {
    let name = download_root.file_name().unwrap_or("downloads");
    let sibling = format!("{name}{NIFTI_SUFFIX}");
    match download_root.parent() {
        Some(parent) => parent.join(sibling),
        None => Utf8PathBuf::from(sibling),
    }
}

pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), RatError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| RatError::Filesystem(err.to_string()))?;
    }
    let tmp_path = path.with_extension("tmp");
    fs::write(tmp_path.as_std_path(), content)
        .map_err(|err| RatError::Filesystem(err.to_string()))?;
    fs::rename(tmp_path.as_std_path(), path.as_std_path())
        .map_err(|err| RatError::Filesystem(err.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths() {
        let layout = Layout::new(Utf8PathBuf::from("/tmp/run/downloads"));
        let id: StudyId = "S04".parse().unwrap();

        assert_eq!(layout.archive_path(&id).as_str(), "/tmp/run/downloads/S04.zip");
        assert_eq!(layout.extract_dir(&id).as_str(), "/tmp/run/downloads/S04");
        assert_eq!(layout.nifti_root().as_str(), "/tmp/run/downloads_nifti");
        assert_eq!(layout.nifti_dir(&id).as_str(), "/tmp/run/downloads_nifti/S04");
        assert!(layout.manifest_path().ends_with(MANIFEST_FILE));
    }

    #[test]
    fn nifti_root_for_relative_folder() {
        assert_eq!(nifti_root_for(Utf8Path::new("rat_data")).as_str(), "rat_data_nifti");
    }
}
