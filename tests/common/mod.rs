use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use zip::write::SimpleFileOptions;

use rat_fetch::app::App;
use rat_fetch::convert::DicomConverter;
use rat_fetch::error::RatError;
use rat_fetch::zenodo::{RecordFile, ZenodoClient};

pub const RECORD: &str = "000000";

/// Serves an in-memory zip of two DICOM slices for every study.
#[derive(Default)]
pub struct MockZenodo {
    pub downloads: Mutex<Vec<String>>,
    pub listings: Mutex<usize>,
    pub status: Option<u16>,
}

impl MockZenodo {
    pub fn failing(status: u16) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn download_count(&self) -> usize {
        self.downloads.lock().unwrap().len()
    }
}

impl ZenodoClient for MockZenodo {
    fn record_files(&self, _record_id: &str) -> Result<Vec<RecordFile>, RatError> {
        if let Some(status) = self.status {
            return Err(RatError::ZenodoStatus {
                status,
                message: "mock upstream".to_string(),
            });
        }
        *self.listings.lock().unwrap() += 1;
        Ok((1..=15)
            .map(|n| RecordFile {
                key: format!("S{n:02}_study.zip"),
                size: 0,
                url: format!("mock://S{n:02}"),
            })
            .collect())
    }

    fn download(&self, file: &RecordFile, destination: &Path) -> Result<u64, RatError> {
        self.downloads.lock().unwrap().push(file.key.clone());
        let code = file.key.split('_').next().unwrap_or("S00");
        write_study_zip(destination, code);
        Ok(fs::metadata(destination).unwrap().len())
    }
}

/// Writes one `.nii.gz` per series directory it finds.
#[derive(Default)]
pub struct MockConverter {
    pub produce_nothing: bool,
}

impl DicomConverter for MockConverter {
    fn convert(&self, input_dir: &Path, output_dir: &Path) -> Result<Vec<PathBuf>, RatError> {
        assert!(input_dir.is_dir(), "converter input must be extracted first");
        fs::create_dir_all(output_dir).unwrap();
        if self.produce_nothing {
            return Ok(Vec::new());
        }
        let volume = output_dir.join("series_1_T1.nii.gz");
        fs::write(&volume, b"\x1f\x8bmock").unwrap();
        Ok(vec![volume])
    }

    fn is_available(&self) -> bool {
        true
    }
}

pub fn write_study_zip(destination: &Path, code: &str) {
    fs::create_dir_all(destination.parent().unwrap()).unwrap();
    let file = fs::File::create(destination).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    for slice in 1..=2 {
        writer
            .start_file(
                format!("{code}/series_1/IM_{slice:04}.dcm"),
                SimpleFileOptions::default(),
            )
            .unwrap();
        writer.write_all(b"DICM mock slice").unwrap();
    }
    writer.finish().unwrap();
}

pub fn mock_app() -> App<MockZenodo, MockConverter> {
    App::new(RECORD, MockZenodo::default(), MockConverter::default())
}
