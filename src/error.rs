use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum RatError {
    #[error("invalid dataset: {0} (expected S01..S15, a group name or `all`)")]
    InvalidDataset(String),

    #[error("study {study} not found in Zenodo record {record}")]
    #[diagnostic(help("set RAT_FETCH_RECORD or `record_id` in rat-fetch.json to the dataset's record"))]
    StudyNotInRecord { study: String, record: String },

    #[error("Zenodo request failed: {0}")]
    ZenodoHttp(String),

    #[error("Zenodo returned status {status}: {message}")]
    ZenodoStatus { status: u16, message: String },

    #[error("download of {file} is incomplete: expected {expected} bytes, got {actual}")]
    IncompleteDownload {
        file: String,
        expected: u64,
        actual: u64,
    },

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid config value for {key}: {value}")]
    ConfigValue { key: String, value: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("archive error: {0}")]
    Archive(String),

    #[error("required tool not found: {0}")]
    #[diagnostic(help("install dcm2niix or point RAT_FETCH_DCM2NIIX at the binary"))]
    MissingTool(String),

    #[error("dicom to nifti conversion failed: {0}")]
    Conversion(String),
}

impl RatError {
    /// Upstream failures that are expected to clear up on a later run.
    pub fn is_transient(&self) -> bool {
        match self {
            RatError::ZenodoStatus { status, .. } => matches!(status, 502 | 503 | 504),
            RatError::ZenodoHttp(message) => message.contains("ConnectionError"),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_study_points_at_record_override() {
        let err = RatError::StudyNotInRecord {
            study: "S01".to_string(),
            record: "1".to_string(),
        };
        let help = err.help().map(|help| help.to_string()).unwrap_or_default();
        assert!(help.contains("RAT_FETCH_RECORD"));
        assert!(!err.is_transient());
    }

    #[test]
    fn gateway_statuses_are_transient() {
        for status in [502, 503, 504] {
            let err = RatError::ZenodoStatus {
                status,
                message: "upstream".to_string(),
            };
            assert!(err.is_transient());
        }
        let err = RatError::ZenodoStatus {
            status: 404,
            message: "not found".to_string(),
        };
        assert!(!err.is_transient());
    }

    #[test]
    fn status_is_embedded_in_message() {
        let err = RatError::ZenodoStatus {
            status: 503,
            message: "Service Unavailable".to_string(),
        };
        assert!(err.to_string().contains("503"));
    }

    #[test]
    fn invalid_dataset_is_fatal() {
        assert!(!RatError::InvalidDataset("S99".to_string()).is_transient());
    }
}
