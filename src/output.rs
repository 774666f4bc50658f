use std::io::{self, Write};

use serde::Serialize;

use crate::app::FetchResult;
use crate::convert::ToolInfo;
use crate::domain::{DatasetGroup, StudyId};

#[derive(Debug, Clone, Serialize)]
pub struct ListResult {
    pub studies: Vec<StudyId>,
    pub groups: Vec<GroupEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupEntry {
    pub name: DatasetGroup,
    pub studies: Vec<StudyId>,
}

impl ListResult {
    pub fn catalog() -> Self {
        Self {
            studies: StudyId::all(),
            groups: DatasetGroup::ALL
                .into_iter()
                .map(|group| GroupEntry {
                    name: group,
                    studies: group.studies(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProbeResult {
    pub host: String,
    pub online: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DoctorResult {
    pub record_id: String,
    pub zenodo_api: String,
    pub converter_available: bool,
    pub converter: ToolInfo,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_fetch(result: &FetchResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_list(result: &ListResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_probe(result: &ProbeResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_doctor(result: &DoctorResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}
