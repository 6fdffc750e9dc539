//! JSON report of a run, written next to the exported matches.

use crate::types::RunOptions;
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

pub const REPORT_FILE_NAME: &str = "matches.json";

/// One database image matched by a query.
#[derive(Debug, Clone, Serialize)]
pub struct MatchRecord {
    pub database_image: PathBuf,
    pub similarity: f32,
    /// Where the copy landed; `None` when the export failed.
    pub exported_as: Option<PathBuf>,
}

/// Matches found for one query image.
#[derive(Debug, Clone, Serialize)]
pub struct QueryReport {
    pub query_image: PathBuf,
    /// Set when the query could not be searched at all.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<String>,
    pub matches: Vec<MatchRecord>,
}

impl QueryReport {
    pub fn new(query_image: &Path) -> Self {
        Self {
            query_image: query_image.to_path_buf(),
            skipped: None,
            matches: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub collection: String,
    pub options: RunOptions,
    pub queries: Vec<QueryReport>,
}

impl RunReport {
    pub fn matches_found(&self) -> usize {
        self.queries.iter().map(|query| query.matches.len()).sum()
    }
}

/// Serialize `report` as pretty JSON to `path`.
pub fn write_report(report: &RunReport, path: &Path) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, report)?;
    writer.write_all(b"\n")?;
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_report_round_trips_as_json() {
        let dir = tempdir().unwrap();
        let mut query = QueryReport::new(Path::new("/q/query1.jpg"));
        query.matches.push(MatchRecord {
            database_image: PathBuf::from("/db/alice.jpg"),
            similarity: 99.5,
            exported_as: Some(dir.path().join("query1_alice.jpg")),
        });
        let mut unmatched = QueryReport::new(Path::new("/q/query2.jpg"));
        unmatched.skipped = Some("no face detected".into());

        let report = RunReport {
            collection: "faces".into(),
            options: RunOptions::STANDARD,
            queries: vec![query, unmatched],
        };
        assert_eq!(report.matches_found(), 1);

        let path = dir.path().join(REPORT_FILE_NAME);
        write_report(&report, &path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["collection"], "faces");
        assert_eq!(value["options"]["return_mode"], "best_only");
        assert_eq!(value["queries"][0]["matches"][0]["database_image"], "/db/alice.jpg");
        assert!(value["queries"][0].get("skipped").is_none());
        assert_eq!(value["queries"][1]["skipped"], "no face detected");
        assert_eq!(value["queries"][1]["matches"].as_array().unwrap().len(), 0);
    }
}
