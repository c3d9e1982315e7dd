use crate::snapshot::SystemSnapshot;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct Destination {
    pub dir: PathBuf,
    pub data_file: String,
    pub report_file: String,
}

impl Destination {
    pub fn data_path(&self) -> PathBuf {
        self.dir.join(&self.data_file)
    }

    pub fn report_path(&self) -> PathBuf {
        self.dir.join(&self.report_file)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedFiles {
    pub data: PathBuf,
    pub report: PathBuf,
}

#[derive(Debug)]
pub struct ArtifactFailure {
    pub path: PathBuf,
    pub source: std::io::Error,
}

impl fmt::Display for ArtifactFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.source)
    }
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("could not create output directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("could not write {}", join_failures(.0))]
    Artifacts(Vec<ArtifactFailure>),
}

fn join_failures(failures: &[ArtifactFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Writes the JSON snapshot and the text report. Each file is attempted even
/// if the other fails; there is no rollback.
pub fn persist(
    snapshot: &SystemSnapshot,
    report: &str,
    destination: &Destination,
) -> Result<PersistedFiles, PersistError> {
    fs::create_dir_all(&destination.dir).map_err(|source| PersistError::CreateDir {
        path: destination.dir.clone(),
        source,
    })?;

    let data = serde_json::to_vec_pretty(snapshot)?;
    let files = PersistedFiles {
        data: destination.data_path(),
        report: destination.report_path(),
    };

    let failures: Vec<ArtifactFailure> = [
        write_artifact(&files.data, &data),
        write_artifact(&files.report, report.as_bytes()),
    ]
    .into_iter()
    .filter_map(Result::err)
    .collect();

    if failures.is_empty() {
        Ok(files)
    } else {
        Err(PersistError::Artifacts(failures))
    }
}

fn write_artifact(path: &Path, contents: &[u8]) -> Result<(), ArtifactFailure> {
    match fs::write(path, contents) {
        Ok(()) => {
            debug!(path = %path.display(), bytes = contents.len(), "artifact written");
            Ok(())
        }
        Err(source) => {
            warn!(path = %path.display(), error = %source, "artifact write failed");
            Err(ArtifactFailure {
                path: path.to_path_buf(),
                source,
            })
        }
    }
}
