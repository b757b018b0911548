//! Staged Data Bus
//!
//! Named CSV artifacts that hand data from one cycle stage to the next:
//!
//! ```text
//! input_data.csv ──► scaled_data.csv ──► intermediate_features.csv
//!   (ingestion)      (forward prep)       (forward predictions)
//!                                               │
//! desired_values.csv ──► scaled_reverse_data.csv ──► recommendation.csv
//!   (operators, append)   (reverse prep)             (inverse predictions)
//! ```
//!
//! Every stage except `DesiredValues` is replaced atomically: the table is
//! rendered in full, written to a temp file in the same directory, synced,
//! then renamed over the target. A concurrent reader sees either the old
//! artifact or the new one, never a prefix.

mod table;

pub use table::Table;

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::error::PipelineError;
use crate::types::FeatureMatrix;

/// A named slot on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Raw sensor snapshot from the ingestion collaborator.
    RawInput,
    /// Forward-preprocessed feature rows.
    ScaledFeatures,
    /// Current-row forward predictions (quality targets).
    IntermediateFeatures,
    /// Reverse-preprocessed quality rows for the inverse models.
    ScaledReverse,
    /// Inverse pipeline output, one row per window row.
    Recommendation,
    /// Operator-submitted quality targets. Append-only.
    DesiredValues,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::RawInput,
        Stage::ScaledFeatures,
        Stage::IntermediateFeatures,
        Stage::ScaledReverse,
        Stage::Recommendation,
        Stage::DesiredValues,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            Stage::RawInput => "input_data.csv",
            Stage::ScaledFeatures => "scaled_data.csv",
            Stage::IntermediateFeatures => "intermediate_features.csv",
            Stage::ScaledReverse => "scaled_reverse_data.csv",
            Stage::Recommendation => "recommendation.csv",
            Stage::DesiredValues => "desired_values.csv",
        }
    }

    pub fn is_append_only(self) -> bool {
        matches!(self, Stage::DesiredValues)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

/// File-backed bus rooted at the staging directory.
#[derive(Debug)]
pub struct StagedBus {
    dir: PathBuf,
    append_lock: Mutex<()>,
}

impl StagedBus {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            append_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, stage: Stage) -> PathBuf {
        self.dir.join(stage.file_name())
    }

    pub fn exists(&self, stage: Stage) -> bool {
        self.path(stage).is_file()
    }

    /// Read a stage. A missing file means the producer has not run yet.
    pub fn read(&self, stage: Stage) -> Result<Table, PipelineError> {
        let text = read_artifact(&self.path(stage), stage)?;
        Table::parse(stage.file_name(), &text)
    }

    /// Read a stage as an all-numeric matrix.
    pub fn read_matrix(&self, stage: Stage) -> Result<FeatureMatrix, PipelineError> {
        self.read(stage)?.to_matrix(stage.file_name())
    }

    /// Replace a stage atomically.
    pub fn write(&self, stage: Stage, table: &Table) -> Result<(), PipelineError> {
        self.write_text(stage, &table.to_csv())
    }

    /// Replace a stage with already-rendered CSV text, validating it first.
    pub fn write_text(&self, stage: Stage, text: &str) -> Result<(), PipelineError> {
        if stage.is_append_only() {
            return Err(PipelineError::Storage(format!(
                "{stage} is append-only and cannot be replaced"
            )));
        }
        Table::parse(stage.file_name(), text)?;
        write_atomic(&self.path(stage), text.as_bytes())?;
        tracing::debug!(stage = %stage, bytes = text.len(), "Staged artifact replaced");
        Ok(())
    }

    /// Append one row to an append-only stage, writing the header when the
    /// file is new. A header that differs from the existing file is refused.
    pub fn append(&self, stage: Stage, headers: &[String], row: &[f64]) -> Result<(), PipelineError> {
        if !stage.is_append_only() {
            return Err(PipelineError::Storage(format!(
                "{stage} is replace-only; use write()"
            )));
        }
        if headers.len() != row.len() {
            return Err(PipelineError::Malformed {
                artifact: stage.file_name().to_string(),
                reason: format!("{} headers for {} values", headers.len(), row.len()),
            });
        }

        let _guard = self
            .append_lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let path = self.path(stage);
        fs::create_dir_all(&self.dir).map_err(|e| PipelineError::io(&self.dir, e))?;

        let existing_header = existing_header(&path)?;
        let mut line = String::new();
        match existing_header {
            None => {
                let mut header = Table::new(headers.to_vec());
                header.push_numeric_row(row)?;
                line.push_str(&header.to_csv());
            }
            Some(found) if found == headers => {
                let mut body = Table::new(headers.to_vec());
                body.push_numeric_row(row)?;
                let csv = body.to_csv();
                // Drop the rendered header, keep the data line.
                line.push_str(csv.split_once('\n').map_or("", |(_, rest)| rest));
            }
            Some(found) => {
                return Err(PipelineError::Malformed {
                    artifact: stage.file_name().to_string(),
                    reason: format!("existing header {found:?} does not match {headers:?}"),
                });
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| PipelineError::io(&path, e))?;
        file.write_all(line.as_bytes())
            .and_then(|()| file.sync_data())
            .map_err(|e| PipelineError::io(&path, e))?;
        Ok(())
    }
}

fn read_artifact(path: &Path, stage: Stage) -> Result<String, PipelineError> {
    match fs::File::open(path) {
        Ok(mut f) => {
            let mut text = String::new();
            f.read_to_string(&mut text)
                .map_err(|e| PipelineError::io(path, e))?;
            Ok(text)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Err(PipelineError::UpstreamNotReady(stage)),
        Err(e) => Err(PipelineError::io(path, e)),
    }
}

/// Header of an existing, non-empty file; `None` if absent or empty.
fn existing_header(path: &Path) -> Result<Option<Vec<String>>, PipelineError> {
    let text = match fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(PipelineError::io(path, e)),
    };
    if text.trim().is_empty() {
        return Ok(None);
    }
    let table = Table::parse(&path.display().to_string(), &text)?;
    Ok(Some(table.headers().to_vec()))
}

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Write `bytes` to `path` atomically (write temp file, then rename).
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PipelineError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = parent.join(format!(
        ".{}.{}.{}.tmp",
        file_name,
        std::process::id(),
        TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));

    let result = (|| -> std::io::Result<()> {
        let mut tmp = fs::File::create(&tmp_path)?;
        tmp.write_all(bytes)?;
        tmp.sync_all()?;
        fs::rename(&tmp_path, path)
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp_path);
        return Err(PipelineError::io(path, e));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    fn headers() -> Vec<String> {
        vec!["Elongation".into(), "UTS".into(), "Conductivity".into()]
    }

    #[test]
    fn test_missing_stage_is_upstream_not_ready() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let bus = StagedBus::new(dir.path());
        match bus.read(Stage::ScaledFeatures) {
            Err(PipelineError::UpstreamNotReady(stage)) => assert_eq!(stage, Stage::ScaledFeatures),
            other => panic!("expected UpstreamNotReady, got {other:?}"),
        }
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let bus = StagedBus::new(dir.path().join("staging"));
        let mut t = Table::new(headers());
        t.push_numeric_row(&[12.3, 210.5, 58.9]).unwrap();
        bus.write(Stage::IntermediateFeatures, &t).unwrap();

        let m = bus.read_matrix(Stage::IntermediateFeatures).unwrap();
        assert_eq!(m.rows()[0], vec![12.3, 210.5, 58.9]);

        // No temp files left behind
        let leftovers: Vec<_> = fs::read_dir(bus.dir())
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_write_rejects_invalid_text_and_keeps_previous() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let bus = StagedBus::new(dir.path());
        bus.write_text(Stage::RawInput, "a,b\n1,2\n").unwrap();
        assert!(bus.write_text(Stage::RawInput, "a,b\n1\n").is_err());
        assert_eq!(bus.read(Stage::RawInput).unwrap().len(), 1);
    }

    #[test]
    fn test_desired_values_is_append_only() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let bus = StagedBus::new(dir.path());
        let t = Table::new(headers());
        assert!(bus.write(Stage::DesiredValues, &t).is_err());
        assert!(bus.append(Stage::RawInput, &headers(), &[1.0, 2.0, 3.0]).is_err());
    }

    #[test]
    fn test_append_writes_header_once() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let bus = StagedBus::new(dir.path());
        bus.append(Stage::DesiredValues, &headers(), &[12.0, 11.0, 61.3]).unwrap();
        bus.append(Stage::DesiredValues, &headers(), &[12.5, 11.2, 61.4]).unwrap();

        let text = fs::read_to_string(bus.path(Stage::DesiredValues)).unwrap();
        assert_eq!(text.matches("Elongation").count(), 1);
        let t = bus.read(Stage::DesiredValues).unwrap();
        assert_eq!(t.len(), 2);
        assert_eq!(t.rows()[1][0], "12.5");
    }

    #[test]
    fn test_append_refuses_header_mismatch() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let bus = StagedBus::new(dir.path());
        bus.append(Stage::DesiredValues, &headers(), &[12.0, 11.0, 61.3]).unwrap();
        let other = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        assert!(matches!(
            bus.append(Stage::DesiredValues, &other, &[1.0, 2.0, 3.0]),
            Err(PipelineError::Malformed { .. })
        ));
    }

    #[test]
    fn test_reader_never_observes_partial_artifact() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let bus = Arc::new(StagedBus::new(dir.path()));

        let build = |v: f64| {
            let mut t = Table::new(vec!["a".into(), "b".into()]);
            for _ in 0..500 {
                t.push_numeric_row(&[v, v + 0.5]).unwrap();
            }
            t
        };
        bus.write(Stage::ScaledFeatures, &build(0.0)).unwrap();

        let done = Arc::new(AtomicBool::new(false));
        let writer = {
            let bus = Arc::clone(&bus);
            let done = Arc::clone(&done);
            std::thread::spawn(move || {
                for i in 1..100 {
                    bus.write(Stage::ScaledFeatures, &build(f64::from(i))).unwrap();
                }
                done.store(true, Ordering::SeqCst);
            })
        };

        while !done.load(Ordering::SeqCst) {
            let m = bus.read_matrix(Stage::ScaledFeatures).unwrap();
            assert_eq!(m.len(), 500, "reader observed a partial artifact");
            let first = m.rows()[0][0];
            assert!(m.rows().iter().all(|r| r[0] == first));
        }
        writer.join().unwrap();
    }
}
