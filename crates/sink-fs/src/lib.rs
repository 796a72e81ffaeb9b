//! File-backed implementation of the vantage persistence contract.
//!
//! Registrations and reports are append-only logs of length-prefixed CBOR
//! records; inferences are whole-file writes per subject. All writes go
//! through `tokio::fs`.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;
use tokio::io::{self, AsyncWriteExt};

use vantage_sink::{Error, Result, Sink};
use vantage_types::{Inference, Registration, Report};

const REGISTRATIONS_LOG: &str = "registrations.log";
const REPORTS_LOG: &str = "reports.log";
const INFERENCE_DIR: &str = "inference";

/// A directory-backed sink. The directory is created on `open`.
///
/// Subject names double as inference file names, so they must be valid
/// path components.
#[derive(Clone, Debug)]
pub struct FsSink {
    dir: PathBuf,
}

impl FsSink {
    /// Create a sink rooted at `dir`. No I/O happens until `open`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn log_path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    fn inference_path(&self, subject: &str) -> PathBuf {
        self.dir.join(INFERENCE_DIR).join(subject)
    }

    async fn append_record<T: Serialize>(&self, log: &str, record: &T) -> Result<()> {
        let payload = encode(record)?;
        let len = u32::try_from(payload.len())
            .map_err(|_| Error::Encode("record too large".to_string()))?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path(log))
            .await?;
        file.write_all(&len.to_be_bytes()).await?;
        file.write_all(&payload).await?;
        file.flush().await?;
        Ok(())
    }

    async fn read_records<T: DeserializeOwned>(&self, log: &str) -> Result<Vec<T>> {
        let raw = match fs::read(self.log_path(log)).await {
            Ok(raw) => raw,
            Err(ref e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::Io(e)),
        };
        let mut records = Vec::new();
        let mut cursor = 0usize;
        while cursor + 4 <= raw.len() {
            let len = u32::from_be_bytes([
                raw[cursor],
                raw[cursor + 1],
                raw[cursor + 2],
                raw[cursor + 3],
            ]) as usize;
            cursor += 4;
            if cursor + len > raw.len() {
                // Torn tail from an interrupted write; keep what we have.
                break;
            }
            records.push(decode(&raw[cursor..cursor + len])?);
            cursor += len;
        }
        Ok(records)
    }

    /// Replay the report log. Not part of the sink contract; used by
    /// tooling and tests.
    pub async fn read_reports(&self) -> Result<Vec<Report>> {
        self.read_records(REPORTS_LOG).await
    }

    /// Read back the persisted inference for a subject, if any. Not part
    /// of the sink contract; used by tooling and tests.
    pub async fn read_inference(&self, subject: &str) -> Result<Option<Inference>> {
        match fs::read(self.inference_path(subject)).await {
            Ok(raw) => Ok(Some(decode(&raw)?)),
            Err(ref e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Io(e)),
        }
    }
}

#[async_trait]
impl Sink for FsSink {
    async fn open(&self) -> Result<()> {
        fs::create_dir_all(self.dir.join(INFERENCE_DIR)).await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        // Appends are flushed per record; nothing is held open.
        Ok(())
    }

    async fn insert_registration(&self, registration: &Registration) -> Result<()> {
        self.append_record(REGISTRATIONS_LOG, registration).await
    }

    async fn read_registrations(&self) -> Result<HashMap<u64, Registration>> {
        let records: Vec<Registration> = self.read_records(REGISTRATIONS_LOG).await?;
        let mut registrations = HashMap::new();
        for registration in records {
            registrations.insert(registration.handle, registration);
        }
        Ok(registrations)
    }

    async fn append_report(&self, report: &Report) -> Result<()> {
        self.append_record(REPORTS_LOG, report).await
    }

    async fn write_inference(&self, inference: &Inference) -> Result<()> {
        let payload = encode(inference)?;
        let mut file = fs::File::create(self.inference_path(&inference.subject)).await?;
        file.write_all(&payload).await?;
        file.flush().await?;
        Ok(())
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut payload = Vec::new();
    ciborium::ser::into_writer(value, &mut payload).map_err(|e| Error::Encode(e.to_string()))?;
    Ok(payload)
}

fn decode<T: DeserializeOwned>(raw: &[u8]) -> Result<T> {
    ciborium::de::from_reader(raw).map_err(|e| Error::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use tempfile::tempdir;
    use vantage_types::{Observation, Status};

    use super::*;

    fn registration(handle: u64, module: &str, observer: &str) -> Registration {
        Registration {
            handle,
            module: module.to_string(),
            observer: observer.to_string(),
            time: SystemTime::now(),
        }
    }

    fn report(observer: &str, subject: &str) -> Report {
        let mut observation = Observation::new(SystemTime::now());
        observation.add_metric("cpu", Status::Healthy, 90.0);
        Report::new(observer, subject, observation)
    }

    #[tokio::test]
    async fn registrations_survive_reopen_and_latest_wins() {
        let dir = tempdir().unwrap();
        let sink = FsSink::new(dir.path());
        sink.open().await.unwrap();

        sink.insert_registration(&registration(10000, "mod", "obs1"))
            .await
            .unwrap();
        sink.insert_registration(&registration(10001, "mod2", "obs2"))
            .await
            .unwrap();
        sink.insert_registration(&registration(10000, "mod", "obs1-replaced"))
            .await
            .unwrap();
        sink.close().await.unwrap();

        let reopened = FsSink::new(dir.path());
        reopened.open().await.unwrap();
        let registrations = reopened.read_registrations().await.unwrap();
        assert_eq!(registrations.len(), 2);
        assert_eq!(registrations[&10000].observer, "obs1-replaced");
        assert_eq!(registrations[&10001].module, "mod2");
    }

    #[tokio::test]
    async fn reports_append_in_order() {
        let dir = tempdir().unwrap();
        let sink = FsSink::new(dir.path());
        sink.open().await.unwrap();

        sink.append_report(&report("obs1", "db")).await.unwrap();
        sink.append_report(&report("obs2", "db")).await.unwrap();

        let reports = sink.read_reports().await.unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].observer, "obs1");
        assert_eq!(reports[1].observer, "obs2");
    }

    #[tokio::test]
    async fn inference_writes_replace() {
        let dir = tempdir().unwrap();
        let sink = FsSink::new(dir.path());
        sink.open().await.unwrap();

        let mut observation = Observation::new(SystemTime::now());
        observation.add_metric("cpu", Status::Healthy, 80.0);
        let first = Inference {
            subject: "db".to_string(),
            observers: vec!["obs1".to_string()],
            observation: observation.clone(),
        };
        sink.write_inference(&first).await.unwrap();

        let mut second = first.clone();
        second.observers.push("obs2".to_string());
        sink.write_inference(&second).await.unwrap();

        let read = sink.read_inference("db").await.unwrap().unwrap();
        assert_eq!(read.observers.len(), 2);
        assert!(sink.read_inference("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_logs_read_as_empty() {
        let dir = tempdir().unwrap();
        let sink = FsSink::new(dir.path());
        sink.open().await.unwrap();
        assert!(sink.read_registrations().await.unwrap().is_empty());
        assert!(sink.read_reports().await.unwrap().is_empty());
    }
}
