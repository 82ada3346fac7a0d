use crate::content::Record;
use crate::sink::{RecordSink, SinkError};
use futures::future::BoxFuture;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

/// Newline-delimited record log. Every operation opens the file, does its work,
/// and closes it again; nothing is held between calls.
#[derive(Debug, Clone)]
pub struct FileLogSink {
    path: Arc<PathBuf>,
}

impl RecordSink for FileLogSink {
    fn append<'a>(&'a self, record: &'a str) -> BoxFuture<'a, Result<(), SinkError>> {
        Box::pin(self.append_line(record))
    }

    fn trim(&self, max_records: usize) -> BoxFuture<'_, Result<usize, SinkError>> {
        Box::pin(self.trim_to(max_records))
    }

    fn recent(&self, limit: usize) -> BoxFuture<'_, Result<Vec<Record>, SinkError>> {
        Box::pin(self.tail(limit))
    }
}

impl FileLogSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Arc::new(path.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append_line(&self, record: &str) -> Result<(), SinkError> {
        if record.contains('\n') || record.contains('\r') {
            return Err(SinkError::MultiLineRecord);
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path.as_path())
            .await
            .map_err(|source| SinkError::Open {
                path: self.path.to_path_buf(),
                source,
            })?;

        let mut line = String::with_capacity(record.len() + 1);
        line.push_str(record);
        line.push('\n');

        file.write_all(line.as_bytes())
            .await
            .map_err(|source| self.write_error(source))?;
        file.flush().await.map_err(|source| self.write_error(source))
    }

    pub async fn trim_to(&self, max_records: usize) -> Result<usize, SinkError> {
        let Some(content) = self.read_all().await? else {
            return Ok(0);
        };

        let lines: Vec<&str> = content.lines().collect();
        if lines.len() <= max_records {
            return Ok(0);
        }

        let surplus = lines.len() - max_records;
        let mut kept = String::with_capacity(content.len());
        for line in &lines[surplus..] {
            kept.push_str(line);
            kept.push('\n');
        }

        let staging = self.staging_path();
        fs::write(&staging, kept.as_bytes())
            .await
            .map_err(|source| SinkError::Write {
                path: staging.clone(),
                source,
            })?;
        fs::rename(&staging, self.path.as_path())
            .await
            .map_err(|source| self.write_error(source))?;

        tracing::debug!(
            path = %self.path.display(),
            removed = surplus,
            retained = max_records,
            "trimmed record log"
        );
        Ok(surplus)
    }

    pub async fn tail(&self, limit: usize) -> Result<Vec<Record>, SinkError> {
        let Some(content) = self.read_all().await? else {
            return Ok(Vec::new());
        };

        let lines: Vec<&str> = content.lines().collect();
        let skip = lines.len().saturating_sub(limit);
        Ok(lines[skip..].iter().map(|line| (*line).to_owned()).collect())
    }

    async fn read_all(&self) -> Result<Option<String>, SinkError> {
        match fs::read_to_string(self.path.as_path()).await {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(SinkError::Read {
                path: self.path.to_path_buf(),
                source,
            }),
        }
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".trim");
        self.path.with_file_name(name)
    }

    fn write_error(&self, source: std::io::Error) -> SinkError {
        SinkError::Write {
            path: self.path.to_path_buf(),
            source,
        }
    }
}
