use crate::queryset::QueryRecord;
use crate::run::BenchmarkSummary;
use anyhow::Result;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};

/// Append-only per-run results file, written only by the collector.
pub struct ResultsSink {
    path: PathBuf,
    writer: Box<dyn AsyncWrite + Send + Unpin>,
    bytes: u64,
    lines: u64,
}

impl ResultsSink {
    pub fn path_for(dir: &Path, name: &str, timestamp: i64) -> PathBuf {
        let name = name.replace(['/', '\\'], "_");
        dir.join(format!("{}-{}.txt", name, timestamp))
    }

    /// Create a fresh results file. Runs landing on the same second get a
    /// numeric suffix instead of sharing a file.
    pub async fn create(dir: &Path, name: &str, timestamp: i64) -> std::io::Result<Self> {
        fs::create_dir_all(dir).await?;
        let base = Self::path_for(dir, name, timestamp);
        let mut attempt = 0u32;
        loop {
            let path = if attempt == 0 {
                base.clone()
            } else {
                base.with_extension(format!("{}.txt", attempt))
            };
            match fs::OpenOptions::new()
                .create_new(true)
                .append(true)
                .open(&path)
                .await
            {
                Ok(file) => return Ok(Self::from_writer(path, BufWriter::new(file))),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(e),
            }
        }
    }

    /// Sink over any writer; `path` is only reported. Each record is one
    /// `write_all`, so buffering is up to the writer.
    pub fn from_writer(path: PathBuf, writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        Self {
            path,
            writer: Box::new(writer),
            bytes: 0,
            lines: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn lines(&self) -> u64 {
        self.lines
    }

    pub async fn append(&mut self, record: &QueryRecord) -> std::io::Result<()> {
        let mut line = record.to_line();
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await?;
        self.bytes += line.len() as u64;
        self.lines += 1;
        Ok(())
    }

    pub async fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush().await
    }
}

/// Where run summaries go once the driver is done.
pub enum SummaryWriter {
    Csv(String),
    Stdout,
}

impl SummaryWriter {
    pub fn new_csv(path: String) -> Self {
        Self::Csv(path)
    }

    pub fn new_stdout() -> Self {
        Self::Stdout
    }

    pub async fn write_summaries(&self, summaries: &[BenchmarkSummary]) -> Result<()> {
        match self {
            Self::Csv(path) => {
                // Ensure parent directory exists
                if let Some(parent) = Path::new(path).parent() {
                    if !parent.as_os_str().is_empty() {
                        fs::create_dir_all(parent).await?;
                    }
                }
                let mut writer = csv::Writer::from_path(path)?;
                for s in summaries {
                    writer.serialize(s)?;
                }
                writer.flush()?;
                println!("Wrote {} summaries to: {}", summaries.len(), path);
            }
            Self::Stdout => {
                println!("{}", serde_json::to_string_pretty(summaries)?);
            }
        }
        Ok(())
    }
}
