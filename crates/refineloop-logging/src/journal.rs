use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Represents each line type in the run journal JSONL file.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JournalLine {
    RunStart {
        run_id: String,
        timestamp: DateTime<Utc>,
        agent: String,
        signal_source: String,
        working_dir: PathBuf,
        max_iterations: u32,
        max_cost: f64,
        max_duration_secs: f64,
    },
    Iteration {
        #[serde(flatten)]
        record: serde_json::Value,
    },
    RunEnd {
        run_id: String,
        #[serde(flatten)]
        result: serde_json::Value,
        timestamp: DateTime<Utc>,
    },
}

/// Writes one run as JSONL to a file in ~/.local/share/refineloop/runs/.
pub struct RunJournal {
    file: Mutex<BufWriter<File>>,
    path: PathBuf,
    run_id: String,
}

impl RunJournal {
    /// Create a journal in the default runs directory. The file name combines
    /// the current UTC timestamp and a short hash of the initial artifact.
    pub fn new(initial_artifact: &str) -> io::Result<Self> {
        let runs_dir = Self::runs_dir()?;
        fs::create_dir_all(&runs_dir)?;

        let timestamp_str = Utc::now().format("%Y-%m-%dT%H-%M-%SZ").to_string();

        let mut hasher = Sha256::new();
        hasher.update(initial_artifact.as_bytes());
        let hash = hex::encode(hasher.finalize());
        let short_hash = &hash[..6];

        let filename = format!("{}_{}.jsonl", timestamp_str, short_hash);
        Self::with_path(runs_dir.join(filename))
    }

    /// Create a journal at an explicit path, creating parent directories
    pub fn with_path(path: PathBuf) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(&path)?;

        Ok(Self {
            file: Mutex::new(BufWriter::new(file)),
            path,
            run_id: uuid::Uuid::new_v4().to_string(),
        })
    }

    /// Returns the path to the journal file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Write the run start line.
    pub fn write_start(
        &self,
        agent: &str,
        signal_source: &str,
        working_dir: &Path,
        max_iterations: u32,
        max_cost: f64,
        max_duration_secs: f64,
    ) {
        let line = JournalLine::RunStart {
            run_id: self.run_id.clone(),
            timestamp: Utc::now(),
            agent: agent.to_string(),
            signal_source: signal_source.to_string(),
            working_dir: working_dir.to_path_buf(),
            max_iterations,
            max_cost,
            max_duration_secs,
        };
        self.write_line(&line);
    }

    /// Write an iteration line. Takes any serializable record to avoid a
    /// dependency on refineloop-core.
    pub fn write_iteration<T: Serialize>(&self, record: &T) {
        let record = serde_json::to_value(record).unwrap_or_default();
        self.write_line(&JournalLine::Iteration { record });
    }

    /// Write the run end line.
    pub fn write_end<T: Serialize>(&self, result: &T) {
        let line = JournalLine::RunEnd {
            run_id: self.run_id.clone(),
            result: serde_json::to_value(result).unwrap_or_default(),
            timestamp: Utc::now(),
        };
        self.write_line(&line);
    }

    fn write_line(&self, line: &JournalLine) {
        if let Ok(json) = serde_json::to_string(line) {
            if let Ok(mut writer) = self.file.lock() {
                let _ = writeln!(writer, "{}", json);
                let _ = writer.flush();
            }
        }
    }

    fn runs_dir() -> io::Result<PathBuf> {
        let data_dir = dirs::data_dir().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                "Could not determine data directory",
            )
        })?;
        Ok(data_dir.join("refineloop").join("runs"))
    }
}
