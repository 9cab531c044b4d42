use crate::transform::InboundRequest;
use chrono::Utc;
use hyper::header::HeaderMap;
use serde::ser::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs::{File, OpenOptions, create_dir_all};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Response excerpts in log records are cut to this many bytes.
const EXCERPT_LIMIT: usize = 500;

/// Status recorded for an access event: a concrete code, or `Pending` when
/// no response ever materialized.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogStatus {
    Code(u16),
    Pending,
}

impl Serialize for LogStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            LogStatus::Code(code) => serializer.serialize_u16(*code),
            LogStatus::Pending => serializer.serialize_str("Pending"),
        }
    }
}

#[derive(serde::Serialize)]
struct AccessRecord<'a> {
    timestamp: String,
    method: String,
    path: &'a str,
    headers: Map<String, Value>,
    body: String,
    target: &'a str,
    status: LogStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_body: Option<String>,
}

/// Append-only access log, one file per UTC calendar date.
///
/// Handles are created lazily on first write for a date and reused for the
/// process lifetime; writes serialize one self-contained JSON document per
/// line.
pub struct AccessLogger {
    dir: PathBuf,
    handles: Mutex<HashMap<String, Arc<Mutex<File>>>>,
}

impl AccessLogger {
    /// Opens the log directory, creating it if absent.
    pub fn new(dir: PathBuf) -> io::Result<Self> {
        create_dir_all(&dir)?;
        Ok(Self {
            dir,
            handles: Mutex::new(HashMap::new()),
        })
    }

    /// Appends one record for this event.
    ///
    /// Fire-and-forget: failures are reported through tracing and never
    /// reach the caller-facing response.
    pub fn log(
        &self,
        inbound: &InboundRequest,
        target: &str,
        status: LogStatus,
        response_excerpt: Option<&[u8]>,
    ) {
        let record = AccessRecord {
            timestamp: Utc::now().to_rfc3339(),
            method: inbound.method.to_string(),
            path: inbound.path_and_query(),
            headers: headers_snapshot(&inbound.headers),
            body: if inbound.body.is_empty() {
                "No body".to_string()
            } else {
                inbound.body_text().into_owned()
            },
            target,
            status,
            response_body: response_excerpt.map(excerpt),
        };

        if let Err(e) = self.append(&record) {
            tracing::warn!(error = %e, "failed to write access log record");
        }
    }

    fn append(&self, record: &AccessRecord<'_>) -> io::Result<()> {
        let date = Utc::now().format("%Y-%m-%d").to_string();
        let handle = self.handle_for(&date)?;
        let line = serde_json::to_string(record)?;

        let mut file = handle
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "access log lock poisoned"))?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        Ok(())
    }

    /// Get-or-create the append handle for a date. Idempotent per date per
    /// process.
    fn handle_for(&self, date: &str) -> io::Result<Arc<Mutex<File>>> {
        let mut handles = self
            .handles
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "access log lock poisoned"))?;

        if let Some(handle) = handles.get(date) {
            return Ok(handle.clone());
        }

        let path = self.dir.join(format!("access_{date}.log"));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        tracing::debug!(path = %path.display(), "opened access log file");

        let handle = Arc::new(Mutex::new(file));
        handles.insert(date.to_string(), handle.clone());
        Ok(handle)
    }
}

fn headers_snapshot(headers: &HeaderMap) -> Map<String, Value> {
    let mut snapshot = Map::new();
    for (name, value) in headers {
        snapshot.insert(
            name.as_str().to_string(),
            Value::String(String::from_utf8_lossy(value.as_bytes()).into_owned()),
        );
    }
    snapshot
}

fn excerpt(bytes: &[u8]) -> String {
    let end = bytes.len().min(EXCERPT_LIMIT);
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}
