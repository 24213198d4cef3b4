use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context};
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

pub type EventPayload = Map<String, Value>;

/// Append-only JSONL log of session activity.
///
/// Lines start with `type`, `session_id` and `ts`; payload keys are merged on
/// top. The file is opened on first use and kept open. Clones share the
/// handle, so one writer can serve concurrent requests.
#[derive(Debug, Clone)]
pub struct EventWriter {
    shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    path: PathBuf,
    session_id: String,
    file: Mutex<Option<File>>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(Shared {
                path: path.into(),
                session_id: session_id.into(),
                file: Mutex::new(None),
            }),
        }
    }

    pub fn for_new_session(path: impl Into<PathBuf>) -> Self {
        Self::new(path, new_session_id())
    }

    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    pub fn session_id(&self) -> &str {
        &self.shared.session_id
    }

    /// Emitter that stamps `request_id` on every event it writes.
    pub fn for_request<'a>(&'a self, request_id: &'a str) -> RequestEvents<'a> {
        RequestEvents {
            writer: self,
            request_id,
        }
    }

    pub fn emit(&self, event_type: &str, payload: EventPayload) -> anyhow::Result<Value> {
        let mut event = EventPayload::new();
        event.insert("type".into(), Value::from(event_type));
        event.insert("session_id".into(), Value::from(self.session_id()));
        event.insert(
            "ts".into(),
            Value::from(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)),
        );
        event.extend(payload);

        let mut line = serde_json::to_string(&event)?;
        line.push('\n');
        self.append(line.as_bytes())?;
        Ok(Value::Object(event))
    }

    fn append(&self, bytes: &[u8]) -> anyhow::Result<()> {
        let mut slot = self
            .shared
            .file
            .lock()
            .map_err(|_| anyhow!("event log lock poisoned"))?;
        if slot.is_none() {
            *slot = Some(self.open()?);
        }
        if let Some(file) = slot.as_mut() {
            file.write_all(bytes)
                .with_context(|| format!("failed to append to {}", self.path().display()))?;
        }
        Ok(())
    }

    fn open(&self) -> anyhow::Result<File> {
        let path = self.path();
        if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open event log {}", path.display()))
    }
}

/// Events belonging to one submission.
#[derive(Debug, Clone, Copy)]
pub struct RequestEvents<'a> {
    writer: &'a EventWriter,
    request_id: &'a str,
}

impl RequestEvents<'_> {
    pub fn request_id(&self) -> &str {
        self.request_id
    }

    pub fn emit(&self, event_type: &str, mut payload: EventPayload) -> anyhow::Result<Value> {
        payload
            .entry("request_id")
            .or_insert_with(|| Value::from(self.request_id));
        self.writer.emit(event_type, payload)
    }
}

pub fn new_session_id() -> String {
    format!("session-{}", Uuid::new_v4().simple())
}
