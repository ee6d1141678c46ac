//! Append-only audit log (`audit-log.ndjson`).
//!
//! One JSON object per line, `seq` strictly increasing from 1 with no gaps.
//! Appends are serialized across processes with an exclusive lock on
//! `audit-log.ndjson.lock`; each event is one `write_all` of a
//! newline-terminated line on an append handle. A line without its trailing
//! newline was never committed: readers skip it and the next writer truncates it.

use crate::error::{Error, Result};
use crate::fsio::{FileLock, DEFAULT_LOCK_WAIT};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

const TAIL_CHUNK: u64 = 64 * 1024;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub actor: String,
    pub payload: serde_json::Value,
}

/// A view that can be rebuilt purely from the event sequence.
pub trait AuditView: Default {
    fn apply(&mut self, event: &AuditEvent);
}

#[derive(Clone, Debug)]
pub struct AuditLog {
    path: PathBuf,
    actor: String,
    lock_wait: Duration,
}

impl AuditLog {
    pub fn open(path: impl AsRef<Path>, actor: impl Into<String>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            actor: actor.into(),
            lock_wait: DEFAULT_LOCK_WAIT,
        }
    }

    pub fn with_lock_wait(mut self, wait: Duration) -> Self {
        self.lock_wait = wait;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }

    /// Append one event and return it with its assigned `seq`.
    /// Any failure is returned: an event is never dropped silently.
    pub fn append(&self, event_type: &str, payload: serde_json::Value) -> Result<AuditEvent> {
        let _lock = FileLock::acquire(&self.path, self.lock_wait)?;
        let wrap = |source: std::io::Error| Error::AuditWrite {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(wrap)?;
        }
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&self.path)
            .map_err(wrap)?;

        let tail = read_tail(&mut file).map_err(wrap)?;
        if tail.committed_len < tail.file_len {
            tracing::warn!(
                log = %self.path.display(),
                dropped_bytes = tail.file_len - tail.committed_len,
                "truncating torn audit tail"
            );
            file.set_len(tail.committed_len).map_err(wrap)?;
        }
        let last_seq = match tail.last_line {
            Some(line) => parse_line(&line, 0)?.seq,
            None => 0,
        };

        let event = AuditEvent {
            seq: last_seq + 1,
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            actor: self.actor.clone(),
            payload,
        };
        let mut line = serde_json::to_string(&event)?;
        line.push('\n');
        file.write_all(line.as_bytes()).map_err(wrap)?;
        file.sync_data().map_err(wrap)?;

        debug!(seq = event.seq, event_type, "audit append");
        Ok(event)
    }

    /// All committed events, verified to run `1..=n` without gaps.
    pub fn events(&self) -> Result<Vec<AuditEvent>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let committed = match content.rfind('\n') {
            Some(i) => &content[..=i],
            None => "",
        };

        let mut events = Vec::new();
        for (idx, line) in committed.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let event = parse_line(line, idx + 1)?;
            let expected = events.len() as u64 + 1;
            if event.seq != expected {
                return Err(Error::AuditCorrupt {
                    line: idx + 1,
                    message: format!("expected seq {expected}, found {}", event.seq),
                });
            }
            events.push(event);
        }
        Ok(events)
    }

    pub fn last_seq(&self) -> Result<u64> {
        Ok(self.events()?.last().map(|e| e.seq).unwrap_or(0))
    }

    /// Rebuild a derived view strictly from the event sequence.
    pub fn replay<V: AuditView>(&self) -> Result<V> {
        let mut view = V::default();
        for event in self.events()? {
            view.apply(&event);
        }
        Ok(view)
    }
}

fn parse_line(line: &str, line_no: usize) -> Result<AuditEvent> {
    serde_json::from_str(line).map_err(|e| Error::AuditCorrupt {
        line: line_no,
        message: e.to_string(),
    })
}

struct Tail {
    file_len: u64,
    committed_len: u64,
    last_line: Option<String>,
}

/// Locate the last newline-terminated line without reading the whole log.
fn read_tail(file: &mut File) -> std::io::Result<Tail> {
    let file_len = file.seek(SeekFrom::End(0))?;
    if file_len == 0 {
        return Ok(Tail {
            file_len,
            committed_len: 0,
            last_line: None,
        });
    }

    let mut chunk = TAIL_CHUNK.min(file_len);
    loop {
        let start = file_len - chunk;
        file.seek(SeekFrom::Start(start))?;
        let mut buf = Vec::with_capacity(chunk as usize);
        Read::by_ref(file).take(chunk).read_to_end(&mut buf)?;

        let last_nl = buf.iter().rposition(|b| *b == b'\n');
        let prev_nl = last_nl.and_then(|i| buf[..i].iter().rposition(|b| *b == b'\n'));

        match (last_nl, prev_nl) {
            (Some(end), Some(begin)) => {
                let line = String::from_utf8_lossy(&buf[begin + 1..end]).to_string();
                return Ok(Tail {
                    file_len,
                    committed_len: start + end as u64 + 1,
                    last_line: Some(line),
                });
            }
            (Some(end), None) if start == 0 => {
                let line = String::from_utf8_lossy(&buf[..end]).to_string();
                return Ok(Tail {
                    file_len,
                    committed_len: end as u64 + 1,
                    last_line: Some(line),
                });
            }
            (None, _) if start == 0 => {
                return Ok(Tail {
                    file_len,
                    committed_len: 0,
                    last_line: None,
                });
            }
            _ => chunk = (chunk * 2).min(file_len),
        }
    }
}
