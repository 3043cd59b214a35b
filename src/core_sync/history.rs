//! The append-only download history.
//!
//! One line per downloaded file: 10-digit zero-padded epoch seconds, a
//! space, 10-digit zero-padded size, a space, the raw filename. The file
//! is read once at startup to seed the in-memory index and appended to as
//! downloads succeed; it is never rewritten.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, warn};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRecord {
    pub epoch: i64,
    pub size: u64,
    pub name: String,
}

pub struct HistoryStore {
    path: PathBuf,
    file: tokio::fs::File,
}

pub(crate) fn format_history_line(record: &HistoryRecord) -> String {
    format!("{:010} {:010} {}\n", record.epoch, record.size, record.name)
}

pub(crate) fn parse_history_line(line: &str) -> Option<HistoryRecord> {
    let epoch = line.get(0..10)?.parse().ok()?;
    if line.as_bytes().get(10) != Some(&b' ') {
        return None;
    }
    let size = line.get(11..21)?.parse().ok()?;
    if line.as_bytes().get(21) != Some(&b' ') {
        return None;
    }
    let name = line.get(22..)?;
    if name.is_empty() {
        return None;
    }
    Some(HistoryRecord {
        epoch,
        size,
        name: name.to_string(),
    })
}

impl HistoryStore {
    /// Opens (creating if absent) the history file and replays it into a
    /// name-keyed index. A later record for the same name wins.
    pub async fn load(path: &Path) -> Result<(Self, HashMap<String, HistoryRecord>)> {
        let mut index = HashMap::new();
        match tokio::fs::read_to_string(path).await {
            Ok(text) => {
                for line in text.lines() {
                    match parse_history_line(line) {
                        Some(record) => {
                            index.insert(record.name.clone(), record);
                        }
                        None => warn!("Ignoring malformed history line {:?}", line),
                    }
                }
                debug!("Loaded {} history records from {}", index.len(), path.display());
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No history at {}, starting empty", path.display());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read history file: {}", path.display()))
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .with_context(|| format!("Failed to open history file: {}", path.display()))?;

        Ok((
            Self {
                path: path.to_path_buf(),
                file,
            },
            index,
        ))
    }

    pub async fn append(&mut self, record: &HistoryRecord) -> Result<()> {
        let line = format_history_line(record);
        self.file
            .write_all(line.as_bytes())
            .await
            .with_context(|| format!("Failed to append to history file: {}", self.path.display()))?;
        self.file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_format_is_fixed_width() {
        let record = HistoryRecord {
            epoch: 1552392000,
            size: 2048,
            name: "archive.zip".to_string(),
        };
        assert_eq!(format_history_line(&record), "1552392000 0000002048 archive.zip\n");
    }

    #[test]
    fn test_line_round_trip() {
        let record = HistoryRecord {
            epoch: 42,
            size: 0,
            name: "name with spaces.txt".to_string(),
        };
        let parsed = parse_history_line(format_history_line(&record).trim_end_matches('\n'));
        assert_eq!(parsed, Some(record));
    }

    #[test]
    fn test_malformed_lines_rejected() {
        assert_eq!(parse_history_line(""), None);
        assert_eq!(parse_history_line("0000000042"), None);
        assert_eq!(parse_history_line("0000000042 0000000001 "), None);
        assert_eq!(parse_history_line("not-a-date 0000000001 x"), None);
    }

    #[tokio::test]
    async fn test_load_append_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history");

        let (mut store, index) = HistoryStore::load(&path).await.unwrap();
        assert!(index.is_empty());

        let first = HistoryRecord {
            epoch: 1000,
            size: 10,
            name: "a.txt".to_string(),
        };
        let second = HistoryRecord {
            epoch: 2000,
            size: 20,
            name: "b.txt".to_string(),
        };
        store.append(&first).await.unwrap();
        store.append(&second).await.unwrap();
        drop(store);

        let (_, index) = HistoryStore::load(&path).await.unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.get("a.txt"), Some(&first));
        assert_eq!(index.get("b.txt"), Some(&second));
    }

    #[tokio::test]
    async fn test_later_record_for_same_name_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history");

        let (mut store, _) = HistoryStore::load(&path).await.unwrap();
        store
            .append(&HistoryRecord {
                epoch: 1000,
                size: 10,
                name: "a.txt".to_string(),
            })
            .await
            .unwrap();
        store
            .append(&HistoryRecord {
                epoch: 3000,
                size: 30,
                name: "a.txt".to_string(),
            })
            .await
            .unwrap();
        drop(store);

        let (_, index) = HistoryStore::load(&path).await.unwrap();
        assert_eq!(index.get("a.txt").unwrap().epoch, 3000);
        assert_eq!(index.get("a.txt").unwrap().size, 30);
    }
}
