//! The mass-sync orchestrator.
//!
//! One run: load the history, log in, change to the configured remote and
//! local directories, list, then download whatever the history does not
//! already account for. Successes are appended to the history so the next
//! run skips them; a shortfall is reported but never fatal, the scheduler
//! is expected to re-invoke us.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::Result;
use log::{debug, info, warn};

use crate::config::Config;
use crate::core_client::listing::DirEntry;
use crate::core_client::session::FtpSession;
use crate::core_client::supervisor::supervised;
use crate::core_sync::archive::{is_archive, unpack_archive};
use crate::core_sync::history::{HistoryRecord, HistoryStore};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MirrorReport {
    pub listed: usize,
    pub already: usize,
    pub downloaded: usize,
    pub failed: usize,
}

impl MirrorReport {
    pub fn is_complete(&self) -> bool {
        self.already + self.downloaded == self.listed
    }
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum SyncDecision {
    AlreadyHave,
    Download,
}

/// An entry is already accounted for when the history knows its name with
/// the same size and a modification time at least as new as the server's.
pub(crate) fn sync_decision(
    index: &HashMap<String, HistoryRecord>,
    entry: &DirEntry,
) -> SyncDecision {
    match index.get(&entry.name) {
        Some(record) if record.size == entry.size && record.epoch >= entry.epoch() => {
            SyncDecision::AlreadyHave
        }
        _ => SyncDecision::Download,
    }
}

pub struct Mirror {
    config: Config,
    session: FtpSession,
    history: HistoryStore,
    index: HashMap<String, HistoryRecord>,
    target_dir: PathBuf,
    dry_run: bool,
}

impl Mirror {
    pub async fn new(config: Config, dry_run: bool, debug: bool) -> Result<Self> {
        let target_dir = PathBuf::from(&config.local.target_dir);
        tokio::fs::create_dir_all(&target_dir).await?;
        let (history, index) = HistoryStore::load(&config.history_path()).await?;
        let mut session = FtpSession::new(
            &config.remote.host,
            config.port(),
            &config.remote.username,
            &config.remote.password,
        );
        session.debug = debug;
        Ok(Self {
            config,
            session,
            history,
            index,
            target_dir,
            dry_run,
        })
    }

    pub async fn run(&mut self) -> Result<MirrorReport> {
        self.session.start_session().await?;
        supervised!(
            self.session,
            self.session
                .set_remote_dir(&self.config.remote.source_dir)
                .await
        )?;
        self.session.set_local_dir(&self.target_dir)?;

        let criteria = self.config.remote.criteria.clone();
        let entries = supervised!(
            self.session,
            self.session.get_dir_list(criteria.as_deref()).await
        )?;

        let mut report = MirrorReport::default();
        for entry in &entries {
            if entry.is_dir() {
                debug!("Skipping directory {}", entry.name);
                continue;
            }
            report.listed += 1;
            match sync_decision(&self.index, entry) {
                SyncDecision::AlreadyHave => {
                    debug!("Already have {} ({} bytes)", entry.name, entry.size);
                    report.already += 1;
                }
                SyncDecision::Download if self.dry_run => {
                    info!("Would download {} ({} bytes)", entry.name, entry.size);
                    report.downloaded += 1;
                }
                SyncDecision::Download => {
                    match supervised!(self.session, self.session.file_download(entry).await) {
                        Ok(()) => {
                            let record = HistoryRecord {
                                epoch: entry.epoch(),
                                size: entry.size,
                                name: entry.name.clone(),
                            };
                            self.history.append(&record).await?;
                            self.index.insert(record.name.clone(), record);
                            report.downloaded += 1;
                            if is_archive(&entry.name) {
                                self.unpack_and_discard(&entry.name).await;
                            }
                        }
                        Err(e) => {
                            warn!("Download of {} failed: {}", entry.name, e);
                            report.failed += 1;
                        }
                    }
                }
            }
        }

        if report.is_complete() {
            info!(
                "Mirror of {} complete: listed={} already={} downloaded={}",
                self.session.host(),
                report.listed,
                report.already,
                report.downloaded
            );
        } else {
            warn!(
                "Mirror shortfall: {} of {} entries synced, next run will catch up",
                report.already + report.downloaded,
                report.listed
            );
        }
        self.session.quit_session().await;
        Ok(report)
    }

    /// Unpacks a downloaded archive next to itself and deletes it. A bad
    /// archive is logged and kept for inspection, not treated as fatal.
    async fn unpack_and_discard(&self, name: &str) {
        let path = self.target_dir.join(name);
        match unpack_archive(&path, &self.target_dir) {
            Ok(()) => {
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    warn!("Could not remove unpacked archive {}: {}", path.display(), e);
                }
            }
            Err(e) => warn!("Could not unpack {}: {:#}", path.display(), e),
        }
    }
}
