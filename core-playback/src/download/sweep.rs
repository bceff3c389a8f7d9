//! Orphan sweep of the download root.
//!
//! Removes what a crash, an old app version or a deleted library item left
//! on disk, and forgets local paths whose file disappeared. Items with a
//! running download are never touched: the sweep holds the operation
//! registry for its whole run.

use super::engine::DownloadEngine;
use crate::error::Result;
use core_library::models::{DownloadState, ItemId};
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, instrument, warn};

/// What a sweep removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Item directories without a library item
    pub orphan_directories: usize,
    /// Files inside item directories that no committed track names
    pub orphan_files: usize,
    /// Files directly under the download root
    pub stray_files: usize,
    /// Committed track paths whose file was missing
    pub cleared_paths: usize,
    /// Directories left alone because their item is downloading
    pub skipped_active: usize,
}

impl SweepReport {
    pub fn removed(&self) -> usize {
        self.orphan_directories + self.orphan_files + self.stray_files
    }
}

impl DownloadEngine {
    /// Delete orphaned directories and files under the download root.
    ///
    /// Safe to run at any time; running it twice removes nothing more.
    #[instrument(skip(self))]
    pub async fn sweep_orphans(&self) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        let inner = &self.inner;
        let root = &inner.config.download_root;

        let active = inner.active.lock().await;

        if inner.fs.exists(root).await? {
            let known: HashSet<ItemId> = inner.items.list_ids().await?.into_iter().collect();

            for entry in inner.fs.list_directory(root).await? {
                let Some(name) = file_name(&entry) else {
                    continue;
                };
                if !inner.fs.metadata(&entry).await?.is_directory {
                    debug!(path = %entry.display(), "Removing stray file");
                    inner.fs.delete_file(&entry).await?;
                    report.stray_files += 1;
                    continue;
                }

                let item_id = ItemId::new(name);
                if active.contains_key(&item_id) {
                    report.skipped_active += 1;
                    continue;
                }

                if !known.contains(&item_id) {
                    debug!(item_id = %item_id, "Removing orphan item directory");
                    inner.fs.delete_dir_all(&entry).await?;
                    inner.tracks.clear_local_paths(&item_id).await?;
                    report.orphan_directories += 1;
                    continue;
                }

                report.orphan_files += self.sweep_item_dir(&item_id, &entry).await?;
            }
        }

        for item_id in inner.tracks.list_downloaded_item_ids().await? {
            if active.contains_key(&item_id) {
                continue;
            }

            let mut cleared = 0;
            for track in inner.tracks.list_for_item(&item_id).await? {
                let Some(relative) = track.local_relative_path.as_deref() else {
                    continue;
                };
                if !inner.fs.exists(&root.join(relative)).await?
                    && inner.tracks.clear_local_path(&item_id, track.index).await?
                {
                    cleared += 1;
                }
            }

            if cleared > 0 {
                warn!(item_id = %item_id, cleared, "Downloaded files went missing");
                report.cleared_paths += cleared;
                self.publish(&item_id, DownloadState::NotDownloaded);
            }
        }
        drop(active);

        info!(
            removed = report.removed(),
            cleared_paths = report.cleared_paths,
            skipped_active = report.skipped_active,
            "Orphan sweep finished"
        );
        Ok(report)
    }

    /// Remove files of a known item that no committed track refers to.
    async fn sweep_item_dir(&self, item_id: &ItemId, dir: &Path) -> Result<usize> {
        let inner = &self.inner;
        let expected: HashSet<String> = inner
            .tracks
            .list_for_item(item_id)
            .await?
            .iter()
            .filter(|track| track.is_marked_downloaded())
            .map(|track| track.file_name())
            .collect();

        let mut removed = 0;
        for entry in inner.fs.list_directory(dir).await? {
            let keep = file_name(&entry).is_some_and(|name| expected.contains(name));
            if keep {
                continue;
            }

            debug!(item_id = %item_id, path = %entry.display(), "Removing orphan file");
            if inner.fs.metadata(&entry).await?.is_directory {
                inner.fs.delete_dir_all(&entry).await?;
            } else {
                inner.fs.delete_file(&entry).await?;
            }
            removed += 1;
        }
        Ok(removed)
    }
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|name| name.to_str())
}
