//! Byte-level progress of one item download.

/// Highest fraction reported before the track paths are committed.
pub const MAX_UNCOMMITTED_PROGRESS: f64 = 0.99;

/// Tracks `(finished bytes + in-flight bytes) / total bytes` for an item.
///
/// When any track size is unknown the fraction falls back to finished files
/// over file count. Reported values never decrease and stay at or below
/// [`MAX_UNCOMMITTED_PROGRESS`]; only a committed download is complete.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    sizes: Vec<Option<u64>>,
    total_bytes: Option<u64>,
    finished_files: usize,
    finished_bytes: u64,
    in_flight_bytes: u64,
    reported: f64,
}

impl ProgressTracker {
    pub fn new(sizes: Vec<Option<u64>>) -> Self {
        let total_bytes = sizes
            .iter()
            .copied()
            .sum::<Option<u64>>()
            .filter(|total| *total > 0);

        Self {
            sizes,
            total_bytes,
            finished_files: 0,
            finished_bytes: 0,
            in_flight_bytes: 0,
            reported: 0.0,
        }
    }

    pub fn total_bytes(&self) -> Option<u64> {
        self.total_bytes
    }

    /// Count bytes written to the in-flight file.
    ///
    /// Returns the new fraction when it moved forward.
    pub fn advance(&mut self, bytes: u64) -> Option<f64> {
        self.in_flight_bytes += bytes;
        self.publish()
    }

    /// Move the in-flight file into the finished set.
    pub fn finish_file(&mut self) -> Option<f64> {
        let expected = self
            .sizes
            .get(self.finished_files)
            .copied()
            .flatten()
            .unwrap_or(self.in_flight_bytes);

        self.finished_bytes += expected.max(self.in_flight_bytes);
        self.finished_files += 1;
        self.in_flight_bytes = 0;
        self.publish()
    }

    /// Last fraction handed out.
    pub fn fraction(&self) -> f64 {
        self.reported
    }

    fn raw_fraction(&self) -> f64 {
        match self.total_bytes {
            Some(total) => (self.finished_bytes + self.in_flight_bytes) as f64 / total as f64,
            None if self.sizes.is_empty() => 0.0,
            None => self.finished_files as f64 / self.sizes.len() as f64,
        }
    }

    fn publish(&mut self) -> Option<f64> {
        let next = self.raw_fraction().min(MAX_UNCOMMITTED_PROGRESS);
        if next > self.reported {
            self.reported = next;
            Some(next)
        } else {
            None
        }
    }
}
