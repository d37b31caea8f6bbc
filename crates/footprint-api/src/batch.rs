// Scan-surface batching
//
// The service caps how many targets one "extend scan surface" request may
// carry. `ScanSurfaceBatcher` flattens hosts, addresses and CIDR blocks into
// individual targets and cuts them into request-sized messages.

use std::collections::HashSet;

use tracing::debug;

use crate::error::Error;
use crate::models::ExtendMessage;
use crate::network;

/// Most targets the service accepts in one extend request.
pub const MAX_TARGETS_PER_REQUEST: usize = 1024;

/// Splits scan targets into bounded [`ExtendMessage`] batches.
///
/// Messages come back without scanners; the caller fills those in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSurfaceBatcher {
    max_batch_size: usize,
    deduplicate: bool,
    exclude_private: bool,
}

impl Default for ScanSurfaceBatcher {
    fn default() -> Self {
        Self::new(MAX_TARGETS_PER_REQUEST)
    }
}

impl ScanSurfaceBatcher {
    /// A batcher emitting at most `max_batch_size` targets per message.
    ///
    /// Deduplication and RFC 1918 exclusion start enabled.
    pub fn new(max_batch_size: usize) -> Self {
        Self {
            max_batch_size: max_batch_size.max(1),
            deduplicate: true,
            exclude_private: true,
        }
    }

    /// Collapse repeated targets (including a plain address that a CIDR
    /// block also covers) before batching.
    pub fn with_deduplicate(mut self, deduplicate: bool) -> Self {
        self.deduplicate = deduplicate;
        self
    }

    /// Drop literal private IPv4 addresses in [`prepare_batches`](Self::prepare_batches).
    pub fn with_exclude_private(mut self, exclude_private: bool) -> Self {
        self.exclude_private = exclude_private;
        self
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    pub fn deduplicates(&self) -> bool {
        self.deduplicate
    }

    pub fn excludes_private(&self) -> bool {
        self.exclude_private
    }

    /// Trim, expand CIDR blocks and optionally deduplicate.
    ///
    /// Plain targets come first, then expanded addresses; the first
    /// occurrence of a repeated target wins.
    pub fn expand<I, S>(&self, targets: I) -> Result<Vec<String>, Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut flat = network::expand_targets(targets)?;
        if self.deduplicate {
            let mut seen = HashSet::with_capacity(flat.len());
            flat.retain(|target| seen.insert(target.clone()));
        }
        Ok(flat)
    }

    /// Drop RFC 1918 addresses when exclusion is enabled.
    pub fn filter(&self, mut targets: Vec<String>) -> Vec<String> {
        if self.exclude_private {
            let before = targets.len();
            targets.retain(|target| !network::is_rfc1918(target));
            let dropped = before - targets.len();
            if dropped > 0 {
                debug!(dropped, "skipping private scan targets");
            }
        }
        targets
    }

    /// Cut already-flattened targets into messages of at most
    /// `max_batch_size`. No targets means no messages.
    pub fn chunk(&self, targets: &[String]) -> Vec<ExtendMessage> {
        targets
            .chunks(self.max_batch_size)
            .map(|batch| ExtendMessage {
                scan_targets: batch.to_vec(),
                scanners: Vec::new(),
            })
            .collect()
    }

    /// Expand and batch `targets`.
    pub fn create_batches<I, S>(&self, targets: I) -> Result<Vec<ExtendMessage>, Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(self.chunk(&self.expand(targets)?))
    }

    /// Expand, filter and batch `targets` for a scan-surface update.
    pub fn prepare_batches<I, S>(&self, targets: I) -> Result<Vec<ExtendMessage>, Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let targets = self.filter(self.expand(targets)?);
        Ok(self.chunk(&targets))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const TARGETS: [&str; 4] = ["127.0.0.1", "localhost", "172.16.0.0/28", "192.168.0.255/27"];

    #[test]
    fn batches_mixed_targets() {
        // 1 + 1 + 14 + 30 = 46 targets
        let batches = ScanSurfaceBatcher::new(8).create_batches(TARGETS).unwrap();

        let sizes: Vec<usize> = batches.iter().map(|b| b.scan_targets.len()).collect();
        assert_eq!(sizes, vec![8, 8, 8, 8, 8, 6]);
        assert!(batches.iter().all(|b| b.scanners.is_empty()));
    }

    #[test]
    fn batch_count_is_ceiling_of_total() {
        for size in [1, 5, 8, 45, 46, 47, 1024] {
            let batches = ScanSurfaceBatcher::new(size).create_batches(TARGETS).unwrap();
            assert_eq!(batches.len(), 46_usize.div_ceil(size), "batch size {size}");
            let total: usize = batches.iter().map(|b| b.scan_targets.len()).sum();
            assert_eq!(total, 46);
        }
    }

    #[test]
    fn empty_input_yields_no_batches() {
        let batches = ScanSurfaceBatcher::default()
            .create_batches(Vec::<String>::new())
            .unwrap();
        assert!(batches.is_empty());
    }

    #[test]
    fn order_is_plain_then_expanded() {
        let batches = ScanSurfaceBatcher::new(3)
            .create_batches(["10.0.0.0/30", "a.example", "b.example"])
            .unwrap();

        assert_eq!(batches[0].scan_targets, vec!["a.example", "b.example", "10.0.0.1"]);
        assert_eq!(batches[1].scan_targets, vec!["10.0.0.2"]);
    }

    #[test]
    fn deduplicates_overlap_with_cidr() {
        let targets = ["10.0.0.1", "10.0.0.0/30", "10.0.0.1"];

        let deduped = ScanSurfaceBatcher::default().expand(targets).unwrap();
        assert_eq!(deduped, vec!["10.0.0.1", "10.0.0.2"]);

        let kept = ScanSurfaceBatcher::default()
            .with_deduplicate(false)
            .expand(targets)
            .unwrap();
        assert_eq!(kept.len(), 4);
    }

    #[test]
    fn prepare_drops_private_addresses() {
        let batcher = ScanSurfaceBatcher::new(8);
        let batches = batcher.prepare_batches(TARGETS).unwrap();
        let flat: Vec<&str> = batches
            .iter()
            .flat_map(|b| b.scan_targets.iter().map(String::as_str))
            .collect();
        assert_eq!(flat, vec!["127.0.0.1", "localhost"]);

        let batches = batcher
            .with_exclude_private(false)
            .prepare_batches(TARGETS)
            .unwrap();
        assert_eq!(batches.len(), 6);
    }

    #[test]
    fn zero_batch_size_is_clamped() {
        assert_eq!(ScanSurfaceBatcher::new(0).max_batch_size(), 1);
    }
}
