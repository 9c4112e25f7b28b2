use crate::bench::Benchmark;
use crate::checkpoint::CheckpointDir;

/// Keeps the `k` epochs with the lowest benchmark node count.
pub struct TopK {
    k: usize,
    kept: Vec<(f64, usize)>,
}

impl TopK {
    /// `k == 0` keeps every epoch.
    pub fn new(k: usize) -> Self {
        Self {
            k,
            kept: Vec::new(),
        }
    }

    /// Records an epoch's score and returns the epochs that fell out of the top `k`.
    /// On equal scores the earlier epoch ranks first.
    pub fn offer(&mut self, epoch: usize, nodes: f64) -> Vec<usize> {
        self.kept.push((nodes, epoch));
        self.kept
            .sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        if self.k == 0 || self.kept.len() <= self.k {
            return Vec::new();
        }
        self.kept.split_off(self.k).into_iter().map(|(_, e)| e).collect()
    }

    /// Best epoch so far and its node count.
    pub fn best(&self) -> Option<(usize, f64)> {
        self.kept.first().map(|&(nodes, epoch)| (epoch, nodes))
    }
}

/// Benchmarks the model file exported for `epoch` and deletes the checkpoints
/// that fall out of the top k. Returns the node count, or `None` when the
/// benchmark failed and selection was skipped for this epoch.
pub fn select_checkpoint(
    bench: &Benchmark,
    selection: &mut TopK,
    checkpoints: &CheckpointDir,
    epoch: usize,
) -> Option<f64> {
    let nodes = match bench.run() {
        Ok(nodes) => nodes,
        Err(e) => {
            log::warn!("Epoch {}: {}, skipping model selection", epoch, e);
            return None;
        }
    };
    log::info!("Epoch {}: bench {} nodes", epoch, nodes);

    for evicted in selection.offer(epoch, nodes) {
        if let Err(e) = checkpoints.delete_epoch(evicted) {
            log::warn!("Failed to delete checkpoint for epoch {}: {}", evicted, e);
        }
    }

    Some(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_lowest_node_counts() {
        let mut top = TopK::new(2);

        assert!(top.offer(1, 500.0).is_empty());
        assert!(top.offer(2, 300.0).is_empty());
        assert_eq!(top.offer(3, 400.0), vec![1]);
        assert_eq!(top.offer(4, 900.0), vec![4]);
        assert_eq!(top.best(), Some((2, 300.0)));
    }

    #[test]
    fn test_ties_keep_earlier_epoch() {
        let mut top = TopK::new(1);
        top.offer(1, 100.0);
        assert_eq!(top.offer(2, 100.0), vec![2]);
    }

    #[test]
    fn test_zero_keeps_everything() {
        let mut top = TopK::new(0);
        for epoch in 0..10 {
            assert!(top.offer(epoch, epoch as f64).is_empty());
        }
        assert_eq!(top.best(), Some((0, 0.0)));
    }

    #[cfg(unix)]
    mod with_checkpoints {
        use std::fs;
        use std::time::Duration;

        use crate::bench::Benchmark;
        use crate::checkpoint::CheckpointDir;
        use crate::training::selection::{select_checkpoint, TopK};

        fn shell(script: &str) -> Benchmark {
            Benchmark::new(
                "sh".to_string(),
                vec!["-c".to_string(), script.to_string()],
                Duration::from_secs(10),
            )
        }

        fn run_dir() -> (tempfile::TempDir, CheckpointDir) {
            let root = tempfile::tempdir().unwrap();
            let dir = CheckpointDir::create_next(root.path()).unwrap();
            (root, dir)
        }

        #[test]
        fn test_failed_benchmark_keeps_checkpoint() {
            let (_root, dir) = run_dir();
            fs::write(dir.epoch_path(1), b"weights").unwrap();
            let mut top = TopK::new(1);

            assert_eq!(select_checkpoint(&shell("exit 1"), &mut top, &dir, 1), None);
            assert_eq!(select_checkpoint(&shell("echo oops"), &mut top, &dir, 1), None);

            assert_eq!(fs::read(dir.epoch_path(1)).unwrap(), b"weights");
            assert_eq!(top.best(), None);
        }

        #[test]
        fn test_evicted_checkpoints_are_deleted() {
            let (_root, dir) = run_dir();
            for epoch in 1..=3 {
                fs::write(dir.epoch_path(epoch), b"weights").unwrap();
            }
            let mut top = TopK::new(1);

            assert_eq!(select_checkpoint(&shell("echo 500"), &mut top, &dir, 1), Some(500.0));
            assert_eq!(select_checkpoint(&shell("echo 300"), &mut top, &dir, 2), Some(300.0));
            // A failure in between leaves the ranking alone.
            assert_eq!(select_checkpoint(&shell("exit 2"), &mut top, &dir, 3), None);

            assert!(!dir.epoch_path(1).exists());
            assert!(dir.epoch_path(2).exists());
            assert!(dir.epoch_path(3).exists());
            assert_eq!(top.best(), Some((2, 300.0)));
        }
    }
}
