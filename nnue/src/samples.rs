use std::fs;
use std::io;
use std::path::Path;

use candle_core::{Device, Result, Tensor};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use rayon::prelude::*;

use crate::encoding::{TrainingSample, NUM_FEATURES};
use crate::error::DecodeError;
use crate::format::Format;
use crate::record::{decode_record, record_count, PositionRecord};

/// A dataset file held in memory. Records are decoded on demand, so the
/// corpus can be shared read-only between loader workers.
pub struct Samples {
    data: Vec<u8>,
    format: Format,
    len: usize,
}

impl Samples {
    pub fn open(path: &Path, format: Format) -> io::Result<Self> {
        let data = fs::read(path)?;
        let samples = Self::from_bytes(data, format);

        let trailing = samples.data.len() - samples.len * format.record_size();
        if trailing > 0 {
            log::warn!(
                "Ignoring {} trailing bytes in {}",
                trailing,
                path.display()
            );
        }

        Ok(samples)
    }

    pub fn from_bytes(data: Vec<u8>, format: Format) -> Self {
        let len = record_count(data.len(), format);
        Self { data, format, len }
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn record(&self, index: usize) -> std::result::Result<PositionRecord, DecodeError> {
        decode_record(&self.data, index, self.format)
    }

    pub fn sample(&self, index: usize) -> std::result::Result<TrainingSample, DecodeError> {
        let record = self.record(index)?;
        Ok(TrainingSample::from_record(&record, self.format))
    }

    /// Decodes every record once, in parallel, to report what the corpus contains.
    pub fn scan(&self) -> SampleStats {
        (0..self.len)
            .into_par_iter()
            .fold(SampleStats::default, |mut stats, index| {
                stats.add(self.record(index));
                stats
            })
            .reduce(SampleStats::default, SampleStats::merge)
    }

    /// Shuffles all record indices and splits off a test fraction.
    pub fn train_test_indices(
        &self,
        test_ratio: f64,
        random_seed: Option<u64>,
    ) -> (Vec<usize>, Vec<usize>) {
        let mut indices: Vec<usize> = (0..self.len).collect();
        match random_seed {
            Some(seed) => indices.shuffle(&mut StdRng::seed_from_u64(seed)),
            None => indices.shuffle(&mut rand::thread_rng()),
        }

        let test_len = (self.len as f64 * test_ratio.clamp(0.0, 1.0)) as usize;
        let train = indices.split_off(test_len);
        (train, indices)
    }

    /// Encodes the given records into one batch. Records that fail to decode
    /// are left out and counted.
    pub fn batch(&self, indices: &[usize]) -> (BatchData, usize) {
        let mut data = BatchData::with_capacity(indices.len());
        let mut skipped = 0;

        for &index in indices {
            match self.sample(index) {
                Ok(sample) => data.push(&sample),
                Err(e) => {
                    log::debug!("Skipping record {}: {}", index, e);
                    skipped += 1;
                }
            }
        }

        (data, skipped)
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct SampleStats {
    pub valid: usize,
    pub invalid: usize,
    /// Loss, draw, win counts from the side to move's point of view.
    pub outcomes: [usize; 3],
    pub target_sum: f64,
}

impl SampleStats {
    fn add(&mut self, record: std::result::Result<PositionRecord, DecodeError>) {
        match record {
            Ok(record) => {
                self.valid += 1;
                self.outcomes[record.outcome as usize] += 1;
                self.target_sum +=
                    crate::encoding::blended_target(record.score_cp, record.outcome) as f64;
            }
            Err(_) => self.invalid += 1,
        }
    }

    fn merge(mut self, other: Self) -> Self {
        self.valid += other.valid;
        self.invalid += other.invalid;
        for (a, b) in self.outcomes.iter_mut().zip(other.outcomes) {
            *a += b;
        }
        self.target_sum += other.target_sum;
        self
    }

    pub fn mean_target(&self) -> f64 {
        self.target_sum / self.valid.max(1) as f64
    }

    pub fn log(&self) {
        let total = (self.valid + self.invalid).max(1) as f64;
        let pct = |n: usize| n as f64 / total * 100.0;

        log::info!("Total positions: {}", self.valid + self.invalid);
        log::info!(
            "Results: {:.2}% wins, {:.2}% draws, {:.2}% losses",
            pct(self.outcomes[2]),
            pct(self.outcomes[1]),
            pct(self.outcomes[0])
        );
        log::info!("Mean target: {:.4}", self.mean_target());

        if self.invalid > 0 {
            log::warn!(
                "Warning: {} malformed records ({:.2}%) will be skipped!",
                self.invalid,
                pct(self.invalid)
            );
        }
    }
}

/// Host-side batch, filled by loader workers and moved to the device later.
#[derive(Debug, Default, Clone)]
pub struct BatchData {
    pub stm: Vec<f32>,
    pub nstm: Vec<f32>,
    pub buckets: Vec<u32>,
    pub targets: Vec<f32>,
}

impl BatchData {
    pub fn with_capacity(samples: usize) -> Self {
        Self {
            stm: Vec::with_capacity(samples * NUM_FEATURES),
            nstm: Vec::with_capacity(samples * NUM_FEATURES),
            buckets: Vec::with_capacity(samples),
            targets: Vec::with_capacity(samples),
        }
    }

    pub fn push(&mut self, sample: &TrainingSample) {
        self.stm.extend_from_slice(&sample.stm);
        self.nstm.extend_from_slice(&sample.nstm);
        self.buckets.push(sample.bucket as u32);
        self.targets.push(sample.target);
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn to_batch(self, device: &Device) -> Result<Batch> {
        let len = self.len();
        Ok(Batch {
            stm: Tensor::from_vec(self.stm, (len, NUM_FEATURES), device)?,
            nstm: Tensor::from_vec(self.nstm, (len, NUM_FEATURES), device)?,
            buckets: Tensor::from_vec(self.buckets, (len, 1), device)?,
            targets: Tensor::from_vec(self.targets, (len, 1), device)?,
            len,
        })
    }
}

/// Device tensors for one step. `buckets` is the per-sample output column
/// used to gather the bucketed network output.
pub struct Batch {
    pub stm: Tensor,
    pub nstm: Tensor,
    pub buckets: Tensor,
    pub targets: Tensor,
    pub len: usize,
}

impl Batch {
    pub fn from_samples(samples: &[TrainingSample], device: &Device) -> Result<Self> {
        let mut data = BatchData::with_capacity(samples.len());
        for sample in samples {
            data.push(sample);
        }
        data.to_batch(device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn record(outcome: u8, first: u16) -> PositionRecord {
        PositionRecord {
            side_indices: vec![first, first + 1],
            other_indices: vec![first + 2],
            score_cp: Some(100),
            outcome,
            phase: Some(30),
        }
    }

    fn corpus(format: Format, count: usize) -> Vec<u8> {
        let mut data = Vec::new();
        for i in 0..count {
            record((i % 3) as u8, i as u16).encode(format, &mut data).unwrap();
        }
        data
    }

    #[test]
    fn test_open_drops_trailing_bytes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&corpus(Format::A, 5)).unwrap();
        file.write_all(&[1, 2, 3]).unwrap();

        let samples = Samples::open(file.path(), Format::A).unwrap();
        assert_eq!(samples.len(), 5);
        assert_eq!(samples.record(4).unwrap().side_indices, vec![4, 5]);
    }

    #[test]
    fn test_scan_counts_outcomes_and_invalid_records() {
        let mut data = corpus(Format::D, 6);
        // Corrupt the outcome of the last record.
        let size = Format::D.record_size();
        data[size * 5 + 128] = 7;

        let stats = Samples::from_bytes(data, Format::D).scan();
        assert_eq!(stats.valid, 5);
        assert_eq!(stats.invalid, 1);
        assert_eq!(stats.outcomes, [2, 2, 1]);
    }

    #[test]
    fn test_split_is_disjoint_and_complete() {
        let samples = Samples::from_bytes(corpus(Format::A, 100), Format::A);
        let (train, test) = samples.train_test_indices(0.1, Some(42));

        assert_eq!(test.len(), 10);
        assert_eq!(train.len(), 90);

        let mut all: Vec<usize> = train.iter().chain(&test).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_batch_skips_bad_records() {
        let mut data = corpus(Format::B, 3);
        data[2..4].copy_from_slice(&900u16.to_le_bytes());
        let samples = Samples::from_bytes(data, Format::B);

        let (batch, skipped) = samples.batch(&[0, 1, 2]);
        assert_eq!(skipped, 1);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.stm.len(), 2 * NUM_FEATURES);
        // Phase 30 of 76 with 4 buckets.
        assert_eq!(batch.buckets, vec![1, 1]);
    }

    #[test]
    fn test_batch_tensor_shapes() -> Result<()> {
        let samples = Samples::from_bytes(corpus(Format::A, 4), Format::A);
        let (data, _) = samples.batch(&[0, 1, 2, 3]);
        let batch = data.to_batch(&Device::Cpu)?;

        assert_eq!(batch.len, 4);
        assert_eq!(batch.stm.dims(), &[4, NUM_FEATURES]);
        assert_eq!(batch.nstm.dims(), &[4, NUM_FEATURES]);
        assert_eq!(batch.buckets.dims(), &[4, 1]);
        assert_eq!(batch.targets.dims(), &[4, 1]);
        Ok(())
    }
}
