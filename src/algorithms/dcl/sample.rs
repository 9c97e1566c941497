//! Training samples produced by DCL sample generation.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, RollplexError};

/// One labelled decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Flat features of the state at the decision.
    pub features: Vec<f64>,
    /// Legality of every action in that state.
    pub mask: Vec<bool>,
    /// Best action found by the rollouts.
    pub label: usize,
    /// Mean rollout value per action, `None` where the action is not allowed.
    pub q_values: Vec<Option<f64>>,
    /// The state itself, for diagnostics.
    pub state: Value,
    /// Generation whose policy produced the state.
    pub generation: usize,
}

/// Samples of one generation, in no particular order across workers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleSet {
    pub samples: Vec<Sample>,
}

impl SampleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, sample: Sample) {
        self.samples.push(sample);
    }

    /// Appends every sample of `other`.
    pub fn extend(&mut self, other: SampleSet) {
        self.samples.extend(other.samples);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    /// Label frequencies, indexed by action.
    pub fn label_counts(&self, num_actions: usize) -> Vec<usize> {
        let mut counts = vec![0; num_actions];
        for sample in &self.samples {
            if let Some(count) = counts.get_mut(sample.label) {
                *count += 1;
            }
        }
        counts
    }

    /// Writes one JSON document per line.
    pub fn save_jsonl(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| RollplexError::io(parent, e))?;
        }
        let file = File::create(path).map_err(|e| RollplexError::io(path, e))?;
        let mut writer = BufWriter::new(file);
        for sample in &self.samples {
            serde_json::to_writer(&mut writer, sample)?;
            writer.write_all(b"\n").map_err(|e| RollplexError::io(path, e))?;
        }
        writer.flush().map_err(|e| RollplexError::io(path, e))
    }

    /// Reads a file written by [`SampleSet::save_jsonl`]; blank lines are skipped.
    pub fn load_jsonl(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| RollplexError::io(path, e))?;
        let mut set = Self::new();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| RollplexError::io(path, e))?;
            if line.trim().is_empty() {
                continue;
            }
            set.add(serde_json::from_str(&line)?);
        }
        Ok(set)
    }
}

impl FromIterator<Sample> for SampleSet {
    fn from_iter<I: IntoIterator<Item = Sample>>(iter: I) -> Self {
        Self {
            samples: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(label: usize) -> Sample {
        Sample {
            features: vec![1.0, 2.5],
            mask: vec![true, true, false],
            label,
            q_values: vec![Some(3.0), Some(2.0), None],
            state: serde_json::json!({ "level": 2 }),
            generation: 1,
        }
    }

    #[test]
    fn add_extend_and_count() {
        let mut set = SampleSet::new();
        assert!(set.is_empty());
        set.add(sample(1));
        set.extend([sample(0), sample(1)].into_iter().collect());
        assert_eq!(set.len(), 3);
        assert_eq!(set.label_counts(3), vec![1, 2, 0]);
    }

    #[test]
    fn jsonl_file_restores_samples() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shards").join("gen1_rank0.jsonl");
        let set: SampleSet = [sample(0), sample(1)].into_iter().collect();
        set.save_jsonl(&path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.lines().all(|l| l.contains("\"q_values\":[3.0,2.0,null]")));
        assert_eq!(SampleSet::load_jsonl(&path).unwrap(), set);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            SampleSet::load_jsonl(&dir.path().join("absent.jsonl")),
            Err(RollplexError::Io { .. })
        ));
    }
}
