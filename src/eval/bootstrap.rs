//! Bootstrap resampling around an existing scorer.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::eval::scorers::Scorer;
use crate::types::ProcessingUnit;

/// Wraps a scorer constructor and reports the distribution of its metric
/// over with-replacement resamples of the unit list.
pub struct BootstrapScorer {
    label: String,
    iterations: usize,
    seed: u64,
    make: Box<dyn Fn() -> Box<dyn Scorer>>,
    samples: Vec<f64>,
}

impl BootstrapScorer {
    /// Wrap `make` with `iterations` resamples under a fixed seed.
    #[must_use]
    pub fn new(
        label: impl Into<String>,
        iterations: usize,
        seed: u64,
        make: Box<dyn Fn() -> Box<dyn Scorer>>,
    ) -> Self {
        Self {
            label: label.into(),
            iterations,
            seed,
            make,
            samples: Vec::new(),
        }
    }

    /// Resample the batch and score each resample with a fresh scorer.
    pub fn run(&mut self, units: &[ProcessingUnit]) {
        let mut rng = StdRng::seed_from_u64(self.seed);
        self.samples.clear();
        if units.is_empty() {
            return;
        }
        for _ in 0..self.iterations {
            let mut scorer = (self.make)();
            for _ in 0..units.len() {
                let pick = rng.gen_range(0..units.len());
                scorer.add_unit(&units[pick]);
            }
            self.samples.push(scorer.f1());
        }
    }

    /// Mean of the sampled metric.
    #[must_use]
    pub fn mean(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }

    /// Sample standard deviation of the metric.
    #[must_use]
    pub fn std_dev(&self) -> f64 {
        if self.samples.len() < 2 {
            return 0.0;
        }
        let mean = self.mean();
        let var = self
            .samples
            .iter()
            .map(|s| (s - mean).powi(2))
            .sum::<f64>()
            / (self.samples.len() - 1) as f64;
        var.sqrt()
    }

    /// Report line.
    #[must_use]
    pub fn detail(&self) -> String {
        format!(
            "bootstrap [{}] over {} resamples: f1={:.4} +/- {:.4}",
            self.label,
            self.samples.len(),
            self.mean(),
            self.std_dev()
        )
    }
}
