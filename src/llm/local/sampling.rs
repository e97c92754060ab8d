use rand::distributions::{ Distribution, WeightedIndex };
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::ResponderError;
use crate::llm::GenerationConfig;

/// Picks the next token from a logits row. Greedy unless `do_sample` is set.
pub struct LogitsSampler {
    rng: StdRng,
    do_sample: bool,
    temperature: f64,
    top_k: usize,
    top_p: f64,
}

impl LogitsSampler {
    pub fn new(config: &GenerationConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng,
            do_sample: config.do_sample,
            temperature: config.temperature,
            top_k: config.top_k,
            top_p: config.top_p,
        }
    }

    pub fn sample(&mut self, logits: &[f32]) -> Result<u32, ResponderError> {
        if logits.is_empty() {
            return Err(ResponderError::Config("cannot sample from an empty logits row".into()));
        }
        if !self.do_sample {
            return Ok(argmax(logits));
        }

        // (token, probability) sorted by probability, highest first
        let mut candidates = softmax(logits, self.temperature);
        candidates.sort_by(|a, b| b.1.total_cmp(&a.1));

        if self.top_k > 0 && self.top_k < candidates.len() {
            candidates.truncate(self.top_k);
        }

        if self.top_p < 1.0 {
            let mut cumulative = 0.0;
            let mut keep = candidates.len();
            for (i, (_, p)) in candidates.iter().enumerate() {
                cumulative += *p;
                if cumulative >= self.top_p {
                    keep = i + 1;
                    break;
                }
            }
            candidates.truncate(keep);
        }

        let weights: Vec<f64> = candidates.iter().map(|(_, p)| *p).collect();
        let dist = WeightedIndex::new(&weights).map_err(|e|
            ResponderError::Config(format!("invalid sampling distribution: {}", e))
        )?;
        Ok(candidates[dist.sample(&mut self.rng)].0)
    }
}

fn argmax(logits: &[f32]) -> u32 {
    let mut best = 0;
    for (i, v) in logits.iter().enumerate() {
        if *v > logits[best] {
            best = i;
        }
    }
    best as u32
}

fn softmax(logits: &[f32], temperature: f64) -> Vec<(u32, f64)> {
    let max = logits
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(f32::NEG_INFINITY, f32::max) as f64;
    let exps: Vec<f64> = logits
        .iter()
        .map(|v| {
            let v = *v as f64;
            if v.is_finite() { ((v - max) / temperature).exp() } else { 0.0 }
        })
        .collect();
    let total: f64 = exps.iter().sum();
    exps.into_iter()
        .enumerate()
        .map(|(i, e)| (i as u32, if total > 0.0 { e / total } else { 0.0 }))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sampling(seed: u64) -> GenerationConfig {
        GenerationConfig { do_sample: true, seed: Some(seed), ..Default::default() }
    }

    #[test]
    fn greedy_takes_first_maximum() {
        let mut sampler = LogitsSampler::new(&GenerationConfig::default());
        assert_eq!(sampler.sample(&[0.1, 3.0, 3.0, -1.0]).unwrap(), 1);
        assert_eq!(sampler.sample(&[0.0, 0.0, 0.0]).unwrap(), 0);
    }

    #[test]
    fn empty_row_is_an_error() {
        let mut sampler = LogitsSampler::new(&GenerationConfig::default());
        assert!(sampler.sample(&[]).is_err());
    }

    #[test]
    fn top_k_one_is_greedy() {
        let config = GenerationConfig { top_k: 1, ..sampling(3) };
        let mut sampler = LogitsSampler::new(&config);
        for _ in 0..20 {
            assert_eq!(sampler.sample(&[0.5, 0.2, 4.0, 1.0]).unwrap(), 2);
        }
    }

    #[test]
    fn top_p_drops_the_tail() {
        let config = GenerationConfig { top_k: 0, top_p: 0.5, ..sampling(11) };
        let mut sampler = LogitsSampler::new(&config);
        // token 0 holds almost all of the mass
        for _ in 0..20 {
            assert_eq!(sampler.sample(&[10.0, 0.0, 0.0, 0.0]).unwrap(), 0);
        }
    }

    #[test]
    fn seeded_sampling_is_reproducible() {
        let logits = [1.0, 1.1, 0.9, 1.05, 0.95];
        let draw = |seed| {
            let mut sampler = LogitsSampler::new(&sampling(seed));
            (0..16).map(|_| sampler.sample(&logits).unwrap()).collect::<Vec<_>>()
        };
        assert_eq!(draw(42), draw(42));
    }

    #[test]
    fn masked_logits_are_never_sampled() {
        let config = GenerationConfig { top_k: 0, ..sampling(5) };
        let mut sampler = LogitsSampler::new(&config);
        for _ in 0..50 {
            let token = sampler.sample(&[f32::NEG_INFINITY, 0.0, f32::NEG_INFINITY]).unwrap();
            assert_eq!(token, 1);
        }
    }
}
