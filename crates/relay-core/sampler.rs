use rand::Rng;

/// Produces a randomized, priority-weighted permutation of job-type indices
/// each time it's called: weighted-without-replacement sampling via
/// `u_i = rand()^(1/priority_i)`, sorted descending. Higher-priority types
/// land earlier more often without ever being guaranteed first.
pub struct Sampler {
    priorities: Vec<u32>,
}

impl Sampler {
    pub fn new(priorities: Vec<u32>) -> Self {
        Sampler { priorities }
    }

    pub fn len(&self) -> usize {
        self.priorities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.priorities.is_empty()
    }

    /// Return job-type indices (0..len) in sampled order for one fetch attempt.
    pub fn sample_order(&self) -> Vec<usize> {
        let mut rng = rand::thread_rng();
        let mut scored: Vec<(f64, usize)> = self
            .priorities
            .iter()
            .enumerate()
            .map(|(idx, &priority)| {
                let u: f64 = rng.gen_range(f64::EPSILON..1.0);
                let weight = u.powf(1.0 / priority.max(1) as f64);
                (weight, idx)
            })
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap());
        scored.into_iter().map(|(_, idx)| idx).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_order_is_a_permutation() {
        let sampler = Sampler::new(vec![1, 5, 10, 1]);
        let mut order = sampler.sample_order();
        order.sort();
        assert_eq!(order, vec![0, 1, 2, 3]);
    }

    #[test]
    fn higher_priority_wins_first_slot_more_often() {
        let sampler = Sampler::new(vec![1, 100]);
        let trials = 500;
        let high_first = (0..trials)
            .filter(|_| sampler.sample_order()[0] == 1)
            .count();
        // Not deterministic, but overwhelmingly biased toward index 1.
        assert!(high_first > trials / 2);
    }

    #[test]
    fn empty_sampler_yields_empty_order() {
        let sampler = Sampler::new(vec![]);
        assert!(sampler.sample_order().is_empty());
        assert!(sampler.is_empty());
    }
}
