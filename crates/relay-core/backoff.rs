use rand::Rng;

/// Idle-loop backoff, indexed by consecutive empty fetches and saturating at
/// the last entry.
pub const IDLE_BACKOFF_MS: [u64; 5] = [0, 10, 100, 1000, 5000];

pub fn idle_backoff(consecutive_empty_fetches: usize) -> std::time::Duration {
    let idx = consecutive_empty_fetches.min(IDLE_BACKOFF_MS.len() - 1);
    std::time::Duration::from_millis(IDLE_BACKOFF_MS[idx])
}

/// Default per-job retry backoff in seconds: `fails^4 + 15 + rand(0,30)*(fails+1)`.
pub fn default_backoff(fails: u32) -> i64 {
    let fails = fails as i64;
    let jitter = rand::thread_rng().gen_range(0..30);
    fails.pow(4) + 15 + jitter * (fails + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_backoff_saturates() {
        assert_eq!(idle_backoff(0).as_millis(), 0);
        assert_eq!(idle_backoff(4).as_millis(), 5000);
        assert_eq!(idle_backoff(100).as_millis(), 5000);
    }

    #[test]
    fn default_backoff_grows_with_fails() {
        // Lower bound of the formula (jitter term is 0) is monotonic in fails.
        let lower = |f: u32| (f as i64).pow(4) + 15;
        for f in 0..10 {
            let b = default_backoff(f);
            assert!(b >= lower(f));
        }
    }
}
