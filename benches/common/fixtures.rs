use rand::Rng;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Value cached by the benchmarks.
#[derive(Clone, Debug, PartialEq)]
pub struct Profile {
    pub id: u64,
    pub display_name: String,
}

#[derive(Debug, thiserror::Error)]
#[error("origin unavailable for '{0}'")]
pub struct OriginDown(String);

/// Slow backing source behind the cache.
///
/// Keys look like `profile:<id>`; ids at or above `population` resolve to
/// nothing. With `fail_every = n`, every n-th call fails.
#[derive(Clone)]
pub struct Origin {
    population: u64,
    latency: Duration,
    fail_every: Option<usize>,
    calls: Arc<AtomicUsize>,
}

impl Origin {
    pub fn new(population: u64, latency: Duration) -> Self {
        Origin {
            population,
            latency,
            fail_every: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing_every(mut self, n: usize) -> Self {
        self.fail_every = Some(n);
        self
    }

    fn resolve(&self, key: &str) -> Result<Option<Profile>, OriginDown> {
        let call = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
        if self.fail_every.is_some_and(|n| call % n == 0) {
            return Err(OriginDown(key.to_string()));
        }

        let id = key.strip_prefix("profile:").and_then(|id| id.parse::<u64>().ok());
        Ok(id.filter(|id| *id < self.population).map(|id| Profile {
            id,
            display_name: format!("profile #{id}"),
        }))
    }

    pub async fn load(&self, key: &str) -> Result<Option<Profile>, OriginDown> {
        tokio::time::sleep(self.latency).await;
        self.resolve(key)
    }

    pub fn load_blocking(&self, key: &str) -> Result<Option<Profile>, OriginDown> {
        std::thread::sleep(self.latency);
        self.resolve(key)
    }

    #[allow(dead_code)]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

/// Key streams for the benchmark workloads.
pub struct Workload {
    population: u64,
}

impl Workload {
    pub fn new(population: u64) -> Self {
        Workload { population }
    }

    fn key(id: u64) -> String {
        format!("profile:{id}")
    }

    /// Every key once, in order.
    pub fn all(&self) -> Vec<String> {
        (0..self.population).map(Self::key).collect()
    }

    /// `count` keys where 80% of requests go to the first fifth of the keys.
    pub fn skewed(&self, count: usize) -> Vec<String> {
        let mut rng = rand::thread_rng();
        let hot = (self.population / 5).max(1);
        (0..count)
            .map(|_| {
                let id = if rng.gen_bool(0.8) {
                    rng.gen_range(0..hot)
                } else {
                    rng.gen_range(0..self.population)
                };
                Self::key(id)
            })
            .collect()
    }

    /// `count` keys of which roughly `hit_ratio` resolve and the rest are
    /// unknown to the origin, so they miss every time.
    pub fn with_unknown(&self, count: usize, hit_ratio: f64) -> Vec<String> {
        let mut rng = rand::thread_rng();
        (0..count)
            .map(|_| {
                if rng.gen_bool(hit_ratio) {
                    Self::key(rng.gen_range(0..self.population))
                } else {
                    Self::key(self.population + rng.gen_range(0..self.population))
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_origin_resolves_known_keys_only() {
        let origin = Origin::new(10, Duration::ZERO);

        let profile = origin.load("profile:3").await.unwrap().unwrap();
        assert_eq!(profile.id, 3);
        assert!(origin.load("profile:10").await.unwrap().is_none());
        assert!(origin.load_blocking("garbage").unwrap().is_none());
        assert_eq!(origin.calls(), 3);
    }

    #[test]
    fn test_origin_fails_every_nth_call() {
        let origin = Origin::new(10, Duration::ZERO).failing_every(2);

        assert!(origin.load_blocking("profile:1").is_ok());
        assert!(origin.load_blocking("profile:1").is_err());
        assert!(origin.load_blocking("profile:1").is_ok());
    }

    #[test]
    fn test_workload_shapes() {
        let workload = Workload::new(100);

        assert_eq!(workload.all().len(), 100);
        assert_eq!(workload.skewed(50).len(), 50);

        let keys = workload.with_unknown(200, 0.0);
        assert!(keys.iter().all(|key| {
            let id: u64 = key.trim_start_matches("profile:").parse().unwrap();
            id >= 100
        }));
    }
}
