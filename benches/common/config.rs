use std::env;
use std::time::Duration;

/// Benchmark knobs, overridable through environment variables.
#[derive(Debug, Clone)]
pub struct BenchConfig {
    /// `ORIGIN_LATENCY_MS`, default 50.
    pub origin_latency: Duration,
    /// `BENCH_SAMPLE_SIZE`, default 100.
    pub sample_size: usize,
    /// `BENCH_TTL_SECS`, default 60.
    pub ttl: Duration,
    /// `ORIGIN_FAIL_EVERY`: every n-th origin call fails in the failing-origin
    /// benches, default 2.
    pub fail_every: usize,
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

impl BenchConfig {
    pub fn from_env() -> Self {
        let config = BenchConfig {
            origin_latency: Duration::from_millis(env_or("ORIGIN_LATENCY_MS", 50)),
            sample_size: env_or("BENCH_SAMPLE_SIZE", 100),
            ttl: Duration::from_secs(env_or("BENCH_TTL_SECS", 60)),
            fail_every: env_or("ORIGIN_FAIL_EVERY", 2).max(1),
        };
        eprintln!("{config:#?}");
        config
    }
}
