use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use rand::Rng;

use crate::error::ConfigError;

// =============================================================================
// Configuration
// =============================================================================

#[derive(Parser, Debug, Clone)]
#[command(name = "tcp-churn")]
#[command(about = "Randomized TCP connection churn load generator", long_about = None)]
pub struct Config {
    /// Target host
    #[arg(long, env = "CHURN_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Target port
    #[arg(long, env = "CHURN_PORT", default_value = "3333")]
    pub port: u16,

    /// Number of concurrent workers
    #[arg(long, env = "CHURN_WORKERS", default_value = "200")]
    pub workers: usize,

    /// Sessions each worker runs, drawn once per worker ("N" or "MIN-MAX")
    #[arg(long, env = "CHURN_ITERATIONS", default_value = "0-19")]
    pub iterations: Bounds,

    /// Chance that a session sends a burst after connecting
    #[arg(long, env = "CHURN_BURST_PROBABILITY", default_value = "0.2")]
    pub burst_probability: f64,

    /// Sends per burst
    #[arg(long, env = "CHURN_BURST_SENDS", default_value = "0-99")]
    pub burst_sends: Bounds,

    /// Token repeated to build each payload line
    #[arg(long, env = "CHURN_PAYLOAD_TOKEN", default_value = "foo")]
    pub payload_token: String,

    /// Token repetitions per payload line
    #[arg(long, env = "CHURN_PAYLOAD_REPEATS", default_value = "0-9")]
    pub payload_repeats: Bounds,

    /// Chance that a session closes its connection instead of abandoning it
    #[arg(long, env = "CHURN_CLOSE_PROBABILITY", default_value = "0.8")]
    pub close_probability: f64,

    /// Chance to stop draining after each successful read
    #[arg(long, env = "CHURN_EARLY_EXIT_PROBABILITY", default_value = "0.5")]
    pub early_exit_probability: f64,

    /// Maximum bytes per read
    #[arg(long, env = "CHURN_READ_CHUNK", default_value = "65535")]
    pub read_chunk: usize,

    /// How long a drain read waits for data; 0 polls without waiting
    #[arg(long, env = "CHURN_READ_IDLE_MS", default_value = "0")]
    pub read_idle_ms: u64,

    /// Connect deadline in milliseconds
    #[arg(long, env = "CHURN_CONNECT_TIMEOUT_MS", default_value = "5000")]
    pub connect_timeout_ms: u64,

    /// Per-write deadline in milliseconds
    #[arg(long, env = "CHURN_WRITE_TIMEOUT_MS", default_value = "5000")]
    pub write_timeout_ms: u64,

    /// Upper bound of the think time after connecting
    #[arg(long, env = "CHURN_THINK_TIME_MS", default_value = "1000")]
    pub think_time_ms: u64,

    /// Upper bound of the pause after each burst send
    #[arg(long, env = "CHURN_SEND_PAUSE_MS", default_value = "10")]
    pub send_pause_ms: u64,

    /// Upper bound of the pause before the close decision
    #[arg(long, env = "CHURN_LINGER_MS", default_value = "1000")]
    pub linger_ms: u64,

    /// Pause after a worker's last session before it reports done
    #[arg(long, env = "CHURN_COOLDOWN_MS", default_value = "11000")]
    pub cooldown_ms: u64,

    /// Status line cadence
    #[arg(long, env = "CHURN_REPORT_INTERVAL_MS", default_value = "1000")]
    pub report_interval_ms: u64,

    /// How session delays are drawn from their bounds
    #[arg(long, env = "CHURN_PACING", value_enum, default_value = "jittered")]
    pub pacing: Pacing,

    /// Status line format
    #[arg(long, env = "CHURN_REPORT_FORMAT", value_enum, default_value = "text")]
    pub report_format: ReportFormat,

    /// Seed for reproducible runs; worker i uses seed + i
    #[arg(long, env = "CHURN_SEED")]
    pub seed: Option<u64>,
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("burst_probability", self.burst_probability),
            ("close_probability", self.close_probability),
            ("early_exit_probability", self.early_exit_probability),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Probability { name, value });
            }
        }

        if self.workers == 0 {
            return Err(ConfigError::Zero { name: "workers" });
        }
        if self.read_chunk == 0 {
            return Err(ConfigError::Zero { name: "read_chunk" });
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::Zero {
                name: "connect_timeout_ms",
            });
        }
        if self.write_timeout_ms == 0 {
            return Err(ConfigError::Zero {
                name: "write_timeout_ms",
            });
        }
        if self.report_interval_ms == 0 {
            return Err(ConfigError::Zero {
                name: "report_interval_ms",
            });
        }

        Ok(())
    }

    pub fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn read_idle(&self) -> Duration {
        Duration::from_millis(self.read_idle_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn think_time(&self) -> Duration {
        Duration::from_millis(self.think_time_ms)
    }

    pub fn send_pause(&self) -> Duration {
        Duration::from_millis(self.send_pause_ms)
    }

    pub fn linger(&self) -> Duration {
        Duration::from_millis(self.linger_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms)
    }
}

// =============================================================================
// Bounds
// =============================================================================

/// Inclusive range a random count is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub min: u32,
    pub max: u32,
}

impl Bounds {
    pub fn new(min: u32, max: u32) -> Result<Self, ConfigError> {
        if min > max {
            return Err(ConfigError::Bounds {
                input: format!("{}-{}", min, max),
                reason: "min exceeds max",
            });
        }
        Ok(Self { min, max })
    }

    pub fn fixed(n: u32) -> Self {
        Self { min: n, max: n }
    }

    pub fn sample<R: Rng>(&self, rng: &mut R) -> u32 {
        rng.random_range(self.min..=self.max)
    }
}

impl FromStr for Bounds {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = |reason| ConfigError::Bounds {
            input: s.to_string(),
            reason,
        };
        let parse = |part: &str| part.trim().parse::<u32>().map_err(|_| bad("not a number"));

        match s.split_once('-') {
            Some((min, max)) => Self::new(parse(min)?, parse(max)?),
            None => Ok(Self::fixed(parse(s)?)),
        }
    }
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.min == self.max {
            write!(f, "{}", self.min)
        } else {
            write!(f, "{}-{}", self.min, self.max)
        }
    }
}

// =============================================================================
// Pacing
// =============================================================================

/// Strategy turning a delay bound into an actual delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Pacing {
    /// Uniform in [0, bound)
    Jittered,
    /// Exactly the bound
    Fixed,
    /// Never wait
    Immediate,
}

impl Pacing {
    pub fn delay<R: Rng>(&self, rng: &mut R, bound: Duration) -> Duration {
        match self {
            Pacing::Jittered if bound.is_zero() => Duration::ZERO,
            Pacing::Jittered => bound.mul_f64(rng.random::<f64>()),
            Pacing::Fixed => bound,
            Pacing::Immediate => Duration::ZERO,
        }
    }

    pub async fn pause<R: Rng>(&self, rng: &mut R, bound: Duration) {
        let delay = self.delay(rng, bound);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    Text,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn defaults_match_classic_load_profile() {
        let config = Config::parse_from(["tcp-churn"]);
        assert_eq!(config.target(), "127.0.0.1:3333");
        assert_eq!(config.workers, 200);
        assert_eq!(config.iterations, Bounds::new(0, 19).unwrap());
        assert_eq!(config.burst_sends, Bounds::new(0, 99).unwrap());
        assert_eq!(config.payload_repeats, Bounds::new(0, 9).unwrap());
        assert_eq!(config.cooldown(), Duration::from_secs(11));
        assert_eq!(config.read_chunk, 65535);
        assert_eq!(config.read_idle(), Duration::ZERO);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_fixed_and_ranged_bounds() {
        assert_eq!("7".parse::<Bounds>().unwrap(), Bounds::fixed(7));
        assert_eq!(
            "2-5".parse::<Bounds>().unwrap(),
            Bounds { min: 2, max: 5 }
        );
        assert!("5-2".parse::<Bounds>().is_err());
        assert!("x".parse::<Bounds>().is_err());
    }

    #[test]
    fn rejects_out_of_range_probability() {
        let mut config = Config::parse_from(["tcp-churn"]);
        config.close_probability = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Probability {
                name: "close_probability",
                ..
            })
        ));
    }

    #[test]
    fn rejects_zero_workers() {
        let config = Config::parse_from(["tcp-churn", "--workers", "0"]);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Zero { name: "workers" })
        ));
    }

    #[test]
    fn samples_stay_within_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let bounds = Bounds::new(3, 6).unwrap();
        for _ in 0..1000 {
            let n = bounds.sample(&mut rng);
            assert!((3..=6).contains(&n));
        }
        assert_eq!(Bounds::fixed(4).sample(&mut rng), 4);
    }

    #[test]
    fn pacing_strategies() {
        let mut rng = StdRng::seed_from_u64(1);
        let bound = Duration::from_millis(100);

        assert_eq!(Pacing::Immediate.delay(&mut rng, bound), Duration::ZERO);
        assert_eq!(Pacing::Fixed.delay(&mut rng, bound), bound);
        assert_eq!(
            Pacing::Jittered.delay(&mut rng, Duration::ZERO),
            Duration::ZERO
        );
        for _ in 0..100 {
            assert!(Pacing::Jittered.delay(&mut rng, bound) < bound);
        }
    }
}
