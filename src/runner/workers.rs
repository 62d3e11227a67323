//! Worker pool sizing and cooperative cancellation

use crate::error::{Result, SurrogateError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Degree of parallelism; `-1` in configuration means every available core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum Workers {
    Fixed(usize),
    All,
}

impl Default for Workers {
    fn default() -> Self {
        Workers::Fixed(1)
    }
}

impl Workers {
    /// Number of threads the pool will run
    pub fn count(self) -> usize {
        match self {
            Workers::Fixed(n) => n,
            Workers::All => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }

    /// Build a dedicated rayon pool of this size
    pub fn build_pool(self) -> Result<rayon::ThreadPool> {
        let threads = match self {
            Workers::Fixed(0) => {
                return Err(SurrogateError::Config(
                    "workers must be at least 1, or -1 for all cores".to_string(),
                ))
            }
            Workers::Fixed(n) => n,
            // zero lets rayon pick one thread per core
            Workers::All => 0,
        };
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("surrogate-worker-{}", i))
            .build()
            .map_err(|e| SurrogateError::Config(format!("failed to build worker pool: {}", e)))
    }
}

impl TryFrom<i64> for Workers {
    type Error = SurrogateError;

    fn try_from(v: i64) -> Result<Self> {
        match v {
            -1 => Ok(Workers::All),
            n if n >= 1 => Ok(Workers::Fixed(n as usize)),
            n => Err(SurrogateError::Config(format!(
                "invalid worker count {}, expected a positive number or -1",
                n
            ))),
        }
    }
}

impl From<Workers> for i64 {
    fn from(w: Workers) -> i64 {
        match w {
            Workers::Fixed(n) => n as i64,
            Workers::All => -1,
        }
    }
}

impl FromStr for Workers {
    type Err = SurrogateError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "all" => Ok(Workers::All),
            _ => s
                .parse::<i64>()
                .map_err(|_| SurrogateError::Config(format!("invalid worker count '{}'", s)))?
                .try_into(),
        }
    }
}

impl fmt::Display for Workers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Workers::Fixed(n) => write!(f, "{}", n),
            Workers::All => write!(f, "all"),
        }
    }
}

/// Shared flag checked between models and folds
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once cancellation was requested
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(SurrogateError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Clear the flag so the token can be reused for another run
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workers_from_config_values() {
        assert_eq!(Workers::try_from(-1).unwrap(), Workers::All);
        assert_eq!(Workers::try_from(4).unwrap(), Workers::Fixed(4));
        assert!(Workers::try_from(0).is_err());
        assert_eq!("all".parse::<Workers>().unwrap(), Workers::All);
        assert_eq!("-1".parse::<Workers>().unwrap(), Workers::All);
    }

    #[test]
    fn test_workers_serde() {
        let json = serde_json::to_string(&Workers::All).unwrap();
        assert_eq!(json, "-1");
        let w: Workers = serde_json::from_str("3").unwrap();
        assert_eq!(w, Workers::Fixed(3));
    }

    #[test]
    fn test_fixed_pool_size() {
        let pool = Workers::Fixed(2).build_pool().unwrap();
        assert_eq!(pool.current_num_threads(), 2);
        assert!(Workers::Fixed(0).build_pool().is_err());
    }

    #[test]
    fn test_cancellation_token_shared() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(token.check().is_ok());
        clone.cancel();
        assert!(matches!(token.check(), Err(SurrogateError::Cancelled)));
        token.reset();
        assert!(!clone.is_cancelled());
    }
}
