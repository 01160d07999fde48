//! Circuit Breaker pattern implementation.
//!
//! Bounds a crawl against long stretches of deleted or nonexistent ids.
//!
//! > Once **10** ids in a row fail (fetch failure or rejected payload),
//! > the crawl stops. Any success resets the count to zero.

/// Default number of consecutive failures that opens the breaker.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 10;

/// Circuit breaker configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the breaker (at least 1)
    pub threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_FAILURE_THRESHOLD,
        }
    }
}

/// State after recording an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Keep going
    Closed { consecutive_failures: u32 },
    /// Threshold reached, stop the crawl
    Open { consecutive_failures: u32 },
}

/// Consecutive-failure counter for one crawl.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    consecutive_failures: u32,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with default configuration.
    pub fn new() -> Self {
        Self::with_config(CircuitBreakerConfig::default())
    }

    /// Create a new circuit breaker with custom configuration.
    pub fn with_config(config: CircuitBreakerConfig) -> Self {
        Self {
            config: CircuitBreakerConfig {
                threshold: config.threshold.max(1),
            },
            consecutive_failures: 0,
        }
    }

    pub fn with_threshold(threshold: u32) -> Self {
        Self::with_config(CircuitBreakerConfig { threshold })
    }

    pub fn threshold(&self) -> u32 {
        self.config.threshold
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn record_success(&mut self) -> BreakerState {
        self.consecutive_failures = 0;
        self.state()
    }

    pub fn record_failure(&mut self) -> BreakerState {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.state()
    }

    pub fn is_open(&self) -> bool {
        self.consecutive_failures >= self.config.threshold
    }

    pub fn state(&self) -> BreakerState {
        let consecutive_failures = self.consecutive_failures;
        if self.is_open() {
            BreakerState::Open {
                consecutive_failures,
            }
        } else {
            BreakerState::Closed {
                consecutive_failures,
            }
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}
