//! # Run Budget
//!
//! Caps the number and token cost of text-generation calls in one run.

use crate::error::BudgetExceeded;
use crate::skills::generation::Usage;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Limits for one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetLimits {
    pub max_calls: u32,
    pub max_tokens: u64,
}

impl Default for BudgetLimits {
    fn default() -> Self {
        Self {
            max_calls: 20,
            max_tokens: 25_000,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Spent {
    calls: u32,
    tokens: u64,
}

/// Run-wide usage meter
#[derive(Debug)]
pub struct UsageMeter {
    limits: BudgetLimits,
    spent: Mutex<Spent>,
}

impl UsageMeter {
    pub fn new(limits: BudgetLimits) -> Self {
        Self {
            limits,
            spent: Mutex::new(Spent::default()),
        }
    }

    fn exceeded(&self, spent: Spent) -> BudgetExceeded {
        BudgetExceeded {
            calls: spent.calls,
            max_calls: self.limits.max_calls,
            tokens: spent.tokens,
            max_tokens: self.limits.max_tokens,
        }
    }

    /// Claim one call before it is made
    pub fn reserve_call(&self) -> Result<(), BudgetExceeded> {
        let mut spent = self.spent.lock().unwrap_or_else(|e| e.into_inner());
        if spent.calls >= self.limits.max_calls || spent.tokens >= self.limits.max_tokens {
            let mut attempted = *spent;
            attempted.calls += 1;
            return Err(self.exceeded(attempted));
        }
        spent.calls += 1;
        Ok(())
    }

    /// Charge the tokens a finished call used
    pub fn charge(&self, usage: Usage) -> Result<(), BudgetExceeded> {
        let mut spent = self.spent.lock().unwrap_or_else(|e| e.into_inner());
        spent.tokens += usage.total();
        if spent.tokens > self.limits.max_tokens {
            return Err(self.exceeded(*spent));
        }
        Ok(())
    }

    pub fn calls(&self) -> u32 {
        self.spent.lock().unwrap_or_else(|e| e.into_inner()).calls
    }

    pub fn tokens(&self) -> u64 {
        self.spent.lock().unwrap_or_else(|e| e.into_inner()).tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_quota() {
        let meter = UsageMeter::new(BudgetLimits {
            max_calls: 2,
            max_tokens: 1_000,
        });
        tokio_test::assert_ok!(meter.reserve_call());
        tokio_test::assert_ok!(meter.reserve_call());
        let err = meter.reserve_call().unwrap_err();
        assert_eq!(err.calls, 3);
        assert_eq!(err.max_calls, 2);
        assert_eq!(meter.calls(), 2);
    }

    #[test]
    fn test_token_quota() {
        let meter = UsageMeter::new(BudgetLimits {
            max_calls: 10,
            max_tokens: 100,
        });
        meter.reserve_call().unwrap();
        meter
            .charge(Usage {
                input_tokens: 60,
                output_tokens: 30,
            })
            .unwrap();
        meter.reserve_call().unwrap();
        let err = meter
            .charge(Usage {
                input_tokens: 20,
                output_tokens: 0,
            })
            .unwrap_err();
        assert_eq!(err.tokens, 110);
        assert!(meter.reserve_call().is_err());
    }
}
