// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Retry policy for failed calls.

use cloudcall_core::{Error, Result};
use rand::Rng;
use std::time::Duration;

/// RetryPolicy decides whether and when a failed call is issued again.
///
/// Delays follow exponential backoff with full jitter: attempt `n` sleeps a
/// uniformly random duration in `[0, min(max_delay, base_delay * 2^(n-1))]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(20),
        }
    }
}

impl RetryPolicy {
    /// Create a policy allowing `max_attempts` attempts in total.
    pub fn new(max_attempts: u32) -> Result<Self> {
        if max_attempts == 0 {
            return Err(Error::config_invalid("max_attempts must be at least 1"));
        }
        Ok(Self {
            max_attempts,
            ..Self::default()
        })
    }

    /// A policy that never retries.
    pub fn never() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Set the delay before the first retry.
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the upper bound of a single delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Attempts allowed in total, the first one included.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether a call that failed with `err` on attempt `attempt` (1-based)
    /// should be issued again.
    pub fn should_retry(&self, attempt: u32, err: &Error) -> bool {
        attempt < self.max_attempts && err.is_retryable()
    }

    /// Upper bound of the delay after attempt `attempt` (1-based).
    pub fn max_backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exp)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Jittered delay after attempt `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let cap = self.max_backoff(attempt);
        if cap.is_zero() {
            return cap;
        }
        let millis = rand::thread_rng().gen_range(0..=cap.as_millis() as u64);
        Duration::from_millis(millis)
    }
}
