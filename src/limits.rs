// ABOUTME: Resource limiter — depth, memory, string, and wall-time budgets consulted by the interpreter

use crate::config::ResourceLimits;
use crate::error::BasicError;
use std::time::{Duration, Instant};

/// Consulted before stack pushes, array allocations, variable allocations,
/// string operations, and periodically between statements (spec §4.I).
///
/// Depth counters follow the Python reference's push/pop pairing: the
/// counter is incremented *before* the overflow check, so a push that
/// overflows still leaves the counter one above the limit; the matching
/// `pop_*` must be called to unwind it back down, exactly as a caller that
/// catches the overflow error and then exits the frame would.
#[derive(Debug, Clone)]
pub struct ResourceLimiter {
    limits: ResourceLimits,
    gosub_depth: usize,
    for_depth: usize,
    while_depth: usize,
    total_bytes: usize,
    started_at: Option<Instant>,
}

impl ResourceLimiter {
    pub fn new(limits: ResourceLimits) -> Self {
        ResourceLimiter {
            limits,
            gosub_depth: 0,
            for_depth: 0,
            while_depth: 0,
            total_bytes: 0,
            started_at: None,
        }
    }

    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    pub fn start_clock(&mut self) {
        self.started_at = Some(Instant::now());
    }

    pub fn push_gosub(&mut self) -> Result<(), BasicError> {
        self.gosub_depth += 1;
        if self.gosub_depth > self.limits.max_gosub_depth {
            Err(BasicError::GosubStackOverflow)
        } else {
            Ok(())
        }
    }

    pub fn pop_gosub(&mut self) {
        self.gosub_depth = self.gosub_depth.saturating_sub(1);
    }

    pub fn push_for(&mut self) -> Result<(), BasicError> {
        self.for_depth += 1;
        if self.for_depth > self.limits.max_for_depth {
            Err(BasicError::ForStackOverflow)
        } else {
            Ok(())
        }
    }

    pub fn pop_for(&mut self) {
        self.for_depth = self.for_depth.saturating_sub(1);
    }

    pub fn push_while(&mut self) -> Result<(), BasicError> {
        self.while_depth += 1;
        if self.while_depth > self.limits.max_while_depth {
            Err(BasicError::WhileStackOverflow)
        } else {
            Ok(())
        }
    }

    pub fn pop_while(&mut self) {
        self.while_depth = self.while_depth.saturating_sub(1);
    }

    pub fn check_string_len(&self, len: usize) -> Result<(), BasicError> {
        if len > self.limits.max_string_len {
            Err(BasicError::StringTooLong)
        } else {
            Ok(())
        }
    }

    pub fn check_array_bytes(&self, bytes: usize) -> Result<(), BasicError> {
        if bytes > self.limits.max_array_bytes {
            Err(BasicError::OutOfMemory)
        } else {
            Ok(())
        }
    }

    /// Allocation is tracked lexically (spec §4.I): callers add on `DIM`/
    /// assignment-to-new-size and subtract on `CLEAR`/`NEW`/`ERASE`.
    pub fn add_bytes(&mut self, bytes: usize) -> Result<(), BasicError> {
        let next = self.total_bytes + bytes;
        if next > self.limits.max_total_bytes {
            return Err(BasicError::OutOfMemory);
        }
        self.total_bytes = next;
        Ok(())
    }

    pub fn remove_bytes(&mut self, bytes: usize) {
        self.total_bytes = self.total_bytes.saturating_sub(bytes);
    }

    pub fn reset_allocations(&mut self) {
        self.total_bytes = 0;
        self.gosub_depth = 0;
        self.for_depth = 0;
        self.while_depth = 0;
    }

    pub fn check_wall_time(&self) -> Result<(), BasicError> {
        if let Some(start) = self.started_at {
            if start.elapsed() > Duration::from_millis(self.limits.max_wall_time_ms) {
                return Err(BasicError::TimeoutError);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LimitPreset;

    #[test]
    fn gosub_overflow_leaves_depth_one_above_limit() {
        let mut limits = ResourceLimits::preset(LimitPreset::Web);
        limits.max_gosub_depth = 3;
        let mut limiter = ResourceLimiter::new(limits);
        for _ in 0..3 {
            limiter.push_gosub().unwrap();
        }
        assert_eq!(limiter.push_gosub(), Err(BasicError::GosubStackOverflow));
        assert_eq!(limiter.gosub_depth, 4);
        limiter.pop_gosub();
        limiter.pop_gosub();
        assert_eq!(limiter.gosub_depth, 2);
    }

    #[test]
    fn array_bytes_over_cap_is_out_of_memory() {
        let mut limits = ResourceLimits::preset(LimitPreset::Web);
        limits.max_array_bytes = 16;
        let limiter = ResourceLimiter::new(limits);
        assert_eq!(limiter.check_array_bytes(17), Err(BasicError::OutOfMemory));
        assert!(limiter.check_array_bytes(16).is_ok());
    }

    #[test]
    fn reset_allocations_clears_depths_and_bytes() {
        let mut limiter = ResourceLimiter::new(ResourceLimits::preset(LimitPreset::Local));
        limiter.push_gosub().unwrap();
        limiter.add_bytes(100).unwrap();
        limiter.reset_allocations();
        assert_eq!(limiter.gosub_depth, 0);
        assert_eq!(limiter.total_bytes, 0);
    }
}
