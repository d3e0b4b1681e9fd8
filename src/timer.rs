//! Step counters
//!
//! `Counter` is a free-running, width-bounded counter with optional
//! synchronous reset and count-enable inputs. `Timeout` asserts once a
//! configured number of steps has elapsed since its last reset.

use bitflags::bitflags;

use crate::bits::mask;
use crate::{Result, SataError};

bitflags! {
    /// Optional control inputs of a counter, fixed at construction
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CounterControls: u8 {
        /// Synchronous reset, wins over enable
        const RESET = 1 << 0;
        /// Count only while enabled
        const ENABLE = 1 << 1;
    }
}

/// Control input levels for one step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CounterInputs {
    pub reset: bool,
    pub ce: bool,
}

impl CounterInputs {
    pub const IDLE: Self = Self { reset: false, ce: false };
    pub const COUNT: Self = Self { reset: false, ce: true };
    pub const RESET: Self = Self { reset: true, ce: false };
}

/// Counter wrapping modulo 2^width
#[derive(Debug, Clone)]
pub struct Counter {
    width: u32,
    value: u64,
    controls: CounterControls,
}

impl Counter {
    /// Free-running counter, no control inputs
    pub fn new(width: u32) -> Result<Self> {
        Self::with_controls(width, CounterControls::empty())
    }

    pub fn with_controls(width: u32, controls: CounterControls) -> Result<Self> {
        if width == 0 || width > 64 {
            return Err(SataError::InvalidWidth(width));
        }
        Ok(Self {
            width,
            value: 0,
            controls,
        })
    }

    pub fn value(&self) -> u64 {
        self.value
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn controls(&self) -> CounterControls {
        self.controls
    }

    /// Advance one step
    ///
    /// Inputs without a matching control are ignored.
    pub fn step(&mut self, inputs: CounterInputs) {
        if self.controls.contains(CounterControls::RESET) && inputs.reset {
            self.value = 0;
        } else if !self.controls.contains(CounterControls::ENABLE) || inputs.ce {
            self.value = self.value.wrapping_add(1) & mask(self.width);
        }
    }
}

/// Elapsed-steps detector
#[derive(Debug, Clone)]
pub struct Timeout {
    length: u64,
    count: u64,
}

impl Timeout {
    pub fn new(length: u64) -> Self {
        Self { length, count: 0 }
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    /// Steps counted since the last reset, capped at `length`
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn reached(&self) -> bool {
        self.count == self.length
    }

    /// Advance one step; `reset` restarts the count from zero
    pub fn step(&mut self, reset: bool) {
        if reset {
            self.count = 0;
        } else if self.count < self.length {
            self.count += 1;
            if self.count == self.length {
                log::trace!("timeout of {} steps reached", self.length);
            }
        }
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_wraps() {
        let mut c = Counter::new(2).unwrap();
        let seen: Vec<u64> = (0..5)
            .map(|_| {
                c.step(CounterInputs::IDLE);
                c.value()
            })
            .collect();
        assert_eq!(seen, vec![1, 2, 3, 0, 1]);
    }

    #[test]
    fn test_counter_full_width() {
        let mut c = Counter::new(64).unwrap();
        c.value = u64::MAX;
        c.step(CounterInputs::IDLE);
        assert_eq!(c.value(), 0);
        assert!(matches!(Counter::new(0), Err(SataError::InvalidWidth(0))));
        assert!(Counter::new(65).is_err());
    }

    #[test]
    fn test_counter_enable() {
        let mut c = Counter::with_controls(8, CounterControls::ENABLE).unwrap();
        c.step(CounterInputs::IDLE);
        assert_eq!(c.value(), 0);
        c.step(CounterInputs::COUNT);
        c.step(CounterInputs::COUNT);
        assert_eq!(c.value(), 2);
        // no reset control: reset input is ignored
        c.step(CounterInputs { reset: true, ce: true });
        assert_eq!(c.value(), 3);
    }

    #[test]
    fn test_counter_reset_wins() {
        let mut c = Counter::with_controls(8, CounterControls::RESET | CounterControls::ENABLE).unwrap();
        c.step(CounterInputs::COUNT);
        c.step(CounterInputs::COUNT);
        c.step(CounterInputs { reset: true, ce: true });
        assert_eq!(c.value(), 0);
    }

    #[test]
    fn test_timeout_asserts_after_length() {
        let mut t = Timeout::new(5);
        for _ in 0..4 {
            t.step(false);
            assert!(!t.reached());
        }
        t.step(false);
        assert!(t.reached());
        // stays asserted until reset
        t.step(false);
        assert!(t.reached());
        assert_eq!(t.count(), 5);
    }

    #[test]
    fn test_timeout_reset_delays() {
        let k = 3;
        let mut t = Timeout::new(5);
        let mut first = None;
        for step in 0..20 {
            t.step(step == k);
            if t.reached() && first.is_none() {
                first = Some(step);
            }
        }
        assert_eq!(first, Some(k + 5));
    }

    #[test]
    fn test_timeout_zero_length() {
        let mut t = Timeout::new(0);
        assert!(t.reached());
        t.step(false);
        assert!(t.reached());
        t.reset();
        assert!(t.reached());
    }
}
