// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
use std::cell::{Cell, Ref, RefCell};
use std::convert::Infallible;
use std::rc::Rc;

use embedded_hal::blocking::delay::DelayUs;
use embedded_hal::digital::v2::OutputPin;

/// A manually advanced monotonic clock with microsecond resolution.
#[derive(Clone, Debug, Default)]
pub struct MockClock {
    micros: Rc<Cell<u64>>,
}

impl MockClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now_ms(&self) -> u64 {
        self.micros.get() / 1000
    }

    pub fn now_us(&self) -> u64 {
        self.micros.get()
    }

    pub fn advance_ms(&self, millis: u64) {
        self.advance_us(millis * 1000);
    }

    pub fn advance_us(&self, micros: u64) {
        self.micros.set(self.micros.get() + micros);
    }
}

/// A delay provider that moves a [`MockClock`] forward instead of sleeping.
#[derive(Clone, Debug, Default)]
pub struct MockDelay {
    clock: MockClock,
    delays: Rc<RefCell<Vec<u64>>>,
}

impl MockDelay {
    pub fn new(clock: MockClock) -> Self {
        Self {
            clock,
            delays: Rc::default(),
        }
    }

    /// Every delay requested so far, in microseconds.
    pub fn delays(&self) -> Ref<Vec<u64>> {
        self.delays.borrow()
    }

    pub fn total_us(&self) -> u64 {
        self.delays.borrow().iter().sum()
    }

    fn record(&self, micros: u64) {
        self.delays.borrow_mut().push(micros);
        self.clock.advance_us(micros);
    }
}

impl DelayUs<u32> for MockDelay {
    fn delay_us(&mut self, us: u32) {
        self.record(u64::from(us));
    }
}

/// An output pin that remembers every level it was driven to.
#[derive(Clone, Debug)]
pub struct MockPin {
    levels: Rc<RefCell<Vec<bool>>>,
}

impl MockPin {
    /// Create a pin with the given initial level.
    pub fn new(high: bool) -> Self {
        Self {
            levels: Rc::new(RefCell::new(vec![high])),
        }
    }

    pub fn is_high(&self) -> bool {
        self.levels.borrow().last().copied().unwrap_or(false)
    }

    /// Every level the pin has been at, starting with the initial level.
    pub fn history(&self) -> Ref<Vec<bool>> {
        self.levels.borrow()
    }
}

impl OutputPin for MockPin {
    type Error = Infallible;

    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.levels.borrow_mut().push(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.levels.borrow_mut().push(true);
        Ok(())
    }
}
