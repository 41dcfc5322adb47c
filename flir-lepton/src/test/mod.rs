// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! Shared setup for tests that need a whole [`Lepton`] wired up to mocks.
use flir_lepton_test_data::{MockCci, MockClock, MockDelay, MockPin, MockVoSpi};

use crate::driver::Lepton;
use crate::time::Clock;

/// Lets the mock clock shared with [`MockDelay`] drive the driver's timeouts.
#[derive(Clone, Debug)]
pub(crate) struct MockClockSource(pub(crate) MockClock);

impl Clock for MockClockSource {
    fn now_ms(&mut self) -> u64 {
        self.0.now_ms()
    }
}

pub(crate) type MockLepton = Lepton<MockCci, MockVoSpi, MockPin, MockPin, MockDelay, MockClockSource>;

/// A driver along with handles to the mocks it owns.
pub(crate) struct Harness {
    pub(crate) lepton: MockLepton,
    pub(crate) cci: MockCci,
    pub(crate) spi: MockVoSpi,
    pub(crate) reset: MockPin,
    pub(crate) clock: MockClock,
}

pub(crate) fn mock_lepton(cci: MockCci) -> Harness {
    let clock = MockClock::new();
    let spi = MockVoSpi::new();
    let reset = MockPin::new(true);
    let lepton = Lepton::new(
        cci.clone(),
        spi.clone(),
        MockPin::new(true),
        reset.clone(),
        MockDelay::new(clock.clone()),
        MockClockSource(clock.clone()),
    );
    Harness {
        lepton,
        cci,
        spi,
        reset,
        clock,
    }
}

/// Boot a camera all the way to ready, with the command history cleared.
pub(crate) fn ready_lepton() -> Harness {
    let mut harness = mock_lepton(MockCci::booted());
    harness.lepton.boot().unwrap();
    harness.clock.advance_ms(950);
    assert!(harness.lepton.poll_ready().unwrap());
    harness.cci.clear_recent_operations();
    harness
}
