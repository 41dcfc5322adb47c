// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
use std::cell::{Cell, Ref, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use embedded_hal::blocking::spi;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MockSpiError {
    /// A transfer asked for more bytes than are queued.
    StreamExhausted { requested: usize, available: usize },

    /// A failure requested by the test.
    Injected,
}

/// A VoSPI bus that plays back a queued byte stream.
///
/// Each transfer consumes bytes from the front of the queue. Clones share the same queue, so a
/// test can keep a handle to feed more packets after the driver has taken ownership.
#[derive(Clone, Debug, Default)]
pub struct MockVoSpi {
    stream: Rc<RefCell<VecDeque<u8>>>,
    transfers: Rc<RefCell<Vec<usize>>>,
    fail_next: Rc<Cell<bool>>,
}

impl MockVoSpi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_bytes(&self, bytes: &[u8]) {
        self.stream.borrow_mut().extend(bytes.iter().copied());
    }

    /// The number of bytes still queued.
    pub fn remaining(&self) -> usize {
        self.stream.borrow().len()
    }

    /// The length of every transfer performed, oldest first.
    pub fn transfers(&self) -> Ref<Vec<usize>> {
        self.transfers.borrow()
    }

    pub fn clear(&self) {
        self.stream.borrow_mut().clear();
        self.transfers.borrow_mut().clear();
    }

    pub fn fail_next_transfer(&self) {
        self.fail_next.set(true);
    }
}

impl spi::Transfer<u8> for MockVoSpi {
    type Error = MockSpiError;

    fn transfer<'w>(&mut self, words: &'w mut [u8]) -> Result<&'w [u8], Self::Error> {
        if self.fail_next.replace(false) {
            return Err(MockSpiError::Injected);
        }
        let mut stream = self.stream.borrow_mut();
        if stream.len() < words.len() {
            return Err(MockSpiError::StreamExhausted {
                requested: words.len(),
                available: stream.len(),
            });
        }
        let length = words.len();
        words
            .iter_mut()
            .zip(stream.drain(..length))
            .for_each(|(dest, src)| *dest = src);
        self.transfers.borrow_mut().push(length);
        Ok(words)
    }
}
