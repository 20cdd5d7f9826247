//! Fixed-capacity sliding window of candles

use std::collections::VecDeque;

use crate::{Candle, Period, Result};

/// FIFO window of the most recent candles, in chronological order.
///
/// Appending past capacity evicts the oldest candle. Malformed candles are
/// rejected and leave the buffer untouched.
#[derive(Debug, Clone)]
pub struct CandleBuffer {
    candles: VecDeque<Candle>,
    capacity: usize,
}

impl CandleBuffer {
    pub fn with_capacity(capacity: Period) -> Self {
        Self {
            candles: VecDeque::with_capacity(capacity.get()),
            capacity: capacity.get(),
        }
    }

    pub fn new(capacity: usize) -> Result<Self> {
        Ok(Self::with_capacity(Period::new(capacity)?))
    }

    pub fn append(&mut self, candle: Candle) -> Result<()> {
        candle.validate()?;
        if self.candles.len() == self.capacity {
            self.candles.pop_front();
        }
        self.candles.push_back(candle);
        Ok(())
    }

    /// Owned copy of the window, oldest first.
    pub fn snapshot(&self) -> Vec<Candle> {
        self.candles.iter().copied().collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.candles.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candle> {
        self.candles.iter()
    }
}
