//! Propagated spike buffer
//!
//! A time-indexed ring holding externally generated spikes (Poisson rate
//! sources, user callbacks) until their delivery ms. Generators fill it a
//! whole time slice at once; the kernel drains exactly one slot per ms and
//! advances the cursor.

use crate::error::{KernelError, Result};

/// Ring buffer of scheduled input spikes, one slot per future ms
#[derive(Debug)]
pub struct PropagatedSpikeBuffer {
    slots: Vec<Vec<u32>>,
    cursor: usize,
}

impl PropagatedSpikeBuffer {
    /// Create a buffer able to hold spikes up to `horizon_ms - 1` ms ahead
    pub fn new(horizon_ms: u32) -> Self {
        Self {
            slots: vec![Vec::new(); horizon_ms.max(1) as usize],
            cursor: 0,
        }
    }

    /// Schedule a spike of `neuron` for `delay_ms` ms from the current slot
    pub fn schedule(&mut self, neuron: u32, delay_ms: u32) -> Result<()> {
        if delay_ms as usize >= self.slots.len() {
            return Err(KernelError::invalid_parameter(
                "delay_ms",
                delay_ms.to_string(),
                format!("< {}", self.slots.len()),
            ));
        }
        let slot = (self.cursor + delay_ms as usize) % self.slots.len();
        self.slots[slot].push(neuron);
        Ok(())
    }

    /// Take all spikes due at the current ms, in scheduling order
    pub fn drain_current(&mut self) -> Vec<u32> {
        std::mem::take(&mut self.slots[self.cursor])
    }

    /// Advance the time cursor to the next ms
    pub fn advance(&mut self) {
        self.slots[self.cursor].clear();
        self.cursor = (self.cursor + 1) % self.slots.len();
    }

    /// Number of spikes currently scheduled
    pub fn len(&self) -> usize {
        self.slots.iter().map(Vec::len).sum()
    }

    /// Whether no spikes are scheduled
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Vec::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_and_drain() {
        let mut buf = PropagatedSpikeBuffer::new(10);
        buf.schedule(3, 0).unwrap();
        buf.schedule(4, 2).unwrap();
        buf.schedule(5, 2).unwrap();

        assert_eq!(buf.drain_current(), vec![3]);
        buf.advance();
        assert_eq!(buf.drain_current(), Vec::<u32>::new());
        buf.advance();
        assert_eq!(buf.drain_current(), vec![4, 5]);
        buf.advance();
        assert!(buf.is_empty());
    }

    #[test]
    fn test_wraparound() {
        let mut buf = PropagatedSpikeBuffer::new(3);
        for _ in 0..5 {
            buf.advance();
        }
        buf.schedule(9, 2).unwrap();
        buf.advance();
        buf.advance();
        assert_eq!(buf.drain_current(), vec![9]);
    }

    #[test]
    fn test_delay_beyond_horizon() {
        let mut buf = PropagatedSpikeBuffer::new(4);
        assert!(buf.schedule(0, 3).is_ok());
        assert!(buf.schedule(0, 4).is_err());
    }

    #[test]
    fn test_len() {
        let mut buf = PropagatedSpikeBuffer::new(4);
        buf.schedule(0, 1).unwrap();
        buf.schedule(1, 1).unwrap();
        assert_eq!(buf.len(), 2);
        buf.advance();
        buf.drain_current();
        assert!(buf.is_empty());
    }
}
