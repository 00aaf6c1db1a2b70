//! 2-D value buffers moved between accessors.

use crate::error::{CoreError, CoreResult};
use crate::value::UserValue;

/// A `channels x samples` buffer of one user type.
///
/// Most variables are single-channel; the runtime moves whole buffers
/// between accessor endpoints, swapping rather than copying where safe.
#[derive(Debug, Clone, PartialEq)]
pub struct Buffer2D<T> {
    channels: Vec<Vec<T>>,
}

impl<T: UserValue> Buffer2D<T> {
    /// Create a buffer with all elements default-initialised.
    pub fn new(n_channels: usize, n_samples: usize) -> Self {
        Self {
            channels: vec![vec![T::default(); n_samples]; n_channels],
        }
    }

    /// Single-channel buffer, the common case.
    pub fn scalar_shape(n_samples: usize) -> Self {
        Self::new(1, n_samples)
    }

    pub fn n_channels(&self) -> usize {
        self.channels.len()
    }

    /// Samples per channel (0 for an empty buffer).
    pub fn n_samples(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn channel(&self, index: usize) -> &[T] {
        &self.channels[index]
    }

    pub fn channel_mut(&mut self, index: usize) -> &mut Vec<T> {
        &mut self.channels[index]
    }

    /// Swap channel 0 with an external vector. Ownership of the data moves
    /// both ways; this is the cheap path across accessor boundaries.
    pub fn swap_channel0(&mut self, other: &mut Vec<T>) {
        std::mem::swap(&mut self.channels[0], other);
    }

    /// Copy all channels from another buffer of the same shape.
    pub fn copy_from(&mut self, other: &Buffer2D<T>) -> CoreResult<()> {
        if self.n_channels() != other.n_channels() || self.n_samples() != other.n_samples() {
            return Err(CoreError::ShapeMismatch {
                expected: (self.n_channels(), self.n_samples()),
                actual: (other.n_channels(), other.n_samples()),
            });
        }
        for (dst, src) in self.channels.iter_mut().zip(&other.channels) {
            dst.clone_from(src);
        }
        Ok(())
    }

    /// Fill every element of every channel with the same value.
    pub fn fill(&mut self, value: T) {
        for channel in &mut self.channels {
            for slot in channel.iter_mut() {
                *slot = value.clone();
            }
        }
    }

    /// First sample of channel 0, if any.
    pub fn value(&self) -> Option<&T> {
        self.channels.first().and_then(|c| c.first())
    }

    /// Set the first sample of channel 0.
    pub fn set_value(&mut self, value: T) -> CoreResult<()> {
        match self.channels.first_mut().and_then(|c| c.first_mut()) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(CoreError::ShapeMismatch {
                expected: (1, 1),
                actual: (self.n_channels(), self.n_samples()),
            }),
        }
    }
}
