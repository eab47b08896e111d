use serde::{Deserialize, Serialize};

use crate::error::NavigationError;
use crate::models::{Batch, Direction, ImageId, SourceDescriptor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CursorState {
    Empty,
    Positioned(usize),
}

/// Navigation state over one batch
///
/// A plain value: `Empty` or `Positioned(index)` over an immutable list of
/// identifiers. Failed navigation never moves the cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSession {
    batch: Batch,
    state: CursorState,
}

impl Default for BatchSession {
    fn default() -> Self {
        Self {
            batch: Batch::new(),
            state: CursorState::Empty,
        }
    }
}

impl BatchSession {
    pub fn new(batch: Batch) -> Self {
        let mut session = Self::default();
        session.reset(batch);
        session
    }

    /// Discard all prior state; position on the first image if there is one
    pub fn reset(&mut self, batch: Batch) {
        self.state = if batch.is_empty() {
            CursorState::Empty
        } else {
            CursorState::Positioned(0)
        };
        self.batch = batch;
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    pub fn batch(&self) -> &[ImageId] {
        &self.batch
    }

    pub fn len(&self) -> usize {
        self.batch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    pub fn index(&self) -> Option<usize> {
        match self.state {
            CursorState::Positioned(index) => Some(index),
            CursorState::Empty => None,
        }
    }

    pub fn current(&self) -> Option<&ImageId> {
        self.index().and_then(|index| self.batch.get(index))
    }

    pub fn goto(&mut self, index: usize) -> Result<usize, NavigationError> {
        match self.state {
            CursorState::Positioned(_) if index < self.batch.len() => {
                self.state = CursorState::Positioned(index);
                Ok(index)
            }
            _ => Err(NavigationError::IndexOutOfRange {
                index,
                len: self.batch.len(),
            }),
        }
    }

    pub fn step(&mut self, direction: Direction) -> Result<usize, NavigationError> {
        let CursorState::Positioned(current) = self.state else {
            return Err(NavigationError::NoMoreImages { direction });
        };

        let target = match direction {
            Direction::Next if current + 1 < self.batch.len() => current + 1,
            Direction::Prev if current > 0 => current - 1,
            _ => return Err(NavigationError::NoMoreImages { direction }),
        };

        self.state = CursorState::Positioned(target);
        Ok(target)
    }

    pub fn has_prev(&self) -> bool {
        matches!(self.state, CursorState::Positioned(index) if index > 0)
    }

    pub fn has_next(&self) -> bool {
        matches!(self.state, CursorState::Positioned(index) if index + 1 < self.batch.len())
    }

    /// Rebuild from persisted parts; an index must point inside the batch
    pub fn restore(batch: Batch, index: Option<usize>) -> Result<Self, NavigationError> {
        match (batch.is_empty(), index) {
            (true, None) => Ok(Self::default()),
            (false, Some(index)) if index < batch.len() => Ok(Self {
                batch,
                state: CursorState::Positioned(index),
            }),
            (_, index) => Err(NavigationError::IndexOutOfRange {
                index: index.unwrap_or(0),
                len: batch.len(),
            }),
        }
    }
}

/// Everything needed to rebuild a session in a later request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub source: SourceDescriptor,
    pub images: Batch,
    pub index: Option<usize>,
}
