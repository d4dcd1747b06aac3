use crate::config::ConfigError;
use crate::shared_data::Side;

/// Fixed cyclic order of sides served by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SideRing {
    sides: Vec<Side>,
    index: usize,
}

impl SideRing {
    pub fn new(sides: Vec<Side>) -> Result<Self, ConfigError> {
        if sides.is_empty() {
            return Err(ConfigError::EmptySequence);
        }
        Ok(Self { sides, index: 0 })
    }

    pub fn current(&self) -> Side {
        self.sides[self.index]
    }

    pub fn first(&self) -> Side {
        self.sides[0]
    }

    /// Moves to the next side, wrapping after the last, and returns it.
    pub fn advance(&mut self) -> Side {
        self.index = (self.index + 1) % self.sides.len();
        self.current()
    }

    /// Side that `advance` would move to.
    pub fn peek_next(&self) -> Side {
        self.sides[(self.index + 1) % self.sides.len()]
    }

    /// Repositions the ring on `side`. Returns false if the side is not part of the ring.
    pub fn jump_to(&mut self, side: Side) -> bool {
        match self.position(side) {
            Some(index) => {
                self.index = index;
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, side: Side) -> bool {
        self.position(side).is_some()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn sides(&self) -> &[Side] {
        &self.sides
    }

    fn position(&self, side: Side) -> Option<usize> {
        self.sides.iter().position(|s| *s == side)
    }
}
