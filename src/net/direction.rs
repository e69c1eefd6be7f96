//! Neighbor directions.
//!
//! A direction is encoded in base 3 with one digit per axis: digit 0 means
//! "no offset", 1 the negative side and 2 the positive side. Code 0 is the
//! "no exchange" direction. In three dimensions this yields 26 neighbors,
//! processed in increasing code order.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Add;

/// Largest supported dimensionality.
pub const MAX_DIM: usize = 3;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct ExchangeDirection(u32);

impl ExchangeDirection {
    pub const NONE: Self = Self(0);
    pub const LEFT: Self = Self(1);
    pub const RIGHT: Self = Self(2);
    pub const BOTTOM: Self = Self(3);
    pub const TOP: Self = Self(6);
    pub const BACK: Self = Self(9);
    pub const FRONT: Self = Self(18);

    pub const fn new(code: u32) -> Self {
        Self(code)
    }

    pub const fn code(&self) -> u32 {
        self.0
    }

    pub const fn is_none(&self) -> bool {
        self.0 == 0
    }

    /// Per-axis offsets in {-1, 0, 1}, x first.
    pub fn offsets(&self) -> [i8; MAX_DIM] {
        let mut out = [0; MAX_DIM];
        let mut code = self.0;
        for slot in out.iter_mut() {
            *slot = match code % 3 {
                1 => -1,
                2 => 1,
                _ => 0,
            };
            code /= 3;
        }
        out
    }

    pub fn from_offsets(offsets: [i8; MAX_DIM]) -> Self {
        let mut code = 0;
        for offset in offsets.iter().rev() {
            let digit = match offset.signum() {
                -1 => 1,
                1 => 2,
                _ => 0,
            };
            code = code * 3 + digit;
        }
        Self(code)
    }

    /// The direction pointing the opposite way on every axis. A message
    /// sent towards `d` arrives at the neighbor from `d.mirror()`.
    pub fn mirror(&self) -> Self {
        let offsets = self.offsets().map(|o| -o);
        Self::from_offsets(offsets)
    }
}

impl Add for ExchangeDirection {
    type Output = ExchangeDirection;

    /// Combine directions on distinct axes, e.g. `LEFT + TOP`.
    fn add(self, rhs: ExchangeDirection) -> ExchangeDirection {
        ExchangeDirection(self.0 + rhs.0)
    }
}

impl fmt::Display for ExchangeDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            return write!(f, "none");
        }
        const NAMES: [(&str, &str); MAX_DIM] =
            [("left", "right"), ("bottom", "top"), ("back", "front")];
        let parts: Vec<&str> = self
            .offsets()
            .iter()
            .zip(NAMES.iter())
            .filter_map(|(o, (neg, pos))| match o {
                -1 => Some(*neg),
                1 => Some(*pos),
                _ => None,
            })
            .collect();
        write!(f, "{}", parts.join("-"))
    }
}

/// All neighbor directions of a `dim`-dimensional domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Neighborhood {
    dim: usize,
}

impl Neighborhood {
    /// `dim` is clamped to [`MAX_DIM`].
    pub fn new(dim: usize) -> Self {
        Self {
            dim: dim.min(MAX_DIM),
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of direction codes including "no exchange" (3^dim).
    pub fn exchanges(&self) -> u32 {
        3u32.pow(self.dim as u32)
    }

    /// Every direction except "no exchange", in code order.
    pub fn directions(&self) -> impl Iterator<Item = ExchangeDirection> {
        (1..self.exchanges()).map(ExchangeDirection)
    }

    pub fn len(&self) -> usize {
        self.exchanges() as usize - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
