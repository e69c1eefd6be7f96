//! N-dimensional extents and indices.
//!
//! Component 0 (x) is the fastest varying dimension in linear layouts.

use std::fmt;
use std::ops::{Index, IndexMut};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DataSpace<const D: usize>([usize; D]);

impl<const D: usize> DataSpace<D> {
    pub const fn new(components: [usize; D]) -> Self {
        Self(components)
    }

    /// Every component set to `value`.
    pub const fn splat(value: usize) -> Self {
        Self([value; D])
    }

    pub fn components(&self) -> [usize; D] {
        self.0
    }

    /// Extent along the fastest varying dimension.
    pub fn x(&self) -> usize {
        self.0.first().copied().unwrap_or(0)
    }

    /// Number of elements covered.
    pub fn product(&self) -> usize {
        self.0.iter().product()
    }

    /// Linear offset of `idx` inside an extent of `self`.
    pub fn linear_index(&self, idx: &[usize; D]) -> usize {
        let mut offset = 0;
        let mut stride = 1;
        for (i, extent) in idx.iter().zip(self.0.iter()) {
            offset += i * stride;
            stride *= extent;
        }
        offset
    }

    /// Inverse of [`DataSpace::linear_index`].
    pub fn index_of(&self, mut linear: usize) -> [usize; D] {
        let mut idx = [0; D];
        for (slot, extent) in idx.iter_mut().zip(self.0.iter()) {
            if *extent == 0 {
                break;
            }
            *slot = linear % extent;
            linear /= extent;
        }
        idx
    }

    /// Does `other` fit inside `self` on every axis?
    pub fn contains(&self, other: &DataSpace<D>) -> bool {
        self.0.iter().zip(other.0.iter()).all(|(a, b)| b <= a)
    }

    /// All indices inside this extent, x fastest.
    pub fn indices(&self) -> impl Iterator<Item = [usize; D]> + '_ {
        (0..self.product()).map(move |linear| self.index_of(linear))
    }
}

impl<const D: usize> Default for DataSpace<D> {
    fn default() -> Self {
        Self([0; D])
    }
}

impl<const D: usize> From<[usize; D]> for DataSpace<D> {
    fn from(components: [usize; D]) -> Self {
        Self(components)
    }
}

impl<const D: usize> Index<usize> for DataSpace<D> {
    type Output = usize;

    fn index(&self, axis: usize) -> &usize {
        &self.0[axis]
    }
}

impl<const D: usize> IndexMut<usize> for DataSpace<D> {
    fn index_mut(&mut self, axis: usize) -> &mut usize {
        &mut self.0[axis]
    }
}

impl<const D: usize> fmt::Display for DataSpace<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|c| c.to_string()).collect();
        write!(f, "({})", parts.join(", "))
    }
}
