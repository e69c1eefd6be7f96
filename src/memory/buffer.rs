//! Host and device buffers.
//!
//! A buffer is an allocated extent plus a current logical size that may be
//! smaller. Collaborators own buffers; tasks clone the handle and touch the
//! storage only from their lane operations. Keeping a buffer consistent
//! while tasks on it are in flight is the collaborator's job: two tasks
//! writing the same buffer must be chained through their events.

use crate::error::{Error, Result};
use crate::memory::data_space::DataSpace;
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// Where a buffer lives.
pub trait Location: Send + Sync + 'static {
    const NAME: &'static str;
}

#[derive(Debug, Clone, Copy)]
pub struct Host;

#[derive(Debug, Clone, Copy)]
pub struct Device;

impl Location for Host {
    const NAME: &'static str = "host";
}

impl Location for Device {
    const NAME: &'static str = "device";
}

struct Storage<T, const D: usize> {
    data: RwLock<Vec<T>>,
    extent: DataSpace<D>,
    current: AtomicUsize,
}

pub struct Buffer<T, const D: usize, L> {
    storage: Arc<Storage<T, D>>,
    _location: PhantomData<fn() -> L>,
}

pub type HostBuffer<T, const D: usize> = Buffer<T, D, Host>;
pub type DeviceBuffer<T, const D: usize> = Buffer<T, D, Device>;

impl<T, const D: usize, L: Location> Buffer<T, D, L> {
    /// Wrap `data` laid out x fastest over `extent`.
    pub fn from_vec(extent: DataSpace<D>, data: Vec<T>) -> Result<Self> {
        if data.len() != extent.product() {
            return Err(Error::Validation(format!(
                "{} buffer of extent {} needs {} elements, got {}",
                L::NAME,
                extent,
                extent.product(),
                data.len()
            )));
        }
        let size = data.len();
        Ok(Self {
            storage: Arc::new(Storage {
                data: RwLock::new(data),
                extent,
                current: AtomicUsize::new(size),
            }),
            _location: PhantomData,
        })
    }

    pub fn new_filled(extent: DataSpace<D>, value: T) -> Self
    where
        T: Clone,
    {
        let size = extent.product();
        Self {
            storage: Arc::new(Storage {
                data: RwLock::new(vec![value; size]),
                extent,
                current: AtomicUsize::new(size),
            }),
            _location: PhantomData,
        }
    }

    pub fn new(extent: DataSpace<D>) -> Self
    where
        T: Clone + Default,
    {
        Self::new_filled(extent, T::default())
    }

    pub fn location(&self) -> &'static str {
        L::NAME
    }

    /// Allocated extent.
    pub fn extent(&self) -> DataSpace<D> {
        self.storage.extent
    }

    /// Allocated element count.
    pub fn capacity(&self) -> usize {
        self.storage.extent.product()
    }

    /// Logical element count.
    pub fn current_size(&self) -> usize {
        self.storage.current.load(Ordering::Acquire)
    }

    pub fn set_current_size(&self, size: usize) -> Result<()> {
        if size > self.capacity() {
            return Err(Error::Validation(format!(
                "current size {} exceeds capacity {} of {} buffer",
                size,
                self.capacity(),
                L::NAME
            )));
        }
        self.storage.current.store(size, Ordering::Release);
        Ok(())
    }

    /// Logical extent derived from the current size: in one dimension the
    /// size itself; otherwise every axis but the last keeps its allocated
    /// extent and the last one holds as many full slices as fit.
    pub fn current_data_space(&self) -> DataSpace<D> {
        current_data_space(self.extent(), self.current_size())
    }

    /// Read access to the whole allocation.
    pub fn read<R>(&self, f: impl FnOnce(DataBox<'_, T, D>) -> R) -> R {
        let guard = self
            .storage
            .data
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        f(DataBox {
            data: &guard,
            extent: self.storage.extent,
        })
    }

    /// Write access to the whole allocation.
    pub fn write<R>(&self, f: impl FnOnce(DataBoxMut<'_, T, D>) -> R) -> R {
        let mut guard = self
            .storage
            .data
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        f(DataBoxMut {
            data: &mut guard,
            extent: self.storage.extent,
        })
    }

    /// Elements inside the current size, in linear order.
    pub fn to_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        let size = self.current_size();
        self.read(|b| b.as_slice()[..size].to_vec())
    }

    /// Do both handles refer to the same storage?
    pub fn same_storage<M: Location>(&self, other: &Buffer<T, D, M>) -> bool {
        Arc::ptr_eq(&self.storage, &other.storage)
    }
}

impl<T, const D: usize, L> Clone for Buffer<T, D, L> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            _location: PhantomData,
        }
    }
}

impl<T, const D: usize, L: Location> std::fmt::Debug for Buffer<T, D, L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("location", &L::NAME)
            .field("extent", &self.extent())
            .field("current_size", &self.current_size())
            .finish()
    }
}

pub(crate) fn current_data_space<const D: usize>(extent: DataSpace<D>, size: usize) -> DataSpace<D> {
    if D == 0 {
        return extent;
    }
    let mut area = extent;
    if D == 1 {
        area[0] = size;
        return area;
    }
    let slice: usize = extent.components()[..D - 1].iter().product();
    area[D - 1] = if slice == 0 { 0 } else { size / slice };
    area
}

/// Read view over a buffer's allocation.
pub struct DataBox<'a, T, const D: usize> {
    data: &'a [T],
    extent: DataSpace<D>,
}

impl<T, const D: usize> DataBox<'_, T, D> {
    pub fn extent(&self) -> DataSpace<D> {
        self.extent
    }

    pub fn as_slice(&self) -> &[T] {
        self.data
    }
}

impl<T, const D: usize> Index<[usize; D]> for DataBox<'_, T, D> {
    type Output = T;

    fn index(&self, idx: [usize; D]) -> &T {
        &self.data[self.extent.linear_index(&idx)]
    }
}

/// Write view over a buffer's allocation.
pub struct DataBoxMut<'a, T, const D: usize> {
    data: &'a mut [T],
    extent: DataSpace<D>,
}

impl<T, const D: usize> DataBoxMut<'_, T, D> {
    pub fn extent(&self) -> DataSpace<D> {
        self.extent
    }

    pub fn as_slice(&self) -> &[T] {
        self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        self.data
    }
}

impl<T, const D: usize> Index<[usize; D]> for DataBoxMut<'_, T, D> {
    type Output = T;

    fn index(&self, idx: [usize; D]) -> &T {
        &self.data[self.extent.linear_index(&idx)]
    }
}

impl<T, const D: usize> IndexMut<[usize; D]> for DataBoxMut<'_, T, D> {
    fn index_mut(&mut self, idx: [usize; D]) -> &mut T {
        &mut self.data[self.extent.linear_index(&idx)]
    }
}
