// Licensed under the Apache-2.0 license

use crate::device::{DmaAddr, DmaDevice};
use crate::error::DmaError;
use log::{debug, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Opaque identity of a buffer owned by a [`DmaBufferPool`].
///
/// Handles are never reused, so a handle that outlives its buffer can only
/// ever fail a lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferHandle(u64);

#[derive(Debug)]
struct DmaBuffer {
    handle: BufferHandle,
    addr: DmaAddr,
    size: usize,
}

/// Tracks every contiguous buffer allocated from one DMA device.
///
/// The pool is the only owner of the handle to address/size mapping. Buffers
/// still tracked when the pool is dropped are returned to the device.
pub struct DmaBufferPool {
    device: Arc<dyn DmaDevice>,
    buffers: Mutex<Vec<DmaBuffer>>,
    next_handle: AtomicU64,
}

impl DmaBufferPool {
    pub fn new(device: Arc<dyn DmaDevice>) -> Self {
        Self {
            device,
            buffers: Mutex::new(Vec::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    /// Allocates a buffer of `size` bytes.
    ///
    /// A zero-sized request yields `Ok(None)` without touching the device.
    pub fn allocate(&self, size: usize) -> Result<Option<BufferHandle>, DmaError> {
        if size == 0 {
            return Ok(None);
        }
        let addr = self
            .device
            .allocate(size)
            .ok_or(DmaError::Allocation { size })?;
        let handle = BufferHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.buffers.lock().unwrap().push(DmaBuffer { handle, addr, size });
        debug!(
            "dma{}: allocated {:?} ({} bytes at {:#x})",
            self.device.index(),
            handle,
            size,
            addr.0
        );
        Ok(Some(handle))
    }

    /// Returns the buffer to the device and stops tracking it.
    ///
    /// Freeing a handle the pool no longer knows is rejected with
    /// [`DmaError::UnknownBuffer`]; the device is not touched.
    pub fn free(&self, handle: BufferHandle) -> Result<usize, DmaError> {
        let buffer = {
            let mut buffers = self.buffers.lock().unwrap();
            let pos = buffers
                .iter()
                .position(|b| b.handle == handle)
                .ok_or(DmaError::UnknownBuffer)?;
            buffers.swap_remove(pos)
        };
        self.device.free(buffer.addr, buffer.size);
        debug!(
            "dma{}: freed {:?} ({} bytes)",
            self.device.index(),
            handle,
            buffer.size
        );
        Ok(buffer.size)
    }

    /// Size of the buffer, if the pool still tracks it.
    pub fn lookup(&self, handle: BufferHandle) -> Option<usize> {
        self.buffers
            .lock()
            .unwrap()
            .iter()
            .find(|b| b.handle == handle)
            .map(|b| b.size)
    }

    pub(crate) fn resolve(&self, handle: BufferHandle) -> Result<(DmaAddr, usize), DmaError> {
        self.buffers
            .lock()
            .unwrap()
            .iter()
            .find(|b| b.handle == handle)
            .map(|b| (b.addr, b.size))
            .ok_or(DmaError::UnknownBuffer)
    }

    fn checked(
        &self,
        handle: BufferHandle,
        offset: usize,
        len: usize,
    ) -> Result<DmaAddr, DmaError> {
        let (addr, size) = self.resolve(handle)?;
        match offset.checked_add(len) {
            Some(end) if end <= size => Ok(addr),
            _ => Err(DmaError::OutOfBounds { offset, len, size }),
        }
    }

    pub fn write(&self, handle: BufferHandle, offset: usize, data: &[u8]) -> Result<(), DmaError> {
        let addr = self.checked(handle, offset, data.len())?;
        self.device.write(addr, offset, data);
        Ok(())
    }

    /// Sets `len` bytes starting at `offset` to `byte`.
    pub fn fill(
        &self,
        handle: BufferHandle,
        offset: usize,
        len: usize,
        byte: u8,
    ) -> Result<(), DmaError> {
        let addr = self.checked(handle, offset, len)?;
        self.device.write(addr, offset, &vec![byte; len]);
        Ok(())
    }

    pub fn read(&self, handle: BufferHandle, offset: usize, len: usize) -> Result<Vec<u8>, DmaError> {
        let addr = self.checked(handle, offset, len)?;
        let mut data = vec![0u8; len];
        self.device.read(addr, offset, &mut data);
        Ok(data)
    }

    /// Number of buffers currently tracked.
    pub fn len(&self) -> usize {
        self.buffers.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn free_all(&self) {
        let buffers: Vec<DmaBuffer> = self.buffers.lock().unwrap().drain(..).collect();
        for buffer in buffers {
            self.device.free(buffer.addr, buffer.size);
        }
    }
}

impl Drop for DmaBufferPool {
    fn drop(&mut self) {
        let leaked = self.len();
        if leaked > 0 {
            warn!(
                "dma{}: releasing {} buffer(s) still held at teardown",
                self.device.index(),
                leaked
            );
        }
        self.free_all();
    }
}
