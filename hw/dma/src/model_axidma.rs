// Licensed under the Apache-2.0 license

//! Binding to the `libaxidma` userspace library of the Xilinx AXI DMA
//! character-device driver.

use crate::device::{ChannelId, CompletionCallback, DmaAddr, DmaDevice};
use crate::error::DmaError;
use log::{debug, error};
use std::collections::HashMap;
use std::os::raw::{c_int, c_void};
use std::ptr;
use std::sync::Mutex;

#[repr(C)]
struct ArrayT {
    len: c_int,
    data: *mut c_int,
}

type AxidmaDev = *mut c_void;
type AxidmaCallback = Option<unsafe extern "C" fn(channel_id: c_int, data: *mut c_void)>;

#[link(name = "axidma")]
extern "C" {
    fn axidma_init_dev(index: c_int) -> AxidmaDev;
    fn axidma_destroy(dev: AxidmaDev);
    fn axidma_get_dma_tx(dev: AxidmaDev) -> *const ArrayT;
    fn axidma_get_dma_rx(dev: AxidmaDev) -> *const ArrayT;
    fn axidma_malloc(dev: AxidmaDev, size: usize) -> *mut c_void;
    fn axidma_free(dev: AxidmaDev, addr: *mut c_void, size: usize);
    fn axidma_set_callback(
        dev: AxidmaDev,
        channel: c_int,
        callback: AxidmaCallback,
        data: *mut c_void,
    );
    fn axidma_oneway_transfer(
        dev: AxidmaDev,
        channel: c_int,
        buf: *mut c_void,
        len: usize,
        wait: bool,
    ) -> c_int;
    #[allow(clippy::too_many_arguments)]
    fn axidma_twoway_transfer(
        dev: AxidmaDev,
        tx_channel: c_int,
        tx_buf: *mut c_void,
        tx_len: usize,
        tx_frame: *mut c_void,
        rx_channel: c_int,
        rx_buf: *mut c_void,
        rx_len: usize,
        rx_frame: *mut c_void,
        wait: bool,
    ) -> c_int;
    fn axidma_stop_transfer(dev: AxidmaDev, channel: c_int);
}

/// Per-channel target of the driver callback. Registered with the driver once
/// at open and kept at a stable address until the device is destroyed.
#[derive(Default)]
struct CallbackSlot {
    callback: Mutex<Option<CompletionCallback>>,
}

unsafe extern "C" fn completion_trampoline(channel_id: c_int, data: *mut c_void) {
    let slot = &*(data as *const CallbackSlot);
    let callback = match slot.callback.lock() {
        Ok(callback) => callback.clone(),
        Err(_) => return,
    };
    if let Some(callback) = callback {
        callback(channel_id as ChannelId);
    }
}

fn channels(array: *const ArrayT) -> Vec<ChannelId> {
    if array.is_null() {
        return Vec::new();
    }
    // SAFETY: the driver returns a pointer to an array it owns for the
    // lifetime of the device handle.
    unsafe {
        let array = &*array;
        if array.data.is_null() || array.len <= 0 {
            return Vec::new();
        }
        std::slice::from_raw_parts(array.data, array.len as usize)
            .iter()
            .map(|c| *c as ChannelId)
            .collect()
    }
}

pub struct AxiDmaDevice {
    index: u32,
    dev: AxidmaDev,
    tx_channels: Vec<ChannelId>,
    rx_channels: Vec<ChannelId>,
    slots: HashMap<ChannelId, Box<CallbackSlot>>,
}

// SAFETY: libaxidma serializes access to the device handle with its own lock,
// and the callback slots are only mutated behind their mutexes.
unsafe impl Send for AxiDmaDevice {}
unsafe impl Sync for AxiDmaDevice {}

impl AxiDmaDevice {
    pub fn open(index: u32) -> Result<Self, DmaError> {
        // SAFETY: plain FFI call; a null handle is checked below.
        let dev = unsafe { axidma_init_dev(index as c_int) };
        if dev.is_null() {
            return Err(DmaError::DeviceInit {
                index,
                reason: "axidma_init_dev failed".into(),
            });
        }
        // SAFETY: `dev` is a live handle.
        let (tx_channels, rx_channels) =
            unsafe { (channels(axidma_get_dma_tx(dev)), channels(axidma_get_dma_rx(dev))) };

        let mut slots = HashMap::new();
        for channel in tx_channels.iter().chain(rx_channels.iter()) {
            let slot = Box::<CallbackSlot>::default();
            // SAFETY: the slot is boxed and lives in `slots` until after
            // `axidma_destroy` in drop.
            unsafe {
                axidma_set_callback(
                    dev,
                    *channel as c_int,
                    Some(completion_trampoline),
                    &*slot as *const CallbackSlot as *mut c_void,
                );
            }
            slots.insert(*channel, slot);
        }

        debug!(
            "dma{}: opened axidma device (tx {:?}, rx {:?})",
            index, tx_channels, rx_channels
        );
        Ok(Self {
            index,
            dev,
            tx_channels,
            rx_channels,
            slots,
        })
    }

    fn ptr(addr: DmaAddr) -> *mut u8 {
        addr.0 as usize as *mut u8
    }
}

impl DmaDevice for AxiDmaDevice {
    fn index(&self) -> u32 {
        self.index
    }

    fn tx_channels(&self) -> Vec<ChannelId> {
        self.tx_channels.clone()
    }

    fn rx_channels(&self) -> Vec<ChannelId> {
        self.rx_channels.clone()
    }

    fn allocate(&self, size: usize) -> Option<DmaAddr> {
        // SAFETY: live handle; null is mapped to None.
        let addr = unsafe { axidma_malloc(self.dev, size) };
        if addr.is_null() {
            None
        } else {
            Some(DmaAddr(addr as usize as u64))
        }
    }

    fn free(&self, addr: DmaAddr, size: usize) {
        // SAFETY: `addr` came from axidma_malloc on this handle.
        unsafe { axidma_free(self.dev, Self::ptr(addr) as *mut c_void, size) }
    }

    fn write(&self, addr: DmaAddr, offset: usize, data: &[u8]) {
        // SAFETY: the pool bounds-checks offset and length against the
        // allocation before calling.
        unsafe {
            ptr::copy_nonoverlapping(data.as_ptr(), Self::ptr(addr).add(offset), data.len());
        }
    }

    fn read(&self, addr: DmaAddr, offset: usize, buf: &mut [u8]) {
        // SAFETY: see write.
        unsafe {
            ptr::copy_nonoverlapping(Self::ptr(addr).add(offset), buf.as_mut_ptr(), buf.len());
        }
    }

    fn set_completion_callback(&self, channel: ChannelId, callback: Option<CompletionCallback>) {
        match self.slots.get(&channel) {
            Some(slot) => *slot.callback.lock().unwrap() = callback,
            None => error!("dma{}: no such channel {}", self.index, channel),
        }
    }

    fn start_one_way(
        &self,
        channel: ChannelId,
        addr: DmaAddr,
        size: usize,
    ) -> Result<(), DmaError> {
        // SAFETY: buffer came from axidma_malloc and stays allocated until the
        // engine frees it after completion or stop.
        let rc = unsafe {
            axidma_oneway_transfer(
                self.dev,
                channel as c_int,
                Self::ptr(addr) as *mut c_void,
                size,
                false,
            )
        };
        if rc < 0 {
            return Err(DmaError::TransferFailure {
                channel,
                reason: format!("axidma_oneway_transfer returned {}", rc),
            });
        }
        Ok(())
    }

    fn start_two_way(
        &self,
        tx_channel: ChannelId,
        tx_addr: DmaAddr,
        tx_size: usize,
        rx_channel: ChannelId,
        rx_addr: DmaAddr,
        rx_size: usize,
    ) -> Result<(), DmaError> {
        // SAFETY: see start_one_way.
        let rc = unsafe {
            axidma_twoway_transfer(
                self.dev,
                tx_channel as c_int,
                Self::ptr(tx_addr) as *mut c_void,
                tx_size,
                ptr::null_mut(),
                rx_channel as c_int,
                Self::ptr(rx_addr) as *mut c_void,
                rx_size,
                ptr::null_mut(),
                false,
            )
        };
        if rc < 0 {
            return Err(DmaError::TransferFailure {
                channel: tx_channel,
                reason: format!("axidma_twoway_transfer returned {}", rc),
            });
        }
        Ok(())
    }

    fn stop(&self, channel: ChannelId) {
        // SAFETY: live handle.
        unsafe { axidma_stop_transfer(self.dev, channel as c_int) }
    }
}

impl Drop for AxiDmaDevice {
    fn drop(&mut self) {
        // SAFETY: the handle is destroyed exactly once; callback slots are
        // dropped afterwards with the rest of the struct.
        unsafe { axidma_destroy(self.dev) }
    }
}
