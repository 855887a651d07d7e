// Licensed under the Apache-2.0 license

use crate::device::{ChannelId, CompletionCallback, DmaAddr, DmaDevice};
use crate::error::DmaError;
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Size of the hardware-visible memory of an emulated device unless
/// configured otherwise.
pub const DEFAULT_EMULATED_CAPACITY: usize = 64 * 1024 * 1024;

const TX_CHANNEL: ChannelId = 0;
const RX_CHANNEL: ChannelId = 1;
const BASE_ADDR: u64 = 0x1000_0000;
const PAGE_SIZE: u64 = 0x1000;

/// The AXI-stream peripheral sitting behind an emulated DMA device.
pub trait StreamPeripheral: Send {
    /// Consumes the drained TX stream and produces `rx_len` bytes for the RX
    /// channel. `rx_len` is 0 for one-way transfers.
    fn transfer(&mut self, tx: &[u8], rx_len: usize) -> Vec<u8>;

    /// How long the stream takes to drain `len` bytes. A forced stop within
    /// this window cancels the transfer.
    fn drain_time(&self, _len: usize) -> Duration {
        Duration::ZERO
    }
}

struct Memory {
    regions: HashMap<u64, Vec<u8>>,
    capacity: usize,
    used: usize,
    next_addr: u64,
    frees: usize,
}

#[derive(Default)]
struct Channel {
    callback: Option<CompletionCallback>,
    generation: u64,
}

struct Job {
    tx_channel: ChannelId,
    tx_generation: u64,
    tx_data: Vec<u8>,
    rx: Option<RxTarget>,
}

struct RxTarget {
    channel: ChannelId,
    generation: u64,
    addr: DmaAddr,
    size: usize,
}

struct Shared {
    index: u32,
    memory: Mutex<Memory>,
    channels: Mutex<HashMap<ChannelId, Channel>>,
    stopped: Condvar,
    peripheral: Mutex<Box<dyn StreamPeripheral>>,
}

impl Shared {
    fn is_current(channels: &HashMap<ChannelId, Channel>, job: &Job) -> bool {
        let generation = |id| channels.get(&id).map(|c| c.generation).unwrap_or(0);
        generation(job.tx_channel) == job.tx_generation
            && job
                .rx
                .as_ref()
                .map(|rx| generation(rx.channel) == rx.generation)
                .unwrap_or(true)
    }

    /// Blocks for the drain time of the job. Returns false if one of its
    /// channels was stopped in the meantime.
    fn wait_drained(&self, job: &Job, drain: Duration) -> bool {
        let channels = self.channels.lock().unwrap();
        let (channels, _) = self
            .stopped
            .wait_timeout_while(channels, drain, |channels| {
                Self::is_current(channels, job)
            })
            .unwrap();
        Self::is_current(&channels, job)
    }

    fn notification_loop(&self, jobs: Receiver<Job>) {
        while let Ok(job) = jobs.recv() {
            let drain = self
                .peripheral
                .lock()
                .unwrap()
                .drain_time(job.tx_data.len());
            if !self.wait_drained(&job, drain) {
                debug!("dma{}: transfer cancelled before completion", self.index);
                continue;
            }

            let rx_len = job.rx.as_ref().map(|rx| rx.size).unwrap_or(0);
            let mut output = self
                .peripheral
                .lock()
                .unwrap()
                .transfer(&job.tx_data, rx_len);
            if let Some(rx) = &job.rx {
                output.resize(rx.size, 0);
                if let Some(region) = self.memory.lock().unwrap().regions.get_mut(&rx.addr.0) {
                    region[..rx.size].copy_from_slice(&output);
                }
            }

            let notify = job.rx.as_ref().map(|rx| rx.channel).unwrap_or(job.tx_channel);
            let callback = {
                let channels = self.channels.lock().unwrap();
                if !Self::is_current(&channels, &job) {
                    continue;
                }
                channels.get(&notify).and_then(|c| c.callback.clone())
            };
            match callback {
                Some(callback) => callback(notify),
                None => debug!("dma{}: no callback on channel {}", self.index, notify),
            }
        }
    }
}

/// Software model of an AXI DMA device with one TX and one RX channel.
///
/// Transfers complete on a dedicated notification thread, which mirrors how
/// the kernel driver delivers completions.
pub struct EmulatedDmaDevice {
    rx_channels: Vec<ChannelId>,
    shared: Arc<Shared>,
    jobs: Mutex<Option<Sender<Job>>>,
    worker: Option<JoinHandle<()>>,
    transfers: AtomicUsize,
    stops: AtomicUsize,
}

impl EmulatedDmaDevice {
    pub fn new(index: u32, peripheral: impl StreamPeripheral + 'static) -> Self {
        let shared = Arc::new(Shared {
            index,
            memory: Mutex::new(Memory {
                regions: HashMap::new(),
                capacity: DEFAULT_EMULATED_CAPACITY,
                used: 0,
                next_addr: BASE_ADDR,
                frees: 0,
            }),
            channels: Mutex::new(HashMap::from([
                (TX_CHANNEL, Channel::default()),
                (RX_CHANNEL, Channel::default()),
            ])),
            stopped: Condvar::new(),
            peripheral: Mutex::new(Box::new(peripheral)),
        });
        let (jobs_tx, jobs_rx) = mpsc::channel();
        let worker_shared = shared.clone();
        let worker = thread::Builder::new()
            .name(format!("dma{}-notify", index))
            .spawn(move || worker_shared.notification_loop(jobs_rx))
            .ok();
        if worker.is_none() {
            warn!("dma{}: failed to spawn notification thread", index);
        }
        Self {
            rx_channels: vec![RX_CHANNEL],
            shared,
            jobs: Mutex::new(Some(jobs_tx)),
            worker,
            transfers: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
        }
    }

    /// Limits the hardware-visible memory to `capacity` bytes.
    pub fn with_capacity(self, capacity: usize) -> Self {
        self.shared.memory.lock().unwrap().capacity = capacity;
        self
    }

    /// Removes the RX channel, as on a playback-only device.
    pub fn tx_only(mut self) -> Self {
        self.rx_channels.clear();
        self
    }

    /// Number of allocations not yet freed.
    pub fn live_allocations(&self) -> usize {
        self.shared.memory.lock().unwrap().regions.len()
    }

    pub fn used_bytes(&self) -> usize {
        self.shared.memory.lock().unwrap().used
    }

    pub fn frees(&self) -> usize {
        self.shared.memory.lock().unwrap().frees
    }

    pub fn transfers_started(&self) -> usize {
        self.transfers.load(Ordering::Relaxed)
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::Relaxed)
    }

    fn snapshot(&self, channel: ChannelId, addr: DmaAddr, size: usize) -> Result<Vec<u8>, DmaError> {
        let memory = self.shared.memory.lock().unwrap();
        match memory.regions.get(&addr.0) {
            Some(region) if size <= region.len() => Ok(region[..size].to_vec()),
            _ => Err(DmaError::TransferFailure {
                channel,
                reason: format!("no {} byte buffer at {:#x}", size, addr.0),
            }),
        }
    }

    fn generation(&self, channel: ChannelId) -> u64 {
        self.shared
            .channels
            .lock()
            .unwrap()
            .get(&channel)
            .map(|c| c.generation)
            .unwrap_or(0)
    }

    fn submit(&self, job: Job) -> Result<(), DmaError> {
        let channel = job.tx_channel;
        let jobs = self.jobs.lock().unwrap();
        jobs.as_ref()
            .ok_or(())
            .and_then(|jobs| jobs.send(job).map_err(|_| ()))
            .map_err(|_| DmaError::TransferFailure {
                channel,
                reason: "notification thread is not running".into(),
            })?;
        self.transfers.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

impl DmaDevice for EmulatedDmaDevice {
    fn index(&self) -> u32 {
        self.shared.index
    }

    fn tx_channels(&self) -> Vec<ChannelId> {
        vec![TX_CHANNEL]
    }

    fn rx_channels(&self) -> Vec<ChannelId> {
        self.rx_channels.clone()
    }

    fn allocate(&self, size: usize) -> Option<DmaAddr> {
        let mut memory = self.shared.memory.lock().unwrap();
        if size == 0 || memory.used + size > memory.capacity {
            return None;
        }
        let addr = memory.next_addr;
        memory.next_addr += (size as u64).div_ceil(PAGE_SIZE) * PAGE_SIZE;
        memory.used += size;
        memory.regions.insert(addr, vec![0; size]);
        Some(DmaAddr(addr))
    }

    fn free(&self, addr: DmaAddr, size: usize) {
        let mut memory = self.shared.memory.lock().unwrap();
        match memory.regions.remove(&addr.0) {
            Some(region) => {
                if region.len() != size {
                    warn!(
                        "dma{}: freeing {:#x} with size {} but it was allocated with {}",
                        self.shared.index,
                        addr.0,
                        size,
                        region.len()
                    );
                }
                memory.used -= region.len();
                memory.frees += 1;
            }
            None => warn!("dma{}: free of unknown address {:#x}", self.shared.index, addr.0),
        }
    }

    fn write(&self, addr: DmaAddr, offset: usize, data: &[u8]) {
        if let Some(region) = self.shared.memory.lock().unwrap().regions.get_mut(&addr.0) {
            region[offset..offset + data.len()].copy_from_slice(data);
        }
    }

    fn read(&self, addr: DmaAddr, offset: usize, buf: &mut [u8]) {
        if let Some(region) = self.shared.memory.lock().unwrap().regions.get(&addr.0) {
            buf.copy_from_slice(&region[offset..offset + buf.len()]);
        }
    }

    fn set_completion_callback(&self, channel: ChannelId, callback: Option<CompletionCallback>) {
        self.shared
            .channels
            .lock()
            .unwrap()
            .entry(channel)
            .or_default()
            .callback = callback;
    }

    fn start_one_way(
        &self,
        channel: ChannelId,
        addr: DmaAddr,
        size: usize,
    ) -> Result<(), DmaError> {
        let tx_data = self.snapshot(channel, addr, size)?;
        self.submit(Job {
            tx_channel: channel,
            tx_generation: self.generation(channel),
            tx_data,
            rx: None,
        })
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
        if !self.rx_channels.contains(&rx_channel) {
            return Err(DmaError::TransferFailure {
                channel: rx_channel,
                reason: "no such RX channel".into(),
            });
        }
        let tx_data = self.snapshot(tx_channel, tx_addr, tx_size)?;
        self.snapshot(rx_channel, rx_addr, rx_size)?;
        self.submit(Job {
            tx_channel,
            tx_generation: self.generation(tx_channel),
            tx_data,
            rx: Some(RxTarget {
                channel: rx_channel,
                generation: self.generation(rx_channel),
                addr: rx_addr,
                size: rx_size,
            }),
        })
    }

    fn stop(&self, channel: ChannelId) {
        let mut channels = self.shared.channels.lock().unwrap();
        channels.entry(channel).or_default().generation += 1;
        self.stops.fetch_add(1, Ordering::Relaxed);
        self.shared.stopped.notify_all();
    }
}

impl Drop for EmulatedDmaDevice {
    fn drop(&mut self) {
        self.jobs.lock().unwrap().take();
        if let Some(worker) = self.worker.take() {
            // the last reference may be released from a completion callback
            if worker.thread().id() != thread::current().id() {
                let _ = worker.join();
            }
        }
    }
}
