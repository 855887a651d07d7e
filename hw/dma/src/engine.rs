// Licensed under the Apache-2.0 license

use crate::device::{ChannelId, CompletionCallback, DmaDevice};
use crate::error::DmaError;
use crate::pool::{BufferHandle, DmaBufferPool};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferMode {
    /// TX only. Used for playback.
    OneWay,
    /// TX drain and RX fill at the same time. Used by the cipher cores.
    TwoWay,
}

/// Delivered once when a transfer finishes on the hardware.
#[derive(Debug, Default)]
pub struct TransferCompletion {
    /// Contents of the RX buffer for two-way transfers, copied out before the
    /// buffer was returned to the pool. `None` if the buffer had already been
    /// reclaimed.
    pub rx_data: Option<Vec<u8>>,
}

/// Completion target of a transfer. Runs on the driver's notification
/// context after the transfer's buffers were freed and the engine went idle.
/// Dropped without being called if the transfer is force-stopped.
pub type Completion = Box<dyn FnOnce(TransferCompletion) + Send>;

/// A transfer over buffers that were allocated up front through
/// [`TransferEngine::allocate`].
pub struct TransferRequest {
    pub tx: BufferHandle,
    pub rx: Option<BufferHandle>,
    pub completion: Completion,
}

struct ActiveTransfer {
    /// Launch number; notifications carrying another number are stale.
    seq: u64,
    tx: BufferHandle,
    rx: Option<BufferHandle>,
    completion: Completion,
}

enum EngineState {
    Idle,
    /// A caller holds a [`TransferSlot`] and is staging a transfer.
    Reserved,
    Busy(ActiveTransfer),
}

struct EngineInner {
    device: Arc<dyn DmaDevice>,
    pool: DmaBufferPool,
    mode: TransferMode,
    tx_channel: ChannelId,
    rx_channel: Option<ChannelId>,
    state: Mutex<EngineState>,
    launches: AtomicU64,
}

impl EngineInner {
    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap()
    }

    fn notify_channel(&self) -> ChannelId {
        self.rx_channel.unwrap_or(self.tx_channel)
    }

    fn stop_channels(&self) {
        self.device.stop(self.tx_channel);
        if let Some(rx) = self.rx_channel {
            self.device.stop(rx);
        }
    }

    /// Frees the buffers of a finished or aborted transfer. Buffers that are
    /// no longer tracked are skipped.
    fn release_buffers(&self, tx: BufferHandle, rx: Option<BufferHandle>) {
        for handle in std::iter::once(tx).chain(rx) {
            if self.pool.free(handle).is_err() {
                debug!(
                    "dma{}: {:?} already reclaimed, skipping",
                    self.device.index(),
                    handle
                );
            }
        }
    }

    /// Runs on the driver's notification context.
    fn complete(&self, channel: ChannelId, seq: u64) {
        let (completion, rx_data) = {
            let mut state = self.lock();
            let transfer = match std::mem::replace(&mut *state, EngineState::Idle) {
                EngineState::Busy(transfer) if transfer.seq == seq => transfer,
                EngineState::Busy(transfer) => {
                    debug!(
                        "dma{}: stale completion of launch {} on channel {} (now {})",
                        self.device.index(),
                        seq,
                        channel,
                        transfer.seq
                    );
                    *state = EngineState::Busy(transfer);
                    return;
                }
                other => {
                    *state = other;
                    debug!(
                        "dma{}: completion on channel {} with no transfer in flight",
                        self.device.index(),
                        channel
                    );
                    return;
                }
            };
            let rx_data = transfer.rx.and_then(|rx| {
                let size = self.pool.lookup(rx)?;
                self.pool.read(rx, 0, size).ok()
            });
            self.release_buffers(transfer.tx, transfer.rx);
            (transfer.completion, rx_data)
        };
        debug!(
            "dma{}: transfer on channel {} complete",
            self.device.index(),
            channel
        );
        completion(TransferCompletion { rx_data });
    }
}

/// Owns one channel pair of a DMA device and the buffers allocated from it.
///
/// At most one transfer is in flight at any time. A start request while a
/// transfer is staged or running fails with [`DmaError::Busy`]; nothing is
/// queued.
pub struct TransferEngine {
    inner: Arc<EngineInner>,
}

impl TransferEngine {
    /// Binds to the first TX channel (and, for two-way engines, the first RX
    /// channel) of `device`.
    pub fn open(device: Arc<dyn DmaDevice>, mode: TransferMode) -> Result<Self, DmaError> {
        let index = device.index();
        let tx_channel =
            device
                .tx_channels()
                .first()
                .copied()
                .ok_or_else(|| DmaError::DeviceInit {
                    index,
                    reason: "no TX channel".into(),
                })?;
        let rx_channel = match mode {
            TransferMode::OneWay => None,
            TransferMode::TwoWay => Some(device.rx_channels().first().copied().ok_or_else(
                || DmaError::DeviceInit {
                    index,
                    reason: "no RX channel".into(),
                },
            )?),
        };
        info!(
            "dma{}: opened {:?} engine (tx {}, rx {:?})",
            index, mode, tx_channel, rx_channel
        );
        Ok(Self {
            inner: Arc::new(EngineInner {
                pool: DmaBufferPool::new(device.clone()),
                device,
                mode,
                tx_channel,
                rx_channel,
                state: Mutex::new(EngineState::Idle),
                launches: AtomicU64::new(0),
            }),
        })
    }

    pub fn mode(&self) -> TransferMode {
        self.inner.mode
    }

    pub fn pool(&self) -> &DmaBufferPool {
        &self.inner.pool
    }

    /// True while a transfer is staged or in flight.
    pub fn is_busy(&self) -> bool {
        !matches!(*self.inner.lock(), EngineState::Idle)
    }

    /// Allocates a buffer outside of any transfer. The caller owns it until it
    /// is handed to [`TransferEngine::start_transfer`] or released.
    pub fn allocate(&self, size: usize) -> Result<Option<BufferHandle>, DmaError> {
        self.inner.pool.allocate(size)
    }

    /// Frees a buffer. If it belongs to the transfer in flight, that transfer
    /// is force-stopped first, which reclaims it.
    pub fn release(&self, handle: BufferHandle) -> Result<(), DmaError> {
        let in_flight = matches!(
            &*self.inner.lock(),
            EngineState::Busy(t) if t.tx == handle || t.rx == Some(handle)
        );
        if in_flight && self.stop_transfer() {
            return Ok(());
        }
        self.inner.pool.free(handle).map(|_| ())
    }

    /// Claims the engine for staging a transfer. The returned slot releases
    /// the claim, and every buffer it allocated, unless a transfer is started
    /// from it.
    pub fn reserve(&self) -> Result<TransferSlot<'_>, DmaError> {
        let mut state = self.inner.lock();
        if !matches!(*state, EngineState::Idle) {
            return Err(DmaError::Busy);
        }
        *state = EngineState::Reserved;
        Ok(TransferSlot {
            engine: self,
            owned: Vec::new(),
            launched: false,
        })
    }

    /// Starts a transfer over pre-allocated buffers.
    ///
    /// On [`DmaError::Busy`] the buffers stay with the caller. If the driver
    /// refuses the transfer they are freed.
    pub fn start_transfer(&self, request: TransferRequest) -> Result<(), DmaError> {
        {
            let mut state = self.inner.lock();
            if !matches!(*state, EngineState::Idle) {
                return Err(DmaError::Busy);
            }
            for handle in std::iter::once(request.tx).chain(request.rx) {
                self.inner.pool.resolve(handle)?;
            }
            *state = EngineState::Reserved;
        }
        self.launch(request.tx, request.rx, request.completion)
    }

    /// Force-stops the transfer in flight, frees its buffers and drops its
    /// completion target without calling it. Returns whether a transfer was
    /// stopped; a no-op when nothing is in flight.
    pub fn stop_transfer(&self) -> bool {
        let aborted = {
            let mut state = self.inner.lock();
            match std::mem::replace(&mut *state, EngineState::Idle) {
                EngineState::Busy(transfer) => {
                    self.inner.stop_channels();
                    self.inner.release_buffers(transfer.tx, transfer.rx);
                    Some(transfer)
                }
                other => {
                    *state = other;
                    None
                }
            }
        };
        match aborted {
            Some(transfer) => {
                debug!("dma{}: transfer force-stopped", self.inner.device.index());
                drop(transfer.completion);
                true
            }
            None => false,
        }
    }

    /// Moves a reserved engine to busy and hands the transfer to the driver.
    /// The engine lock is released before the driver call so that a fast
    /// completion never waits on this thread.
    fn launch(
        &self,
        tx: BufferHandle,
        rx: Option<BufferHandle>,
        completion: Completion,
    ) -> Result<(), DmaError> {
        let inner = &self.inner;
        let started = self.check_shape(rx).and_then(|_| {
            let (tx_addr, tx_size) = inner.pool.resolve(tx)?;
            let rx_target = match rx {
                Some(rx) => Some(inner.pool.resolve(rx)?),
                None => None,
            };

            {
                let mut state = inner.lock();
                inner.stop_channels();
                let seq = inner.launches.fetch_add(1, Ordering::Relaxed) + 1;
                let weak = Arc::downgrade(inner);
                let callback: CompletionCallback = Arc::new(move |channel| {
                    if let Some(inner) = weak.upgrade() {
                        inner.complete(channel, seq);
                    }
                });
                inner
                    .device
                    .set_completion_callback(inner.notify_channel(), Some(callback));
                *state = EngineState::Busy(ActiveTransfer {
                    seq,
                    tx,
                    rx,
                    completion,
                });
            }

            match (rx_target, inner.rx_channel) {
                (Some((rx_addr, rx_size)), Some(rx_channel)) => inner.device.start_two_way(
                    inner.tx_channel,
                    tx_addr,
                    tx_size,
                    rx_channel,
                    rx_addr,
                    rx_size,
                ),
                _ => inner.device.start_one_way(inner.tx_channel, tx_addr, tx_size),
            }
        });

        if let Err(err) = started {
            warn!("dma{}: failed to start transfer: {}", inner.device.index(), err);
            let mut state = inner.lock();
            if matches!(*state, EngineState::Busy(_) | EngineState::Reserved) {
                *state = EngineState::Idle;
            }
            drop(state);
            inner.release_buffers(tx, rx);
            return Err(err);
        }
        debug!(
            "dma{}: started {:?} transfer of {:?}",
            inner.device.index(),
            inner.mode,
            tx
        );
        Ok(())
    }

    fn check_shape(&self, rx: Option<BufferHandle>) -> Result<(), DmaError> {
        let expected_rx = self.inner.mode == TransferMode::TwoWay;
        if rx.is_some() != expected_rx {
            return Err(DmaError::TransferFailure {
                channel: self.inner.tx_channel,
                reason: format!("transfer shape does not match {:?} engine", self.inner.mode),
            });
        }
        Ok(())
    }
}

impl Drop for TransferEngine {
    fn drop(&mut self) {
        self.stop_transfer();
        self.inner
            .device
            .set_completion_callback(self.inner.notify_channel(), None);
    }
}

/// Exclusive claim on an idle [`TransferEngine`] while a transfer is staged.
pub struct TransferSlot<'a> {
    engine: &'a TransferEngine,
    owned: Vec<BufferHandle>,
    launched: bool,
}

impl TransferSlot<'_> {
    /// Allocates a buffer owned by this slot. A zero-sized request fails with
    /// [`DmaError::Allocation`] since a transfer cannot use it.
    pub fn allocate(&mut self, size: usize) -> Result<BufferHandle, DmaError> {
        let handle = self
            .engine
            .allocate(size)?
            .ok_or(DmaError::Allocation { size })?;
        self.owned.push(handle);
        Ok(handle)
    }

    pub fn pool(&self) -> &DmaBufferPool {
        self.engine.pool()
    }

    pub fn start_one_way(self, tx: BufferHandle, completion: Completion) -> Result<(), DmaError> {
        self.start(tx, None, completion)
    }

    pub fn start_two_way(
        self,
        tx: BufferHandle,
        rx: BufferHandle,
        completion: Completion,
    ) -> Result<(), DmaError> {
        self.start(tx, Some(rx), completion)
    }

    fn start(
        mut self,
        tx: BufferHandle,
        rx: Option<BufferHandle>,
        completion: Completion,
    ) -> Result<(), DmaError> {
        self.owned.retain(|h| *h != tx && Some(*h) != rx);
        self.launched = true;
        self.engine.launch(tx, rx, completion)
    }
}

impl Drop for TransferSlot<'_> {
    fn drop(&mut self) {
        for handle in self.owned.drain(..) {
            let _ = self.engine.pool().free(handle);
        }
        if !self.launched {
            let mut state = self.engine.inner.lock();
            if matches!(*state, EngineState::Reserved) {
                *state = EngineState::Idle;
            }
        }
    }
}
