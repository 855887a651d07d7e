// Licensed under the Apache-2.0 license

use crate::error::DmaError;
use std::sync::Arc;

/// Channel number as reported by the DMA driver.
pub type ChannelId = u32;

/// Address of a contiguous buffer inside a device's memory, as handed out by
/// [`DmaDevice::allocate`]. Only meaningful to the device that produced it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DmaAddr(pub u64);

/// Invoked from the driver's notification context when a transfer on the
/// channel finishes. Must not block.
pub type CompletionCallback = Arc<dyn Fn(ChannelId) + Send + Sync>;

/// One DMA character device.
///
/// Implementations must make `stop` and `set_completion_callback` safe to call
/// while a completion for the same channel is being delivered, and must never
/// invoke a callback for a transfer that was force-stopped.
pub trait DmaDevice: Send + Sync {
    /// Index of the device in the device tree.
    fn index(&self) -> u32;

    fn tx_channels(&self) -> Vec<ChannelId>;

    fn rx_channels(&self) -> Vec<ChannelId>;

    /// Reserves `size` bytes of contiguous memory. Returns `None` when the
    /// hardware-visible pool is exhausted.
    fn allocate(&self, size: usize) -> Option<DmaAddr>;

    fn free(&self, addr: DmaAddr, size: usize);

    /// Copies `data` into the buffer at `addr`. The caller guarantees that
    /// `offset + data.len()` lies within the allocation.
    fn write(&self, addr: DmaAddr, offset: usize, data: &[u8]);

    /// Copies from the buffer at `addr` into `buf`. Same bounds contract as
    /// [`DmaDevice::write`].
    fn read(&self, addr: DmaAddr, offset: usize, buf: &mut [u8]);

    fn set_completion_callback(&self, channel: ChannelId, callback: Option<CompletionCallback>);

    /// Starts draining `size` bytes of `addr` into the peripheral. Returns
    /// immediately; completion is signaled on the TX channel.
    fn start_one_way(&self, channel: ChannelId, addr: DmaAddr, size: usize)
        -> Result<(), DmaError>;

    /// Starts a simultaneous TX drain and RX fill. Completion is signaled on
    /// the RX channel.
    fn start_two_way(
        &self,
        tx_channel: ChannelId,
        tx_addr: DmaAddr,
        tx_size: usize,
        rx_channel: ChannelId,
        rx_addr: DmaAddr,
        rx_size: usize,
    ) -> Result<(), DmaError>;

    /// Force-stops any transfer on the channel. No completion is delivered for
    /// the stopped transfer.
    fn stop(&self, channel: ChannelId);
}
