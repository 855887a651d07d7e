// Licensed under the Apache-2.0 license

use fpga_dma::{
    ChannelId, CompletionCallback, DmaAddr, DmaDevice, DmaError, EmulatedDmaDevice,
    StreamPeripheral, TransferEngine, TransferMode, TransferRequest,
};
use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone, Default)]
struct Recorder {
    played: Arc<Mutex<Vec<u8>>>,
}

impl StreamPeripheral for Recorder {
    fn transfer(&mut self, tx: &[u8], _rx_len: usize) -> Vec<u8> {
        self.played.lock().unwrap().extend_from_slice(tx);
        Vec::new()
    }

    fn drain_time(&self, len: usize) -> Duration {
        Duration::from_millis(len as u64)
    }
}

#[test]
fn test_buffers_are_freed_before_completion_runs() {
    let device = Arc::new(
        EmulatedDmaDevice::new(3, Recorder::default())
            .tx_only()
            .with_capacity(4096),
    );
    let engine = TransferEngine::open(device.clone(), TransferMode::OneWay).unwrap();
    let buffer = engine.allocate(10).unwrap().unwrap();
    engine.pool().fill(buffer, 0, 10, 0x55).unwrap();

    let (done_tx, done_rx) = mpsc::channel();
    let observer = device.clone();
    engine
        .start_transfer(TransferRequest {
            tx: buffer,
            rx: None,
            completion: Box::new(move |_| {
                done_tx
                    .send((observer.live_allocations(), observer.used_bytes()))
                    .unwrap();
            }),
        })
        .unwrap();

    assert_eq!(
        done_rx.recv_timeout(Duration::from_secs(5)).unwrap(),
        (0, 0)
    );
    assert!(!engine.is_busy());
}

#[test]
fn test_engine_can_be_reused_after_completion() {
    let recorder = Recorder::default();
    let device = Arc::new(EmulatedDmaDevice::new(3, recorder.clone()).tx_only());
    let engine = TransferEngine::open(device.clone(), TransferMode::OneWay).unwrap();

    for round in 0..3u8 {
        let buffer = engine.allocate(2).unwrap().unwrap();
        engine.pool().write(buffer, 0, &[round, round]).unwrap();
        let (done_tx, done_rx) = mpsc::channel();
        engine
            .start_transfer(TransferRequest {
                tx: buffer,
                rx: None,
                completion: Box::new(move |_| done_tx.send(()).unwrap()),
            })
            .unwrap();
        done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    }

    assert_eq!(*recorder.played.lock().unwrap(), vec![0, 0, 1, 1, 2, 2]);
    assert_eq!(device.transfers_started(), 3);
    assert_eq!(device.live_allocations(), 0);
}

#[test]
fn test_stopped_transfer_never_reaches_peripheral() {
    let recorder = Recorder::default();
    let device = Arc::new(EmulatedDmaDevice::new(3, recorder.clone()).tx_only());
    let engine = TransferEngine::open(device.clone(), TransferMode::OneWay).unwrap();

    // 5000 bytes drain in 5 s
    let buffer = engine.allocate(5000).unwrap().unwrap();
    engine
        .start_transfer(TransferRequest {
            tx: buffer,
            rx: None,
            completion: Box::new(|_| panic!("stopped transfer must not complete")),
        })
        .unwrap();
    assert!(engine.stop_transfer());

    std::thread::sleep(Duration::from_millis(50));
    assert!(recorder.played.lock().unwrap().is_empty());
    assert_eq!(engine.pool().lookup(buffer), None);
    assert_eq!(engine.release(buffer), Err(DmaError::UnknownBuffer));
}

#[test]
fn test_dropping_engine_releases_everything() {
    let device = Arc::new(EmulatedDmaDevice::new(5, Recorder::default()));
    {
        let engine = TransferEngine::open(device.clone(), TransferMode::TwoWay).unwrap();
        let mut slot = engine.reserve().unwrap();
        let tx = slot.allocate(1000).unwrap();
        let rx = slot.allocate(1000).unwrap();
        slot.start_two_way(tx, rx, Box::new(|_| {})).unwrap();
        engine.allocate(64).unwrap();
    }
    assert_eq!(device.live_allocations(), 0);
    assert_eq!(device.index(), 5);
}

/// Device whose completions are raised by the test. Every registered
/// callback is kept, so an old one can be fired after a newer transfer has
/// started, as a driver does when its notification races a stop.
#[derive(Default)]
struct ManualDevice {
    memory: Mutex<HashMap<u64, Vec<u8>>>,
    next_addr: Mutex<u64>,
    callbacks: Mutex<Vec<CompletionCallback>>,
}

impl ManualDevice {
    fn callback(&self, n: usize) -> CompletionCallback {
        self.callbacks.lock().unwrap()[n].clone()
    }
}

impl DmaDevice for ManualDevice {
    fn index(&self) -> u32 {
        9
    }

    fn tx_channels(&self) -> Vec<ChannelId> {
        vec![0]
    }

    fn rx_channels(&self) -> Vec<ChannelId> {
        Vec::new()
    }

    fn allocate(&self, size: usize) -> Option<DmaAddr> {
        let mut next = self.next_addr.lock().unwrap();
        *next += 0x1000;
        self.memory.lock().unwrap().insert(*next, vec![0; size]);
        Some(DmaAddr(*next))
    }

    fn free(&self, addr: DmaAddr, _size: usize) {
        self.memory.lock().unwrap().remove(&addr.0);
    }

    fn write(&self, addr: DmaAddr, offset: usize, data: &[u8]) {
        if let Some(region) = self.memory.lock().unwrap().get_mut(&addr.0) {
            region[offset..offset + data.len()].copy_from_slice(data);
        }
    }

    fn read(&self, addr: DmaAddr, offset: usize, buf: &mut [u8]) {
        if let Some(region) = self.memory.lock().unwrap().get(&addr.0) {
            buf.copy_from_slice(&region[offset..offset + buf.len()]);
        }
    }

    fn set_completion_callback(&self, _channel: ChannelId, callback: Option<CompletionCallback>) {
        if let Some(callback) = callback {
            self.callbacks.lock().unwrap().push(callback);
        }
    }

    fn start_one_way(
        &self,
        _channel: ChannelId,
        _addr: DmaAddr,
        _size: usize,
    ) -> Result<(), DmaError> {
        Ok(())
    }

    fn start_two_way(
        &self,
        tx_channel: ChannelId,
        _tx_addr: DmaAddr,
        _tx_size: usize,
        _rx_channel: ChannelId,
        _rx_addr: DmaAddr,
        _rx_size: usize,
    ) -> Result<(), DmaError> {
        Err(DmaError::TransferFailure {
            channel: tx_channel,
            reason: "one-way only".into(),
        })
    }

    fn stop(&self, _channel: ChannelId) {}
}

#[test]
fn test_late_notification_of_stopped_transfer_is_ignored() {
    let device = Arc::new(ManualDevice::default());
    let engine = TransferEngine::open(device.clone(), TransferMode::OneWay).unwrap();
    let (done_tx, done_rx) = mpsc::channel();

    let first = engine.allocate(1).unwrap().unwrap();
    let sender = done_tx.clone();
    engine
        .start_transfer(TransferRequest {
            tx: first,
            rx: None,
            completion: Box::new(move |_| sender.send("first").unwrap()),
        })
        .unwrap();
    assert!(engine.stop_transfer());

    let second = engine.allocate(2).unwrap().unwrap();
    engine
        .start_transfer(TransferRequest {
            tx: second,
            rx: None,
            completion: Box::new(move |_| done_tx.send("second").unwrap()),
        })
        .unwrap();

    // the first transfer's notification arrives after the second launched
    (device.callback(0))(0);
    assert!(done_rx.try_recv().is_err());
    assert!(engine.is_busy());
    assert_eq!(engine.pool().lookup(second), Some(2));
    assert!(matches!(
        engine.start_transfer(TransferRequest {
            tx: engine.allocate(1).unwrap().unwrap(),
            rx: None,
            completion: Box::new(|_| {}),
        }),
        Err(DmaError::Busy)
    ));

    (device.callback(1))(0);
    assert_eq!(done_rx.try_recv().unwrap(), "second");
    assert!(!engine.is_busy());
    assert_eq!(engine.pool().lookup(second), None);
}
