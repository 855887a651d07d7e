// Licensed under the Apache-2.0 license

use fpga_codec::registers::{CLOCK_CONTROL, HP_RIGHT_VOL, PLAY_MIXER_LEFT_0, PLL_CONTROL};
use fpga_codec::{
    CodecError, CodecPlaybackEngine, CommandFifo, EmulatedAdau1761, EmulatedI2sSink,
    DEFAULT_SAMPLE_RATE, DEFAULT_VOLUME, MAX_VOLUME,
};
use fpga_dma::EmulatedDmaDevice;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

struct Rig {
    player: CodecPlaybackEngine,
    codec: EmulatedAdau1761,
    sink: EmulatedI2sSink,
    dma: Arc<EmulatedDmaDevice>,
}

fn rig(latency: Duration) -> Rig {
    let codec = EmulatedAdau1761::new().with_lock_after(3);
    let sink = EmulatedI2sSink::new().with_latency(latency);
    let dma = Arc::new(EmulatedDmaDevice::new(3, sink.clone()).tx_only());
    let mut player =
        CodecPlaybackEngine::new(Box::new(CommandFifo::new(codec.clone())), dma.clone()).unwrap();
    player.init().unwrap();
    Rig {
        player,
        codec,
        sink,
        dma,
    }
}

fn loaded_buffer(player: &CodecPlaybackEngine, samples: &[u8]) -> fpga_dma::BufferHandle {
    let buffer = player.request_buffer(samples.len()).unwrap().unwrap();
    player.write_buffer(buffer, 0, samples).unwrap();
    buffer
}

#[test]
fn test_init_programs_playback_path() {
    let rig = rig(Duration::ZERO);
    assert_eq!(rig.codec.register(CLOCK_CONTROL), Some(vec![0x0F]));
    assert_eq!(rig.codec.register(PLAY_MIXER_LEFT_0), Some(vec![0x21]));
    assert_eq!(rig.codec.register(PLL_CONTROL).unwrap()[5] & 0x01, 0x01);
    assert_eq!(rig.codec.pll_programs(), 1);
    // 3 unlocked polls, then lock
    assert_eq!(rig.codec.pll_polls(), 4);
    assert_eq!(rig.codec.headphone_volume(), Some(DEFAULT_VOLUME));
    // enable bits survive the volume update
    assert_eq!(
        rig.codec.register(HP_RIGHT_VOL),
        Some(vec![(DEFAULT_VOLUME << 2) | 0x03])
    );
    assert_eq!(rig.player.sample_rate(), DEFAULT_SAMPLE_RATE);
}

#[test]
fn test_play_to_completion_frees_buffer() {
    let mut rig = rig(Duration::ZERO);
    let buffer = loaded_buffer(&rig.player, &[1, 2, 3, 4]);
    let (done_tx, done_rx) = mpsc::channel();

    rig.player
        .play(
            buffer,
            DEFAULT_SAMPLE_RATE,
            Box::new(move || done_tx.send(()).unwrap()),
        )
        .unwrap();
    done_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    assert_eq!(rig.sink.played(), vec![1, 2, 3, 4]);
    assert_eq!(rig.player.lookup_buffer(buffer), None);
    assert!(!rig.player.is_playing());
    assert_eq!(rig.dma.live_allocations(), 0);
    // same rate, no reprogramming
    assert_eq!(rig.codec.pll_programs(), 1);
}

#[test]
fn test_rate_change_waits_for_pll_lock() {
    let mut rig = rig(Duration::ZERO);
    let polls_before = rig.codec.pll_polls();
    let buffer = loaded_buffer(&rig.player, &[0; 8]);
    let (done_tx, done_rx) = mpsc::channel();

    rig.player
        .play(buffer, 44100, Box::new(move || done_tx.send(()).unwrap()))
        .unwrap();
    // the PLL was locked before the transfer was handed to the DMA
    assert_eq!(rig.codec.pll_programs(), 2);
    assert_eq!(rig.codec.pll_polls() - polls_before, 4);
    assert_eq!(rig.player.sample_rate(), 44100);
    done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
}

#[test]
fn test_unsupported_rate_leaves_playback_alone() {
    let mut rig = rig(Duration::from_secs(10));
    let first = loaded_buffer(&rig.player, &[9; 16]);
    rig.player
        .play(first, DEFAULT_SAMPLE_RATE, Box::new(|| {}))
        .unwrap();

    let second = loaded_buffer(&rig.player, &[7; 16]);
    let err = rig.player.play(second, 96000, Box::new(|| {})).unwrap_err();
    assert!(matches!(err, CodecError::UnsupportedSampleRate(96000)));
    assert!(rig.player.is_playing());
    assert_eq!(rig.player.lookup_buffer(first), Some(16));
    assert_eq!(rig.player.sample_rate(), DEFAULT_SAMPLE_RATE);
    assert_eq!(rig.codec.pll_programs(), 1);

    rig.player.release_buffer(second).unwrap();
    assert!(rig.player.stop());
}

#[test]
fn test_play_replaces_current_playback() {
    let mut rig = rig(Duration::from_secs(10));
    let first = loaded_buffer(&rig.player, &[1; 32]);
    rig.player
        .play(
            first,
            DEFAULT_SAMPLE_RATE,
            Box::new(|| panic!("replaced playback must not complete")),
        )
        .unwrap();

    let second = loaded_buffer(&rig.player, &[2; 32]);
    rig.player
        .play(second, DEFAULT_SAMPLE_RATE, Box::new(|| {}))
        .unwrap();
    assert_eq!(rig.player.lookup_buffer(first), None);
    assert_eq!(rig.player.lookup_buffer(second), Some(32));
    assert!(rig.player.stop());
    assert_eq!(rig.dma.live_allocations(), 0);
}

#[test]
fn test_stop_and_release() {
    let mut rig = rig(Duration::from_secs(10));
    let buffer = loaded_buffer(&rig.player, &[5; 64]);
    rig.player
        .play(buffer, DEFAULT_SAMPLE_RATE, Box::new(|| {}))
        .unwrap();

    // releasing the buffer in flight stops playback
    rig.player.release_buffer(buffer).unwrap();
    assert!(!rig.player.is_playing());
    assert!(matches!(
        rig.player.release_buffer(buffer),
        Err(CodecError::UnknownBuffer)
    ));
    assert!(!rig.player.stop());
    assert!(rig.sink.played().is_empty());
}

#[test]
fn test_zero_sized_buffer_request() {
    let rig = rig(Duration::ZERO);
    assert!(rig.player.request_buffer(0).unwrap().is_none());
}

#[test]
fn test_volume_clamps() {
    let mut rig = rig(Duration::ZERO);
    assert_eq!(rig.player.set_relative_volume(-2).unwrap(), DEFAULT_VOLUME - 2);
    assert_eq!(rig.player.set_relative_volume(5).unwrap(), DEFAULT_VOLUME + 3);
    assert_eq!(rig.player.set_relative_volume(-1000).unwrap(), 0);
    assert_eq!(rig.codec.headphone_volume(), Some(0));
    assert_eq!(rig.player.set_relative_volume(1000).unwrap(), MAX_VOLUME);
    assert_eq!(rig.codec.headphone_volume(), Some(MAX_VOLUME));
    assert_eq!(
        rig.codec.register(HP_RIGHT_VOL),
        Some(vec![(MAX_VOLUME << 2) | 0x03])
    );
}
