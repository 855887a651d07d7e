// Licensed under the Apache-2.0 license

use aes_player::aes_job;
use aes_player::args::PlayerArgs;
use aes_player::hardware::Hardware;
use aes_player::ipc::{
    AesOperation, OperationRequest, Outcome, PlayerCommand, PlayerCommandKind, PlayerReply,
    RequestOutput, Shutdown, UiEvent,
};
use aes_player::player::Player;
use aes_player::wav::encode_pcm;
use clap::Parser;
use fpga_aes::{Aes, AesChannel, AesKey, CipherDirection, EmulatedAesCore};
use fpga_dma::EmulatedDmaDevice;
use std::path::Path;
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const KEY: AesKey = AesKey([0xFFFF_FFFF, 0x0000_0000, 0xAAAA_AAAA, 0xCCCC_CCCC]);
const TIMEOUT: Duration = Duration::from_secs(5);

fn emulated_args(dir: &Path) -> PlayerArgs {
    PlayerArgs::parse_from(["aes-player", "--emulated", dir.to_str().unwrap()])
}

fn next_reply(inbox: &Receiver<UiEvent>) -> PlayerReply {
    match inbox.recv_timeout(TIMEOUT).unwrap() {
        UiEvent::Player(reply) => reply,
        other => panic!("unexpected event {:?}", other),
    }
}

fn slow_aes(latency: Duration) -> Arc<Aes> {
    let channel = |direction, index| {
        let core = EmulatedAesCore::new(direction).with_latency(latency);
        AesChannel::new(
            direction,
            Arc::new(EmulatedDmaDevice::new(index, core.clone())),
            Box::new(core),
        )
        .unwrap()
    };
    Arc::new(Aes::new(
        channel(CipherDirection::Encrypt, 1),
        channel(CipherDirection::Decrypt, 2),
    ))
}

fn encrypt_request(dir: &TempDir, len: usize) -> OperationRequest {
    let input = dir.path().join("song.wav");
    std::fs::write(&input, vec![0x5A; len]).unwrap();
    OperationRequest {
        kind: AesOperation::Encrypt,
        key: KEY,
        input_path: input,
        output: RequestOutput::File(dir.path().join("song.enc")),
    }
}

#[test]
fn test_player_replies_and_reports_end_of_playback() {
    let dir = TempDir::new().unwrap();
    let hardware = Hardware::emulated(&emulated_args(dir.path()), Duration::from_millis(200)).unwrap();
    let (events, inbox) = mpsc::channel();
    let player = Player::spawn(hardware.playback, events, Shutdown::new()).unwrap();
    let commands = player.sender();

    commands
        .send(PlayerCommand::Play {
            audio: encode_pcm(2, 44100, 16, &[0x11; 64]),
        })
        .unwrap();
    assert_eq!(
        next_reply(&inbox),
        PlayerReply::success(PlayerCommandKind::Play)
    );
    // unsolicited once the buffer has been played out
    assert_eq!(
        next_reply(&inbox),
        PlayerReply::success(PlayerCommandKind::Stop)
    );

    player.join();
}

#[test]
fn test_player_rejects_bad_audio() {
    let dir = TempDir::new().unwrap();
    let hardware = Hardware::emulated(&emulated_args(dir.path()), Duration::ZERO).unwrap();
    let (events, inbox) = mpsc::channel();
    let player = Player::spawn(hardware.playback, events, Shutdown::new()).unwrap();
    let commands = player.sender();

    commands
        .send(PlayerCommand::Play {
            audio: b"definitely not a wav".to_vec(),
        })
        .unwrap();
    let reply = next_reply(&inbox);
    assert_eq!(reply.command, PlayerCommandKind::Play);
    assert_eq!(reply.result, aes_player::ipc::CommandResult::Failure);
    assert!(reply.detail.unwrap().contains("decoding audio"));

    commands
        .send(PlayerCommand::Play {
            audio: encode_pcm(1, 96000, 16, &[0; 8]),
        })
        .unwrap();
    let reply = next_reply(&inbox);
    assert!(reply.detail.unwrap().contains("96000"));

    // volume changes are silent, the stop reply comes next
    commands.send(PlayerCommand::Volume(-4)).unwrap();
    commands.send(PlayerCommand::Stop).unwrap();
    assert_eq!(
        next_reply(&inbox),
        PlayerReply::success(PlayerCommandKind::Stop)
    );

    player.join();
}

#[test]
fn test_player_stop_cancels_playback() {
    let dir = TempDir::new().unwrap();
    let hardware = Hardware::emulated(&emulated_args(dir.path()), Duration::from_secs(30)).unwrap();
    let (events, inbox) = mpsc::channel();
    let player = Player::spawn(hardware.playback, events, Shutdown::new()).unwrap();
    let commands = player.sender();

    commands
        .send(PlayerCommand::Play {
            audio: encode_pcm(2, 48000, 16, &[0x22; 256]),
        })
        .unwrap();
    assert_eq!(
        next_reply(&inbox),
        PlayerReply::success(PlayerCommandKind::Play)
    );
    commands.send(PlayerCommand::Stop).unwrap();
    assert_eq!(
        next_reply(&inbox),
        PlayerReply::success(PlayerCommandKind::Stop)
    );
    // a stopped playback never reports its end
    assert!(inbox.recv_timeout(Duration::from_millis(200)).is_err());

    player.join();
}

#[test]
fn test_player_exits_on_shutdown() {
    let dir = TempDir::new().unwrap();
    let hardware = Hardware::emulated(&emulated_args(dir.path()), Duration::ZERO).unwrap();
    let (events, _inbox) = mpsc::channel();
    let shutdown = Shutdown::new();
    let player = Player::spawn(hardware.playback, events, shutdown.clone()).unwrap();
    let commands = player.sender();

    shutdown.trigger();
    let deadline = Instant::now() + TIMEOUT;
    // the command loop drops its receiver once it leaves
    while commands.send(PlayerCommand::Volume(0)).is_ok() {
        assert!(Instant::now() < deadline, "player ignored shutdown");
        thread::sleep(Duration::from_millis(20));
    }
    player.join();
}

#[test]
fn test_aes_job_success_writes_output() {
    let dir = TempDir::new().unwrap();
    let aes = slow_aes(Duration::ZERO);
    let request = encrypt_request(&dir, 100);

    let result = aes_job::run(&aes, &request, &Shutdown::new());
    assert_eq!(result.outcome, Outcome::Success);
    assert_eq!(result.output_path, Some(dir.path().join("song.enc")));
    assert_eq!(
        std::fs::metadata(dir.path().join("song.enc")).unwrap().len(),
        112
    );
}

#[test]
fn test_aes_job_into_buffer() {
    let dir = TempDir::new().unwrap();
    let aes = slow_aes(Duration::ZERO);
    let mut request = encrypt_request(&dir, 16);
    request.kind = AesOperation::EncryptInto;
    request.output = RequestOutput::Buffer { capacity: 32 };

    let result = aes_job::run(&aes, &request, &Shutdown::new());
    assert_eq!(result.outcome, Outcome::Success);
    assert_eq!(result.output_path, None);
    let buffer = result.output_buffer.unwrap();
    assert_eq!(buffer.len(), 32);
    assert_ne!(&buffer[..16], &[0x5A; 16]);
}

#[test]
fn test_aes_job_failure_is_reported() {
    let dir = TempDir::new().unwrap();
    let aes = slow_aes(Duration::ZERO);
    let mut request = encrypt_request(&dir, 16);
    request.input_path = dir.path().join("missing.wav");

    let result = aes_job::run(&aes, &request, &Shutdown::new());
    assert_eq!(result.outcome, Outcome::Failed);
    assert!(result.error.unwrap().contains("missing.wav"));
}

#[test]
fn test_aes_job_busy_on_same_core() {
    let dir = TempDir::new().unwrap();
    let aes = slow_aes(Duration::from_secs(30));
    let shutdown = Shutdown::new();
    let (events, inbox) = mpsc::channel();
    let first = encrypt_request(&dir, 32);
    let thread = aes_job::spawn(1, aes.clone(), first.clone(), events, shutdown.clone()).unwrap();

    let deadline = Instant::now() + TIMEOUT;
    while !aes.is_busy(CipherDirection::Encrypt) {
        assert!(Instant::now() < deadline);
        thread::sleep(Duration::from_millis(5));
    }
    let second = aes_job::run(&aes, &first, &shutdown);
    assert_eq!(second.outcome, Outcome::Busy);

    shutdown.trigger();
    thread.join().unwrap();
    match inbox.recv_timeout(TIMEOUT).unwrap() {
        UiEvent::Aes { job, result } => {
            assert_eq!(job, 1);
            assert_eq!(result.outcome, Outcome::Failed);
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert!(!aes.is_busy(CipherDirection::Encrypt));
}

#[test]
fn test_aes_job_cancelled_by_shutdown() {
    let dir = TempDir::new().unwrap();
    let aes = slow_aes(Duration::from_secs(30));
    let shutdown = Shutdown::new();
    let (events, inbox) = mpsc::channel();
    let mut request = encrypt_request(&dir, 48);
    request.kind = AesOperation::Decrypt;

    let thread = aes_job::spawn(9, aes.clone(), request, events, shutdown.clone()).unwrap();
    let deadline = Instant::now() + TIMEOUT;
    while !aes.is_busy(CipherDirection::Decrypt) {
        assert!(Instant::now() < deadline);
        thread::sleep(Duration::from_millis(5));
    }
    shutdown.trigger();

    let UiEvent::Aes { job, result } = inbox.recv_timeout(TIMEOUT).unwrap() else {
        panic!("expected an AES result");
    };
    assert_eq!(job, 9);
    assert_eq!(result.outcome, Outcome::Failed);
    assert!(!dir.path().join("song.enc").exists());
    thread.join().unwrap();
    assert!(!aes.is_busy(CipherDirection::Decrypt));
}
