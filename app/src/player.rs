// Licensed under the Apache-2.0 license

//! The player actor: owns the codec and plays one WAV image at a time.

use crate::ipc::{PlayerCommand, PlayerCommandKind, PlayerReply, Shutdown, UiEvent};
use crate::wav::Wav;
use anyhow::{anyhow, Context};
use fpga_codec::CodecPlaybackEngine;
use log::{debug, error, info, warn};
use std::io;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// How often an idle player looks at the shutdown token.
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

/// Handle to the player thread.
pub struct Player {
    commands: Sender<PlayerCommand>,
    thread: Option<JoinHandle<()>>,
}

impl Player {
    /// Starts the player thread. `engine` must already be initialized.
    pub fn spawn(
        engine: CodecPlaybackEngine,
        events: Sender<UiEvent>,
        shutdown: Shutdown,
    ) -> io::Result<Self> {
        let (commands, inbox) = mpsc::channel();
        let thread = thread::Builder::new()
            .name("player".into())
            .spawn(move || PlayerActor::new(engine, events).run(inbox, shutdown))?;
        Ok(Self {
            commands,
            thread: Some(thread),
        })
    }

    /// A sender for commands. Sending fails once the player has exited.
    pub fn sender(&self) -> Sender<PlayerCommand> {
        self.commands.clone()
    }

    /// Sends EXIT and waits for the thread to finish.
    pub fn join(mut self) {
        let _ = self.commands.send(PlayerCommand::Exit);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Player thread panicked");
            }
        }
    }
}

struct PlayerActor {
    engine: CodecPlaybackEngine,
    events: Sender<UiEvent>,
}

impl PlayerActor {
    fn new(engine: CodecPlaybackEngine, events: Sender<UiEvent>) -> Self {
        Self { engine, events }
    }

    fn run(mut self, inbox: Receiver<PlayerCommand>, shutdown: Shutdown) {
        loop {
            let command = match inbox.recv_timeout(SHUTDOWN_POLL) {
                Ok(command) => command,
                Err(RecvTimeoutError::Timeout) if shutdown.is_triggered() => break,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };
            debug!("Player received {}", command.kind());

            match command {
                PlayerCommand::Play { audio } => {
                    self.engine.stop();
                    let reply = match self.play(&audio) {
                        Ok(()) => PlayerReply::success(PlayerCommandKind::Play),
                        Err(err) => {
                            warn!("Playback failed: {:#}", err);
                            PlayerReply::failure(PlayerCommandKind::Play, format!("{:#}", err))
                        }
                    };
                    self.reply(reply);
                }
                PlayerCommand::Stop => {
                    self.engine.stop();
                    self.reply(PlayerReply::success(PlayerCommandKind::Stop));
                }
                PlayerCommand::Volume(delta) => {
                    if let Err(err) = self.engine.set_relative_volume(delta) {
                        warn!("Volume change failed: {}", err);
                    }
                }
                PlayerCommand::Exit => break,
            }
        }
        self.engine.stop();
        info!("Player exiting");
    }

    fn play(&mut self, audio: &[u8]) -> anyhow::Result<()> {
        let wav = Wav::parse(audio).context("decoding audio")?;
        let samples = wav.to_pcm16();
        let buffer = self
            .engine
            .request_buffer(samples.len())?
            .ok_or_else(|| anyhow!("file contains no samples"))?;

        let events = self.events.clone();
        let started = self.engine.write_buffer(buffer, 0, &samples).and_then(|_| {
            self.engine.play(
                buffer,
                wav.sample_rate,
                Box::new(move || {
                    let _ = events.send(UiEvent::Player(PlayerReply::success(
                        PlayerCommandKind::Stop,
                    )));
                }),
            )
        });
        if let Err(err) = started {
            let _ = self.engine.release_buffer(buffer);
            return Err(err.into());
        }
        info!(
            "Playing {} frames, {} channel(s) at {} Hz",
            wav.frames(),
            wav.channels,
            wav.sample_rate
        );
        Ok(())
    }

    fn reply(&self, reply: PlayerReply) {
        if self.events.send(UiEvent::Player(reply)).is_err() {
            debug!("UI gone, dropping player reply");
        }
    }
}
