// Licensed under the Apache-2.0 license

//! Messages exchanged between the UI, the player and the AES jobs.

use crossterm::event::KeyEvent;
use fpga_aes::{AesKey, CipherDirection};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use strum_macros::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PlayerCommandKind {
    Play,
    Stop,
    Volume,
    Exit,
}

/// Commands accepted by the player.
#[derive(Debug)]
pub enum PlayerCommand {
    /// Decode and play a WAV image. The player owns the bytes from here on.
    Play { audio: Vec<u8> },
    Stop,
    /// Relative volume change. No reply is sent.
    Volume(i32),
    /// Stop playback and leave the command loop. No reply is sent.
    Exit,
}

impl PlayerCommand {
    pub fn kind(&self) -> PlayerCommandKind {
        match self {
            PlayerCommand::Play { .. } => PlayerCommandKind::Play,
            PlayerCommand::Stop => PlayerCommandKind::Stop,
            PlayerCommand::Volume(_) => PlayerCommandKind::Volume,
            PlayerCommand::Exit => PlayerCommandKind::Exit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandResult {
    Success,
    Failure,
}

/// Player reply to PLAY or STOP. A STOP/SUCCESS also arrives unsolicited when
/// a playback runs to its end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerReply {
    pub command: PlayerCommandKind,
    pub result: CommandResult,
    pub detail: Option<String>,
}

impl PlayerReply {
    pub fn success(command: PlayerCommandKind) -> Self {
        Self {
            command,
            result: CommandResult::Success,
            detail: None,
        }
    }

    pub fn failure(command: PlayerCommandKind, detail: String) -> Self {
        Self {
            command,
            result: CommandResult::Failure,
            detail: Some(detail),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AesOperation {
    Encrypt,
    EncryptInto,
    Decrypt,
    DecryptInto,
}

impl AesOperation {
    pub fn direction(self) -> CipherDirection {
        match self {
            AesOperation::Encrypt | AesOperation::EncryptInto => CipherDirection::Encrypt,
            AesOperation::Decrypt | AesOperation::DecryptInto => CipherDirection::Decrypt,
        }
    }
}

/// Destination of an AES operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutput {
    File(PathBuf),
    Buffer { capacity: usize },
}

/// One encrypt or decrypt request, consumed by the job that runs it.
#[derive(Debug, Clone)]
pub struct OperationRequest {
    pub kind: AesOperation,
    pub key: AesKey,
    pub input_path: PathBuf,
    pub output: RequestOutput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Success,
    Failed,
    Busy,
}

/// Terminal result of an AES operation. Sent exactly once per request.
#[derive(Debug)]
pub struct OperationResult {
    pub kind: AesOperation,
    pub outcome: Outcome,
    pub input_path: PathBuf,
    pub output_path: Option<PathBuf>,
    pub output_buffer: Option<Vec<u8>>,
    pub error: Option<String>,
}

impl OperationResult {
    fn new(request: &OperationRequest, outcome: Outcome) -> Self {
        Self {
            kind: request.kind,
            outcome,
            input_path: request.input_path.clone(),
            output_path: match &request.output {
                RequestOutput::File(path) => Some(path.clone()),
                RequestOutput::Buffer { .. } => None,
            },
            output_buffer: None,
            error: None,
        }
    }

    pub fn success(request: &OperationRequest, output_buffer: Option<Vec<u8>>) -> Self {
        Self {
            output_buffer,
            ..Self::new(request, Outcome::Success)
        }
    }

    pub fn failed(request: &OperationRequest, error: impl ToString) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::new(request, Outcome::Failed)
        }
    }

    pub fn busy(request: &OperationRequest) -> Self {
        Self::new(request, Outcome::Busy)
    }
}

pub type JobId = u64;

/// Everything the UI loop waits on arrives through one inbox.
#[derive(Debug)]
pub enum UiEvent {
    Key(KeyEvent),
    Player(PlayerReply),
    Aes { job: JobId, result: OperationResult },
    /// Terminal height in rows.
    Resize(u16),
    /// The terminal went away or Ctrl-C was pressed.
    Shutdown,
}

/// Cancellation token handed to every actor.
#[derive(Clone, Debug, Default)]
pub struct Shutdown(Arc<AtomicBool>);

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
