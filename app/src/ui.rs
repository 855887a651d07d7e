// Licensed under the Apache-2.0 license

//! The UI actor: directory browser, key handling and request dispatch.
//!
//! The UI never touches the hardware. It sends commands to the player and
//! spawns AES jobs, and learns about their outcome through its inbox.

use crate::aes_job;
use crate::ipc::{
    AesOperation, CommandResult, JobId, OperationRequest, OperationResult, Outcome,
    PlayerCommand, PlayerCommandKind, PlayerReply, RequestOutput, Shutdown, UiEvent,
};
use crate::navigator::{Direction, DirectoryNavigator};
use crate::xattr;
use crossterm::cursor::{MoveTo, MoveToNextLine};
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::queue;
use crossterm::style::{Attribute, Color, Print, ResetColor, SetAttribute, SetForegroundColor};
use crossterm::terminal::{Clear, ClearType};
use fpga_aes::{checked_aligned_size, Aes, AesKey, AES_TEXT_WIDTH};
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use strum_macros::Display;

/// Rows taken by the header and footer around the listing.
pub const CHROME_ROWS: u16 = 7;
/// Volume step of the arrow keys.
pub const VOLUME_STEP: i32 = 2;

const MSG_WAIT_FOR_PREPARATION: &str = "Please wait until previous selection finishes preparation.";
const MSG_ALREADY_ENCRYPTED: &str = "File already encrypted.";
const MSG_ALREADY_DECRYPTED: &str = "File already decrypted.";
const MSG_ENCRYPTING: &str = "encrypting...";
const MSG_DECRYPTING: &str = "decrypting...";
const MSG_XATTR_FAILED: &str = "Error setting encrypted attribute.";
const MSG_FAILED: &str = "Something went wrong.";
const MSG_BUSY: &str = "Engine busy, try again.";
const MSG_NO_THREAD: &str = "Failed to start AES thread.";
const MSG_NO_PLAYER: &str = "Player is not running.";
const MSG_TOO_LARGE: &str = "File too large.";

/// Playback state of a listed file. At most one file is preparing or playing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Display)]
pub enum FileStatus {
    #[default]
    #[strum(to_string = "")]
    Stopped,
    #[strum(to_string = "preparing to play...")]
    Preparing,
    #[strum(to_string = "♪ playing ♪")]
    Playing,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

pub struct UiConfig {
    pub root: PathBuf,
    pub key: AesKey,
    pub rows: u16,
}

/// Channel ends owned by the UI.
pub struct UiChannels {
    pub player: Sender<PlayerCommand>,
    pub inbox: Receiver<UiEvent>,
    /// Sender side of `inbox`, handed to every AES job.
    pub events: Sender<UiEvent>,
}

pub struct UiActor<W: Write> {
    out: W,
    navigator: DirectoryNavigator<FileStatus>,
    key: AesKey,
    aes: Arc<Aes>,
    channels: UiChannels,
    jobs: HashMap<JobId, JoinHandle<()>>,
    next_job: JobId,
    shutdown: Shutdown,
}

impl<W: Write> UiActor<W> {
    pub fn new(
        out: W,
        config: UiConfig,
        aes: Arc<Aes>,
        channels: UiChannels,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            out,
            navigator: DirectoryNavigator::open(config.root, scroll_height(config.rows)),
            key: config.key,
            aes,
            channels,
            jobs: HashMap::new(),
            next_job: 0,
            shutdown,
        }
    }

    pub fn navigator(&self) -> &DirectoryNavigator<FileStatus> {
        &self.navigator
    }

    /// AES jobs whose result has not been handled yet.
    pub fn pending_jobs(&self) -> usize {
        self.jobs.len()
    }

    /// Event loop. Blocks on the inbox, handles everything that queued up
    /// with results ahead of key presses, then redraws. Returns after a quit
    /// key or a shutdown event, with every AES job joined.
    pub fn run(mut self) -> io::Result<()> {
        let result = self.event_loop();
        self.finish();
        result
    }

    fn event_loop(&mut self) -> io::Result<()> {
        self.render()?;
        loop {
            let Ok(first) = self.channels.inbox.recv() else {
                return Ok(());
            };
            let mut batch = vec![first];
            batch.extend(self.channels.inbox.try_iter());
            batch.sort_by_key(|event| matches!(event, UiEvent::Key(_)));

            let mut flow = Flow::Continue;
            for event in batch {
                match (flow, event) {
                    (Flow::Exit, UiEvent::Key(_)) => {}
                    (Flow::Exit, event) => {
                        self.handle_event(event);
                    }
                    (Flow::Continue, event) => flow = self.handle_event(event),
                }
            }
            if flow == Flow::Exit {
                return Ok(());
            }
            self.render()?;
        }
    }

    /// Handles the next event, waiting up to `timeout` for one.
    pub fn process_next(&mut self, timeout: Duration) -> Option<Flow> {
        match self.channels.inbox.recv_timeout(timeout) {
            Ok(event) => Some(self.handle_event(event)),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn handle_event(&mut self, event: UiEvent) -> Flow {
        match event {
            UiEvent::Key(key) => return self.handle_key(key),
            UiEvent::Player(reply) => self.handle_player_reply(reply),
            UiEvent::Aes { job, result } => self.handle_aes_result(job, result),
            UiEvent::Resize(rows) => self.navigator.set_scroll_height(scroll_height(rows)),
            UiEvent::Shutdown => return Flow::Exit,
        }
        Flow::Continue
    }

    /// Stops the player, cancels outstanding AES jobs and waits for them.
    /// Results that arrive meanwhile are still handled so temporary files
    /// do not leak.
    pub fn finish(&mut self) {
        info!("Shutting down UI");
        let _ = self.channels.player.send(PlayerCommand::Exit);
        self.shutdown.trigger();

        for (job, thread) in self.jobs.drain() {
            if thread.join().is_err() {
                error!("AES job {} panicked", job);
            }
        }
        while let Ok(event) = self.channels.inbox.try_recv() {
            if let UiEvent::Aes { job, result } = event {
                self.handle_aes_result(job, result);
            }
        }
    }

    fn handle_key(&mut self, key: KeyEvent) -> Flow {
        if key.kind == KeyEventKind::Release {
            return Flow::Continue;
        }
        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                return Flow::Exit
            }
            KeyCode::Char('q') | KeyCode::Esc => return Flow::Exit,
            KeyCode::Up => {
                self.navigator.navigate(Direction::Up);
            }
            KeyCode::Down => {
                self.navigator.navigate(Direction::Down);
            }
            KeyCode::Left => {
                self.send_player(PlayerCommand::Volume(-VOLUME_STEP));
            }
            KeyCode::Right => {
                self.send_player(PlayerCommand::Volume(VOLUME_STEP));
            }
            KeyCode::Char(' ') => self.toggle_playback(),
            KeyCode::Char('e') => self.start_cipher(AesOperation::Encrypt),
            KeyCode::Char('d') => self.start_cipher(AesOperation::Decrypt),
            _ => {}
        }
        Flow::Continue
    }

    fn selected(&self) -> Option<(PathBuf, FileStatus)> {
        self.navigator.current().map(|e| (e.path.clone(), e.tag))
    }

    fn send_player(&self, command: PlayerCommand) -> bool {
        let kind = command.kind();
        if self.channels.player.send(command).is_err() {
            warn!("Player gone, dropped {}", kind);
            return false;
        }
        true
    }

    fn toggle_playback(&mut self) {
        let Some((path, status)) = self.selected() else {
            return;
        };

        if status == FileStatus::Playing {
            self.send_player(PlayerCommand::Stop);
            return;
        }
        if self.navigator.has_tag(FileStatus::Preparing) {
            self.navigator.set_suffix(&path, MSG_WAIT_FOR_PREPARATION);
            return;
        }
        if self.navigator.has_tag(FileStatus::Playing) {
            self.send_player(PlayerCommand::Stop);
        }

        if xattr::is_encrypted(&path) {
            let capacity = match fs::metadata(&path) {
                Ok(meta) => match checked_aligned_size(meta.len(), AES_TEXT_WIDTH) {
                    Some(capacity) => capacity,
                    None => {
                        self.navigator.set_suffix(&path, MSG_TOO_LARGE);
                        return;
                    }
                },
                Err(err) => {
                    self.navigator.set_suffix(&path, err.to_string());
                    return;
                }
            };
            let request = OperationRequest {
                kind: AesOperation::DecryptInto,
                key: self.key,
                input_path: path.clone(),
                output: RequestOutput::Buffer {
                    capacity,
                },
            };
            if self.spawn_job(request) {
                self.navigator.set_tag(&path, FileStatus::Preparing);
            } else {
                self.navigator.set_suffix(&path, MSG_NO_THREAD);
            }
        } else {
            match fs::read(&path) {
                Ok(audio) => self.start_playing(&path, audio),
                Err(err) => {
                    self.navigator.set_suffix(&path, err.to_string());
                }
            }
        }
    }

    fn start_playing(&mut self, path: &Path, audio: Vec<u8>) {
        if self.send_player(PlayerCommand::Play { audio }) {
            self.navigator.set_tag(path, FileStatus::Preparing);
        } else {
            self.navigator.set_tag(path, FileStatus::Stopped);
            self.navigator.set_suffix(path, MSG_NO_PLAYER);
        }
    }

    fn start_cipher(&mut self, kind: AesOperation) {
        let Some((path, _)) = self.selected() else {
            return;
        };

        let encrypted = xattr::is_encrypted(&path);
        match kind {
            AesOperation::Encrypt if encrypted => {
                self.navigator.set_suffix(&path, MSG_ALREADY_ENCRYPTED);
                return;
            }
            AesOperation::Decrypt if !encrypted => {
                self.navigator.set_suffix(&path, MSG_ALREADY_DECRYPTED);
                return;
            }
            _ => {}
        }

        let request = OperationRequest {
            kind,
            key: self.key,
            input_path: path.clone(),
            output: RequestOutput::File(temp_path(&path, self.next_job)),
        };
        let message = if !self.spawn_job(request) {
            MSG_NO_THREAD
        } else if kind == AesOperation::Encrypt {
            MSG_ENCRYPTING
        } else {
            MSG_DECRYPTING
        };
        self.navigator.set_suffix(&path, message);
    }

    fn spawn_job(&mut self, request: OperationRequest) -> bool {
        let job = self.next_job;
        self.next_job += 1;
        debug!("Spawning AES job {}: {} {}", job, request.kind, request.input_path.display());
        match aes_job::spawn(
            job,
            self.aes.clone(),
            request,
            self.channels.events.clone(),
            self.shutdown.clone(),
        ) {
            Ok(thread) => {
                self.jobs.insert(job, thread);
                true
            }
            Err(err) => {
                error!("Failed to spawn AES job: {}", err);
                false
            }
        }
    }

    fn handle_player_reply(&mut self, reply: PlayerReply) {
        match (reply.command, reply.result) {
            (PlayerCommandKind::Play, CommandResult::Success) => {
                self.navigator
                    .change_tags(FileStatus::Preparing, FileStatus::Playing);
            }
            (PlayerCommandKind::Play, CommandResult::Failure) => {
                let preparing: Vec<PathBuf> = self
                    .navigator
                    .entries()
                    .iter()
                    .filter(|e| e.tag == FileStatus::Preparing)
                    .map(|e| e.path.clone())
                    .collect();
                let detail = reply.detail.unwrap_or_else(|| MSG_FAILED.to_string());
                for path in preparing {
                    self.navigator.set_suffix(&path, detail.as_str());
                }
                self.navigator
                    .change_tags(FileStatus::Preparing, FileStatus::Stopped);
            }
            (PlayerCommandKind::Stop, _) => {
                self.navigator
                    .change_tags(FileStatus::Playing, FileStatus::Stopped);
            }
            _ => {}
        }
    }

    fn handle_aes_result(&mut self, job: JobId, result: OperationResult) {
        if let Some(thread) = self.jobs.remove(&job) {
            let _ = thread.join();
        }
        let input = result.input_path.as_path();

        match result.outcome {
            Outcome::Success => match result.kind {
                AesOperation::Encrypt => {
                    if let Some(output) = &result.output_path {
                        self.commit_encrypted(input, output);
                    }
                    self.navigator.reload();
                }
                AesOperation::Decrypt => {
                    if let Some(output) = &result.output_path {
                        // the new file carries no encrypted marker
                        let message = match fs::rename(output, input) {
                            Ok(()) => String::new(),
                            Err(err) => {
                                let _ = fs::remove_file(output);
                                err.to_string()
                            }
                        };
                        self.navigator.set_suffix(input, message);
                    }
                    self.navigator.reload();
                }
                AesOperation::DecryptInto => {
                    let mut audio = result.output_buffer.unwrap_or_default();
                    if let Some(len) = fs::metadata(input)
                        .ok()
                        .and_then(|meta| usize::try_from(meta.len()).ok())
                    {
                        audio.truncate(len);
                    }
                    self.start_playing(input, audio);
                }
                AesOperation::EncryptInto => {
                    debug!("Discarding in-memory encryption of {}", input.display());
                }
            },
            Outcome::Failed | Outcome::Busy => {
                if let Some(error) = &result.error {
                    error!("{} of {} failed: {}", result.kind, input.display(), error);
                }
                if result.kind == AesOperation::DecryptInto {
                    self.navigator.set_tag(input, FileStatus::Stopped);
                }
                if let Some(output) = &result.output_path {
                    let _ = fs::remove_file(output);
                }
                let message = if result.outcome == Outcome::Busy {
                    MSG_BUSY
                } else {
                    MSG_FAILED
                };
                self.navigator.set_suffix(input, message);
            }
        }
    }

    /// Marks the encrypted output and moves it over the input.
    fn commit_encrypted(&mut self, input: &Path, output: &Path) {
        if let Err(err) = xattr::mark_encrypted(output) {
            warn!("Failed to mark {}: {}", output.display(), err);
            let _ = fs::remove_file(output);
            self.navigator.set_suffix(input, MSG_XATTR_FAILED);
            return;
        }
        match fs::rename(output, input) {
            Ok(()) => {
                self.navigator.set_suffix(input, "");
            }
            Err(err) => {
                let _ = fs::remove_file(output);
                self.navigator.set_suffix(input, err.to_string());
            }
        }
    }

    /// Redraws the whole screen.
    pub fn render(&mut self) -> io::Result<()> {
        queue!(
            self.out,
            MoveTo(0, 0),
            Clear(ClearType::All),
            SetAttribute(Attribute::Bold),
            Print("AES music player"),
            SetAttribute(Attribute::Reset),
            MoveToNextLine(1),
            Print("up/down: select  space: play/stop  left/right: volume"),
            MoveToNextLine(1),
            Print("e: encrypt  d: decrypt  q: quit"),
            MoveToNextLine(2)
        )?;

        let current = self.navigator.current_index();
        for index in self.navigator.window() {
            let entry = &self.navigator.entries()[index];
            let mut line = entry.label.clone();
            if entry.encrypted {
                line.push_str(" 🔑");
            }
            if !entry.suffix.is_empty() {
                line.push_str(&format!(" [{}]", entry.suffix));
            }
            if entry.tag != FileStatus::Stopped {
                line.push_str(&format!(" [{}]", entry.tag));
            }

            if Some(index) == current {
                let split = entry.label.rfind('─').unwrap_or(0);
                let (tree, name) = line.split_at(split);
                queue!(
                    self.out,
                    Print(tree),
                    SetForegroundColor(Color::Red),
                    SetAttribute(Attribute::Bold),
                    Print(name),
                    SetAttribute(Attribute::Reset),
                    ResetColor
                )?;
            } else {
                queue!(self.out, Print(line))?;
            }
            queue!(self.out, MoveToNextLine(1))?;
        }
        self.out.flush()
    }
}

fn scroll_height(rows: u16) -> usize {
    rows.saturating_sub(CHROME_ROWS).max(1) as usize
}

/// Hidden sibling of `path` that receives the output of `job`.
fn temp_path(path: &Path, job: JobId) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.{}-{}.aes", name, std::process::id(), job))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_text() {
        assert_eq!(FileStatus::Stopped.to_string(), "");
        assert_eq!(FileStatus::Preparing.to_string(), "preparing to play...");
        assert_eq!(FileStatus::Playing.to_string(), "♪ playing ♪");
    }

    #[test]
    fn test_temp_path_is_hidden_sibling() {
        let temp = temp_path(Path::new("/music/a.wav"), 7);
        assert_eq!(temp.parent(), Some(Path::new("/music")));
        let name = temp.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(".a.wav."));
        assert!(name.ends_with("-7.aes"));
    }

    #[test]
    fn test_scroll_height() {
        assert_eq!(scroll_height(24), 17);
        assert_eq!(scroll_height(3), 1);
    }
}
