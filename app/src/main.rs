// Licensed under the Apache-2.0 license

use aes_player::args::PlayerArgs;
use aes_player::hardware::Hardware;
use aes_player::ipc::{Shutdown, UiEvent};
use aes_player::player::Player;
use aes_player::ui::{UiActor, UiChannels, UiConfig};
use anyhow::Context;
use clap::Parser;
use crossterm::event::{self, Event};
use crossterm::{cursor, execute, terminal};
use log::error;
use simple_logger::SimpleLogger;
use std::io;
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const INPUT_POLL: Duration = Duration::from_millis(100);

fn main() -> anyhow::Result<()> {
    let args = PlayerArgs::parse();
    SimpleLogger::new().with_level(args.log_level).init()?;

    let hardware = Hardware::from_args(&args)?;
    let shutdown = Shutdown::new();
    let (events, inbox) = mpsc::channel();

    {
        let events = events.clone();
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            shutdown.trigger();
            let _ = events.send(UiEvent::Shutdown);
        })
        .context("installing Ctrl-C handler")?;
    }

    let player = Player::spawn(hardware.playback, events.clone(), shutdown.clone())
        .context("spawning player thread")?;
    let input = spawn_input(events.clone(), shutdown.clone()).context("spawning input thread")?;

    let (_, rows) = terminal::size().unwrap_or((80, 24));
    terminal::enable_raw_mode()?;
    execute!(io::stdout(), terminal::EnterAlternateScreen, cursor::Hide)?;

    let ui = UiActor::new(
        io::stdout(),
        UiConfig {
            root: args.directory.clone(),
            key: args.key,
            rows,
        },
        Arc::new(hardware.aes),
        UiChannels {
            player: player.sender(),
            inbox,
            events,
        },
        shutdown.clone(),
    );
    let result = ui.run();
    shutdown.trigger();

    let restored = execute!(io::stdout(), cursor::Show, terminal::LeaveAlternateScreen)
        .and_then(|_| terminal::disable_raw_mode());
    player.join();
    if input.join().is_err() {
        error!("Input thread panicked");
    }

    result.context("UI failed")?;
    restored.context("restoring terminal")?;
    Ok(())
}

/// Forwards key presses and resizes to the UI until shutdown.
fn spawn_input(events: Sender<UiEvent>, shutdown: Shutdown) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("input".into())
        .spawn(move || {
            while !shutdown.is_triggered() {
                match event::poll(INPUT_POLL) {
                    Ok(true) => {}
                    Ok(false) => continue,
                    Err(err) => {
                        error!("Reading terminal input failed: {}", err);
                        let _ = events.send(UiEvent::Shutdown);
                        break;
                    }
                }
                let forwarded = match event::read() {
                    Ok(Event::Key(key)) => events.send(UiEvent::Key(key)),
                    Ok(Event::Resize(_, rows)) => events.send(UiEvent::Resize(rows)),
                    Ok(_) => Ok(()),
                    Err(err) => {
                        error!("Reading terminal input failed: {}", err);
                        events.send(UiEvent::Shutdown)
                    }
                };
                if forwarded.is_err() {
                    break;
                }
            }
        })
}
