// Licensed under the Apache-2.0 license

//! Terminal music player for the FPGA board: browses a directory, plays WAV
//! files through the ADAU1761 codec and encrypts or decrypts them in place
//! with the AES cores.
//!
//! Three kinds of threads cooperate. The UI actor owns the terminal and the
//! directory state, the player actor owns the codec, and every AES operation
//! runs on a short-lived job thread. They only talk through typed channels.

pub mod aes_job;
pub mod args;
pub mod hardware;
pub mod ipc;
pub mod navigator;
pub mod player;
pub mod ui;
pub mod wav;
pub mod xattr;
