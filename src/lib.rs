// ABOUTME: Library crate for pipelog exposing the streaming core, viewer and TUI

#![allow(missing_docs)]

pub mod config;
pub mod models;
pub mod source;
pub mod stream;
pub mod tui;
pub mod viewer;
