//! Crash and subprocess scenarios

mod backup;
mod commands;
mod restore;
