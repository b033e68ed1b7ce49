//! Depot CLI - convert docker archives and manage the image store.

pub mod commands;
pub mod output;
