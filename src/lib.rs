//! Agent Delegate - run external coding agents as supervised subprocesses.

pub mod agents;
pub mod cli;
pub mod config;
pub mod display;
pub mod run;
