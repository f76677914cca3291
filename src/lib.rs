pub mod aggregate;
pub mod app;
pub mod config;
pub mod copy;
pub mod descriptor;
pub mod discovery;
pub mod domain;
pub mod error;
pub mod output;
pub mod resolve;
pub mod tui;
