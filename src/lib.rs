pub mod actions;
pub mod cli;
pub mod config;
pub mod core;
pub mod engine;
pub mod exit;
pub mod inventory;
pub mod logs;
pub mod oracle;
pub mod platform;
pub mod probe;
pub mod rules;
pub mod ui;
