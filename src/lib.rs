//! Unattended mailbox agent that saves PDF attachments of report emails.

pub mod classify;
pub mod config;
pub mod daemon;
pub mod domain;
pub mod error;
pub mod mail;
pub mod pipeline;
pub mod store;
