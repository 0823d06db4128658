pub mod imap_client;
pub mod parser;
pub mod session;
