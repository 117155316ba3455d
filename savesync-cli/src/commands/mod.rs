pub mod check;
pub mod config;
pub mod daemon;
pub mod init;
