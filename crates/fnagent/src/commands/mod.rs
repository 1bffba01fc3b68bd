pub mod init;
pub mod runtimes;
pub mod start;
