pub mod get;
pub mod init;
pub mod lifecycle;
pub mod shell;
