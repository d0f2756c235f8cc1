pub mod action;
pub mod audit;
pub mod catalog;
pub mod config;
pub mod init;
