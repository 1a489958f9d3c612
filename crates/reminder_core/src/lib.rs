pub mod config;
pub mod credentials;
pub mod engine;
pub mod error;
pub mod model;
pub mod push;
pub mod runner;
pub mod source;
pub mod storage;
