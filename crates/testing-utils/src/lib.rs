//! # Fleet Testing Utils
//!
//! 工作区共享的测试替身：传输端口、进程句柄和Worker的内存实现，
//! 记录每次调用以便断言，不依赖真实传输或操作系统进程。
//!
//! ```toml
//! [dev-dependencies]
//! fleet-testing-utils = { path = "../testing-utils" }
//! ```

pub mod mocks;

pub use mocks::*;
