//! VerifyBot - drive a chat assistant until its code verifiably works
//!
//! A task goes to a chat session; the reply is mined for runnable code,
//! each block is placed on the local machine, a Raspberry Pi, or an STM32
//! toolchain, executed, checked against acceptance tests derived from the
//! task, and the failures are fed back until the code passes or the
//! attempts run out.

pub mod acceptance;
pub mod chat;
pub mod classify;
pub mod credentials;
pub mod domain;
pub mod error;
pub mod exec;
pub mod extract;
pub mod id;
pub mod prompt;
pub mod runner;
pub mod transcript;

pub use error::{Result, VerifyError};
