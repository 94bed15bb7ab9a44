//! # Rahl Core
//!
//! Session state, mode switching, prompt composition and reply
//! interpretation for the Rahl AI gateway. Everything that talks to the
//! network lives in `rahl-hub`; this crate only defines the boundary.

pub mod bus;
pub mod composer;
pub mod config;
pub mod error;
pub mod gateway;
pub mod interpret;
pub mod message;
pub mod provider;
pub mod session;
