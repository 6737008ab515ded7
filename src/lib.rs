//! # asksin
//!
//! A portable, no_std Rust implementation of the node side of the BidCoS
//! (HomeMatic "AskSin") wireless protocol, for battery powered sensor and
//! actuator nodes.
//!
//! This crate turns raw radio bytes into addressed, acknowledged, retried
//! protocol messages and exposes the register/peer configuration model a
//! central controller queries and mutates remotely. It is built from:
//! - a reversible frame codec (the protocol's XOR chain scrambling, which is
//!   *not* encryption)
//! - a single-flight send scheduler with retries, ACK correlation and peer
//!   fan-out
//! - per-channel register lists persisted in a [`hal::Backing`] store, and
//!   fixed-capacity peer tables
//! - slice-wise transfer of configuration answers larger than one frame
//!
//! The radio transceiver, the power manager and the non-volatile store are
//! collaborators behind the traits in [`hal`].
//!
//! ## Crate features
//! | Feature               | Description |
//! |-----------------------|-------------|
//! | `std`                 | Disables `#![no_std]` support |
//! | `delay-loop`          | Drives the engine from a blocking loop over `embedded_hal::delay::DelayNs` |
//! | `timer-isr` (default) | Millisecond clock and global engine behind `critical_section::with` |
//! | `defmt-0-3`           | Uses `defmt` logging |
//! | `log`                 | Uses `log` logging |
//!
//! ## Usage
//!
//! ```rust,ignore
//! use asksin::channel::Channel;
//! use asksin::config::EngineConfig;
//! use asksin::engine::ProtocolEngine;
//!
//! let mut engine = ProtocolEngine::new(
//!     radio,
//!     power,
//!     eeprom,
//!     &[Channel::switch(4)],
//!     IDENTITY,
//!     EngineConfig::default(),
//! )?;
//! loop {
//!     engine.poll(clock.now_ms()); // Call at ~1 ms intervals
//!     if engine.prepare_sleep() {
//!         sleep();
//!     }
//! }
//! ```
//!
//! Or, use `run_poll_loop()` with a `DelayNs` implementation:
//!
//! ```rust,ignore
//! asksin::timer::run_poll_loop(&mut engine, &mut delay, 1);
//! ```
//!
//! ## Integration Notes
//!
//! - Every timeout is a deadline checked on the next poll; nothing blocks
//! - Only one frame is ever awaiting acknowledgment, so a new message
//!   supersedes the active one
//! - Only one engine instance should be active at a time in interrupt-driven mode
//!
//! --
//! Designed for `#![no_std]` use in resource-constrained embedded environments.

#![deny(
    bad_style,
    dead_code,
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    unconditional_recursion,
    unused,
    while_true,
    missing_debug_implementations,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
    unused_results
)]
#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "timer-isr")]
pub use critical_section;

pub use heapless;

#[macro_use]
mod fmt;

pub mod channel;
pub mod codec;
pub mod config;
pub mod consts;
pub(crate) mod crc;
pub mod engine;
pub mod error;
pub mod hal;
pub mod message;
pub mod peer;
pub mod scheduler;
pub mod slice;
pub mod store;
pub mod timer;

#[cfg(test)]
mod testing;
