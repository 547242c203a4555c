//! Shared helpers for integration tests.

#![allow(dead_code)]

pub mod scripted_browser;
pub mod socket_guard;
