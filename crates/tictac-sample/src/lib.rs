//! # Tic-Tac-Toe Sample Library
//!
//! This library exposes the sample's modules for the binary and for integration testing.

pub mod bot_actor;
pub mod clients;
pub mod lifecycle;
pub mod model;
