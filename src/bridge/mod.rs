//! Bridge module - Host <-> game iframe messaging
//!
//! This module provides:
//! - Wire message types with validating constructors (`message`)
//! - The bootstrap script that runs inside the game document (`bootstrap`)
//! - Frame identity and the host window's message stream (`frame`)
//! - The per-iframe host dispatcher and its lifecycle (`host`)
//!
//! The bridge module does NOT:
//! - Build or validate documents (that's the sandbox wrapper's job)
//! - Grant the game any capability besides posting messages to its parent

pub mod bootstrap;
pub mod frame;
pub mod host;
pub mod message;

// Re-exports for convenience
pub use frame::{ContentWindow, FrameId, MessageEvent, MessageHub, SandboxFrame};
pub use host::{
    FrameStatus, GameEvents, GameHost, GameRuntimeError, NoopEvents, StateRequestOutcome,
};
pub use message::{GameToHost, HostToGame, MessageError};
