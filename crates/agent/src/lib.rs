//! Chat Engine - admission arbitration and completion orchestration
//!
//! This crate provides the "brain" of the drillbot system - the engine that:
//! - Arbitrates every chat request (rate guard, entitlements, daily quota)
//! - Manages per-user conversation context with a pinned persona
//! - Calls the OpenAI-compatible completion backend
//! - Commits history and quota only after a reply actually landed
//!
//! # Architecture
//!
//! Every request runs the same constrained sequence, serialized per user:
//! 1. **Rate Guard** - sliding-window spam check, before any durable write
//! 2. **Arbitration** (`drillbot_core::decide`) - privileged/entitled bypass,
//!    then the tier meter
//! 3. **Completion** (`completion`) - assembled context window → backend
//! 4. **Commit** (`context`) - append the exchange, record metered usage
//!
//! # Key Types
//!
//! - `ChatEngine` - Main orchestrator (see `engine` module)
//! - `CompletionClient` - Pluggable trait over the completion backend
//! - `ContextService` - Per-user dialogue windows, optionally persisted
//!
//! # Ordering Principle
//!
//! The backend reply is strictly the last step that can fail. Nothing is
//! written - no history, no quota - until the reply text is in hand, so a
//! failed or truncated completion never costs the user anything.

pub mod completion;
pub mod context;
pub mod engine;
pub mod gates;
