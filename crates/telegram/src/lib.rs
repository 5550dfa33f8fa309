//! Telegram Integration - long-polling bot interface
//!
//! This crate provides the Telegram interface for drillbot:
//! - **Updates** (`updates`) - Wire types for incoming updates and their classification
//! - **Dispatch** (`dispatch`) - Routes classified actions to registered handlers
//! - **Poller** (`poller`) - `getUpdates` long-poll loop with reconnection logic
//! - **Bot API** (`api`) - Outbound calls (messages, edits, typing, callbacks)
//! - **Keyboards** (`keyboards`) - Inline keyboard payloads and callback-data codec
//!
//! # Getting Started
//!
//! 1. Create a bot with @BotFather and copy its token
//! 2. Set env vars: `DRILLBOT_TELEGRAM_BOT_TOKEN`
//! 3. Wire handlers into an `UpdateDispatcher` and hand it to a `PollRunner`
//!
//! # Architecture
//!
//! ```text
//! getUpdates → classify → UpdateDispatcher → Handlers → Chat Engine
//!                              ↓
//!                       OutgoingMessage → Bot API
//! ```
//!
//! # Key Types
//!
//! - `PollRunner` - Long-poll event loop with reconnection logic
//! - `UpdateDispatcher` - Routes actions to appropriate handlers
//! - `BotApi` - Trait over the outbound Bot API surface
//! - `CallbackData` - Typed codec for inline button payloads

pub mod api;
pub mod dispatch;
pub mod keyboards;
pub mod poller;
pub mod updates;
