//! Channel layer: prompt detection, login and command execution.
//!
//! This module turns a raw line transport into an authenticated,
//! serialized command channel.

mod buffer;
mod command;
mod login;
mod patterns;

pub use buffer::PatternBuffer;
pub use command::CommandChannel;
pub use login::{
    AuthState, AuthenticatedSession, Authenticator, LOGIN_PROMPTS, PASSWORD_PROMPTS,
    REJECTION_MARKERS,
};
pub use patterns::{LineTerminator, MarkerSet, PromptMatcher};
