//! CLI module for hubdesk headless operation.
//!
//! A stand-in for the desktop UI: it builds the same [`HubState`] a front end
//! would, renders progress events from the channel, and persists the local
//! state index between runs.
//!
//! ```text
//! +-----------------+     +-------------+     +---------------+
//! | HubState        | --> | ChannelSink | --> | output.rs     |
//! | (shared logic)  |     | (emit())    |     | (stderr/JSON) |
//! +-----------------+     +-------------+     +---------------+
//! ```
//!
//! [`HubState`]: crate::state::HubState

mod args;
mod bootstrap;
mod output;
mod runner;

pub use args::{Args, Command};
pub use bootstrap::{initialize, CliContext};
pub use output::run_event_loop;
pub use runner::execute;
