//! Hub synchronization and commit orchestration core.
//!
//! Mediates between locally cached state (repo lists, file trees, branch
//! refs, collections) and a remote repository-hosting service. Every network
//! call goes through one [`transport::Transport`] stack:
//!
//! ```text
//! +------------------------+     +----------------+     +---------------+
//! | AuthenticatedTransport | --> | RetryTransport | --> | HttpTransport |
//! | (bearer per call)      |     | (5xx/network)  |     | (reqwest)     |
//! +------------------------+     +----------------+     +---------------+
//! ```
//!
//! [`HubState`] wires the components together for one session.

pub mod auth;
pub mod branches;
pub mod collections;
pub mod commit;
pub mod error;
pub mod events;
pub mod file_tree;
pub mod hub;
pub mod local_state;
pub mod logging;
pub mod registry;
pub mod settings;
pub mod state;
pub mod transport;

#[cfg(feature = "cli")]
pub mod cli;


pub use error::{ErrorCategory, HubError, Result};
pub use events::{ChannelSink, EventSink, HubEvent, NullSink};
pub use state::HubState;
