//! CLI bootstrap - build the hub stack for one command.
//!
//! `CliContext` owns the same components a desktop front end would hold:
//! settings, the wired [`HubState`], and the receiving end of the event
//! channel.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::auth::{CachedTokenLookup, Credential, CredentialProvider, ExplicitToken};
use crate::error::HubError;
use crate::events::{ChannelSink, HubEvent};
use crate::logging;
use crate::settings::SettingsManager;
use crate::state::HubState;

use super::args::Args;

/// How long shutdown waits for queued progress lines to be printed.
const EVENT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Everything a command needs.
pub struct CliContext {
    pub state: HubState,

    /// Settings manager, also the session store
    pub settings_manager: Arc<SettingsManager>,

    /// Progress events for the output handler, taken once
    pub event_rx: Option<mpsc::UnboundedReceiver<HubEvent>>,

    /// The task rendering `event_rx`, once started
    pub event_task: Option<JoinHandle<()>>,

    /// Command-line arguments
    pub args: Args,
}

impl CliContext {
    /// Persist the local state index back to settings, then wait for the
    /// output handler to print every event still queued.
    pub async fn shutdown(self) -> Result<()> {
        let saved = self
            .settings_manager
            .save_session(&self.state.local)
            .await
            .context("Failed to save session state");

        let CliContext {
            state, event_task, ..
        } = self;
        // The event senders live in the hub stack; dropping it ends the loop.
        drop(state);
        if let Some(task) = event_task {
            match tokio::time::timeout(EVENT_DRAIN_TIMEOUT, task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!("Output handler stopped abnormally: {}", e),
                Err(_) => tracing::warn!("Timed out flushing progress output"),
            }
        }
        saved
    }
}

/// Initialize the CLI context.
///
/// Loads settings, restores the session, and logs in with a stored or
/// cached token when one is available.
pub async fn initialize(args: &Args) -> Result<CliContext> {
    logging::init(args.verbose);

    let settings_manager = Arc::new(
        SettingsManager::new()
            .await
            .context("Failed to initialize settings manager")?,
    );

    // Ensure settings file exists (creates template on first run)
    if let Err(e) = settings_manager.ensure_settings_file().await {
        tracing::warn!("Failed to create settings template: {}", e);
    }

    let mut settings = settings_manager.resolved().await;
    if let Some(endpoint) = &args.endpoint {
        settings.hub.endpoint = endpoint.clone();
    }

    if args.verbose {
        eprintln!(
            "[cli] Settings loaded from {}",
            settings_manager.path().display()
        );
        eprintln!("[cli] Endpoint: {}", settings.hub.endpoint);
    }

    let (sink, event_rx) = ChannelSink::channel();
    let state = HubState::new(&settings, Arc::new(sink)).context("Failed to build hub client")?;
    settings_manager.restore_session(&state.local).await;

    if !args.command.handles_login() && !args.command.is_offline() {
        auto_login(&state, settings.hub.token.clone(), &CachedTokenLookup::new()).await;
    }

    Ok(CliContext {
        state,
        settings_manager,
        event_rx: Some(event_rx),
        event_task: None,
        args: args.clone(),
    })
}

/// Log in with the token from settings, or from `fallback` when settings
/// hold none. Failure leaves the session anonymous.
pub(crate) async fn auto_login(
    state: &HubState,
    stored: Option<String>,
    fallback: &dyn CredentialProvider,
) -> Option<Credential> {
    let stored = stored.filter(|token| !token.trim().is_empty());
    let explicit;
    let provider: &dyn CredentialProvider = match stored {
        Some(token) => {
            explicit = ExplicitToken::new(token);
            &explicit
        }
        None => fallback,
    };

    match state.auth.login(provider).await {
        Ok(credential) => {
            tracing::debug!(
                "Using {} token for {}",
                provider.name(),
                credential.username()
            );
            Some(credential)
        }
        Err(HubError::Validation(reason)) => {
            tracing::debug!("Continuing anonymously: {}", reason);
            None
        }
        Err(e) => {
            // Anonymous access still works for public repositories.
            tracing::warn!("The {} token was not accepted: {}", provider.name(), e);
            None
        }
    }
}
