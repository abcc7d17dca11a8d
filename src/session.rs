//! Session coordination
//!
//! Every business operation either joins a caller's session or decides
//! whether to open its own. An engine-opened session is held by an
//! [`OwnedSession`] guard and ended exactly once when the guard drops, on
//! every exit path.

use std::future::Future;
use std::sync::Arc;

use tracing::debug;

use crate::config::TransactionConfig;
use crate::error::EngineResult;
use crate::store::{ClientSession, DocumentStore};

/// A session opened by the engine. Dropping it ends the session.
pub struct OwnedSession {
    store: Arc<dyn DocumentStore>,
    session: ClientSession,
    config: TransactionConfig,
}

impl OwnedSession {
    fn start(store: Arc<dyn DocumentStore>, config: TransactionConfig) -> EngineResult<Self> {
        let session = store.start_session()?;
        debug!(target: "aerodoc::session", session = %session, "Started session");
        Ok(Self {
            store,
            session,
            config,
        })
    }

    pub fn session(&self) -> &ClientSession {
        &self.session
    }
}

impl Drop for OwnedSession {
    fn drop(&mut self) {
        self.store.end_session(&self.session);
        debug!(target: "aerodoc::session", session = %self.session, "Ended session");
    }
}

/// The session an operation runs under
pub enum SessionScope<'a> {
    /// Opened here; committed, retried and ended here
    Owned(OwnedSession),
    /// Supplied by the caller; never ended here
    Borrowed(&'a ClientSession),
    None,
}

impl<'a> SessionScope<'a> {
    pub fn session(&self) -> Option<&ClientSession> {
        match self {
            SessionScope::Owned(owned) => Some(owned.session()),
            SessionScope::Borrowed(session) => Some(*session),
            SessionScope::None => None,
        }
    }

    pub fn is_owned(&self) -> bool {
        matches!(self, SessionScope::Owned(_))
    }

    /// Runs `callback` under this scope.
    ///
    /// An owned session wraps the callback in a transaction. Transient
    /// transaction errors from the callback or the commit retry the whole
    /// callback, up to the configured number of attempts; every failed
    /// attempt is aborted. Borrowed and empty scopes call the callback once.
    pub async fn run<T, F, Fut>(&self, mut callback: F) -> EngineResult<T>
    where
        F: FnMut(Option<ClientSession>) -> Fut,
        Fut: Future<Output = EngineResult<T>>,
    {
        let owned = match self {
            SessionScope::Owned(owned) => owned,
            SessionScope::Borrowed(session) => return callback(Some(**session)).await,
            SessionScope::None => return callback(None).await,
        };

        let store = &owned.store;
        let session = owned.session;
        let options = owned.config.options();
        let attempts = owned.config.max_commit_attempts.max(1);
        let mut attempt = 1;

        loop {
            store.start_transaction(&session, &options)?;
            let outcome = match callback(Some(session)).await {
                Ok(value) => store
                    .commit_transaction(&session)
                    .await
                    .map(|()| value)
                    .map_err(Into::into),
                Err(e) => Err(e),
            };

            let error = match outcome {
                Ok(value) => {
                    debug!(target: "aerodoc::session", session = %session, attempt, "Committed transaction");
                    return Ok(value);
                }
                Err(error) => error,
            };

            if let Err(abort_error) = store.abort_transaction(&session).await {
                debug!(target: "aerodoc::session", session = %session, error = %abort_error, "Nothing to abort");
            }

            if error.is_transient() && attempt < attempts {
                debug!(target: "aerodoc::session", session = %session, attempt, error = %error, "Retrying transaction");
                attempt += 1;
                continue;
            }
            debug!(target: "aerodoc::session", session = %session, attempt, error = %error, "Transaction failed");
            return Err(error);
        }
    }
}

/// Decides session ownership for business operations.
#[derive(Clone)]
pub struct SessionCoordinator {
    store: Arc<dyn DocumentStore>,
    config: TransactionConfig,
}

impl SessionCoordinator {
    pub fn new(store: Arc<dyn DocumentStore>, config: TransactionConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &TransactionConfig {
        &self.config
    }

    /// Joins `external` when given. Otherwise opens a session when `forced`
    /// unless the hook disabled sessions, or when not forced only if the hook
    /// enabled them.
    pub fn start<'a>(
        &self,
        external: Option<&'a ClientSession>,
        hook_enabled: Option<bool>,
        forced: bool,
    ) -> EngineResult<SessionScope<'a>> {
        if let Some(session) = external {
            return Ok(SessionScope::Borrowed(session));
        }
        let open = if forced {
            hook_enabled != Some(false)
        } else {
            hook_enabled == Some(true)
        };
        if open {
            Ok(SessionScope::Owned(OwnedSession::start(
                Arc::clone(&self.store),
                self.config,
            )?))
        } else {
            Ok(SessionScope::None)
        }
    }
}
