//! Session and identity layer.
//!
//! One explicit [`SessionManager`] owns the authenticated-user state and
//! publishes changes over a watch channel; components that need identity
//! receive the manager (or a receiver) instead of reading a global. The
//! subscription layer re-scopes its live queries off the same channel.

pub mod cognito;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::DataError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub user_id: String,
    pub email: String,
}

/// Session lifecycle: `Initializing` until the provider has answered once,
/// then `Ready` with or without a signed-in user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Initializing,
    Ready(Option<SessionUser>),
}

impl SessionState {
    pub fn user(&self) -> Option<&SessionUser> {
        match self {
            SessionState::Ready(Some(user)) => Some(user),
            _ => None,
        }
    }
}

#[async_trait::async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<SessionUser, DataError>;

    async fn sign_up(&self, email: &str, password: &str) -> Result<SessionUser, DataError>;

    /// Federated single-sign-on: exchange a token issued by the external
    /// identity broker for a session user.
    async fn sign_in_with_token(&self, access_token: &str) -> Result<SessionUser, DataError>;

    async fn sign_out(&self) -> Result<(), DataError>;
}

/// Resolves a user id to a contact address. Used by the folder provisioner;
/// resolution failure is non-fatal there.
#[async_trait::async_trait]
pub trait ContactDirectory: Send + Sync {
    async fn email_for(&self, user_id: &str) -> Result<Option<String>, DataError>;
}

pub struct SessionManager {
    provider: Arc<dyn IdentityProvider>,
    state: watch::Sender<SessionState>,
}

impl SessionManager {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        let (state, _) = watch::channel(SessionState::Initializing);
        SessionManager { provider, state }
    }

    /// Session-change notifications. The current state is immediately
    /// visible on the receiver.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn current_user(&self) -> Option<SessionUser> {
        self.state.borrow().user().cloned()
    }

    /// Settle the initial state, e.g. from a persisted session (or none).
    pub fn restore(&self, user: Option<SessionUser>) {
        self.state.send_replace(SessionState::Ready(user));
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<SessionUser, DataError> {
        let user = self.provider.sign_in(email, password).await?;
        self.state.send_replace(SessionState::Ready(Some(user.clone())));
        Ok(user)
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> Result<SessionUser, DataError> {
        let user = self.provider.sign_up(email, password).await?;
        self.state.send_replace(SessionState::Ready(Some(user.clone())));
        Ok(user)
    }

    pub async fn sign_in_with_token(&self, access_token: &str) -> Result<SessionUser, DataError> {
        let user = self.provider.sign_in_with_token(access_token).await?;
        self.state.send_replace(SessionState::Ready(Some(user.clone())));
        Ok(user)
    }

    /// Sign out and publish the signed-out state even if the provider call
    /// fails; the local session is gone either way.
    pub async fn sign_out(&self) -> Result<(), DataError> {
        let result = self.provider.sign_out().await;
        self.state.send_replace(SessionState::Ready(None));
        result
    }
}
