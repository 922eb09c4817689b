//! Process-wide source of truth for the active identity.
//!
//! Injected into remote-store implementations rather than read from ambient
//! module state; stores observe it fresh per operation through
//! [`crate::remote::RemoteStore::current_user`], so a session change is never
//! masked by a cached identity.

use tokio::sync::watch;

use crate::remote::UserIdentity;

#[derive(Debug)]
pub struct SessionContext {
    tx: watch::Sender<Option<UserIdentity>>,
}

impl SessionContext {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    pub fn sign_in(&self, identity: UserIdentity) {
        self.tx.send_replace(Some(identity));
    }

    pub fn sign_out(&self) {
        self.tx.send_replace(None);
    }

    pub fn current(&self) -> Option<UserIdentity> {
        self.tx.borrow().clone()
    }

    /// Components that need to react to sign-in/out subscribe here.
    pub fn subscribe(&self) -> watch::Receiver<Option<UserIdentity>> {
        self.tx.subscribe()
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}
