use parking_lot::RwLock;

use crate::model::OwnerId;

/// Resolves the owner the current session acts as.
pub trait Identity: Send + Sync {
    fn current_owner_id(&self) -> Option<OwnerId>;
}

/// Identity fixed at construction; `None` models a signed-out session.
#[derive(Debug, Default)]
pub struct StaticIdentity {
    owner: RwLock<Option<OwnerId>>,
}

impl StaticIdentity {
    pub fn signed_in(owner: impl Into<OwnerId>) -> Self {
        Self {
            owner: RwLock::new(Some(owner.into())),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn switch_to(&self, owner: Option<OwnerId>) {
        *self.owner.write() = owner;
    }
}

impl Identity for StaticIdentity {
    fn current_owner_id(&self) -> Option<OwnerId> {
        self.owner.read().clone()
    }
}

impl<I: Identity + ?Sized> Identity for std::sync::Arc<I> {
    fn current_owner_id(&self) -> Option<OwnerId> {
        (**self).current_owner_id()
    }
}
