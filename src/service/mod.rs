//! Domain services on top of a [`Store`].
//!
//! Every service returns `Ok(None)` for an unknown entity and reserves `Err`
//! for failed preconditions, missing capabilities, refused transitions and
//! store failures.

pub mod access;
pub mod governance;
pub mod projects;
pub mod versioning;

use std::sync::Arc;

use crate::store::Store;

pub use access::AccessControl;
pub use governance::{Approval, Governance, Review};
pub use projects::Projects;
pub use versioning::{FileDiff, VersionControl};

/// The service set shared by the HTTP handlers and the relay.
pub struct Services {
    pub access: AccessControl,
    pub governance: Governance,
    pub projects: Projects,
    pub versioning: VersionControl,
}

impl Services {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            access: AccessControl::new(store.clone()),
            governance: Governance::new(store.clone()),
            projects: Projects::new(store.clone()),
            versioning: VersionControl::new(store),
        }
    }
}
