mod memory;
mod schema;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};
use crate::types::*;

/// Named collections, one per entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Users,
    Projects,
    Files,
    ProjectAccess,
    Messages,
    ChangeRequests,
    Branches,
    Commits,
    PullRequests,
}

impl Collection {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Projects => "projects",
            Self::Files => "files",
            Self::ProjectAccess => "project_access",
            Self::Messages => "messages",
            Self::ChangeRequests => "change_requests",
            Self::Branches => "branches",
            Self::Commits => "commits",
            Self::PullRequests => "pull_requests",
        }
    }
}

/// Store defines the persistence interface: keyed JSON records grouped by
/// collection and optionally scoped to a project.
///
/// `list_records` and `put_record` preserve insertion order; an upsert of an
/// existing id keeps its original position.
pub trait Store: Send + Sync {
    fn initialize(&self) -> Result<()>;

    fn get_record(&self, collection: Collection, id: &str) -> Result<Option<String>>;
    fn list_records(&self, collection: Collection, project_id: Option<&str>) -> Result<Vec<String>>;
    fn put_record(
        &self,
        collection: Collection,
        id: &str,
        project_id: Option<&str>,
        body: &str,
    ) -> Result<()>;
    fn remove_record(&self, collection: Collection, id: &str) -> Result<bool>;

    fn close(&self) -> Result<()>;
}

/// An entity that can live in a [`Store`].
pub trait Record: Serialize + DeserializeOwned {
    const COLLECTION: Collection;

    fn id(&self) -> &str;

    /// Owning project, used for project-scoped listing.
    fn project_id(&self) -> Option<&str>;
}

/// Typed access on top of any [`Store`], including `dyn Store`.
pub trait StoreExt: Store {
    fn get<T: Record>(&self, id: &str) -> Result<Option<T>> {
        self.get_record(T::COLLECTION, id)?
            .map(|body| serde_json::from_str(&body))
            .transpose()
            .map_err(Error::from)
    }

    fn list<T: Record>(&self, project_id: &str) -> Result<Vec<T>> {
        decode_all(self.list_records(T::COLLECTION, Some(project_id))?)
    }

    fn list_all<T: Record>(&self) -> Result<Vec<T>> {
        decode_all(self.list_records(T::COLLECTION, None)?)
    }

    fn put<T: Record>(&self, record: &T) -> Result<()> {
        let body = serde_json::to_string(record)?;
        self.put_record(T::COLLECTION, record.id(), record.project_id(), &body)
    }

    fn remove<T: Record>(&self, id: &str) -> Result<bool> {
        self.remove_record(T::COLLECTION, id)
    }
}

impl<S: Store + ?Sized> StoreExt for S {}

fn decode_all<T: Record>(bodies: Vec<String>) -> Result<Vec<T>> {
    bodies
        .iter()
        .map(|body| serde_json::from_str(body).map_err(Error::from))
        .collect()
}

impl Record for User {
    const COLLECTION: Collection = Collection::Users;

    fn id(&self) -> &str {
        &self.id
    }

    fn project_id(&self) -> Option<&str> {
        None
    }
}

impl Record for Project {
    const COLLECTION: Collection = Collection::Projects;

    fn id(&self) -> &str {
        &self.id
    }

    fn project_id(&self) -> Option<&str> {
        Some(&self.id)
    }
}

impl Record for File {
    const COLLECTION: Collection = Collection::Files;

    fn id(&self) -> &str {
        &self.id
    }

    fn project_id(&self) -> Option<&str> {
        Some(&self.project_id)
    }
}

impl Record for ProjectAccess {
    const COLLECTION: Collection = Collection::ProjectAccess;

    fn id(&self) -> &str {
        &self.id
    }

    fn project_id(&self) -> Option<&str> {
        Some(&self.project_id)
    }
}

impl Record for Message {
    const COLLECTION: Collection = Collection::Messages;

    fn id(&self) -> &str {
        &self.id
    }

    fn project_id(&self) -> Option<&str> {
        Some(&self.project_id)
    }
}

impl Record for ChangeRequest {
    const COLLECTION: Collection = Collection::ChangeRequests;

    fn id(&self) -> &str {
        &self.id
    }

    fn project_id(&self) -> Option<&str> {
        Some(&self.project_id)
    }
}

impl Record for Branch {
    const COLLECTION: Collection = Collection::Branches;

    fn id(&self) -> &str {
        &self.id
    }

    fn project_id(&self) -> Option<&str> {
        Some(&self.project_id)
    }
}

impl Record for Commit {
    const COLLECTION: Collection = Collection::Commits;

    fn id(&self) -> &str {
        &self.id
    }

    fn project_id(&self) -> Option<&str> {
        Some(&self.project_id)
    }
}

impl Record for PullRequest {
    const COLLECTION: Collection = Collection::PullRequests;

    fn id(&self) -> &str {
        &self.id
    }

    fn project_id(&self) -> Option<&str> {
        Some(&self.project_id)
    }
}
