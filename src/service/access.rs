use std::sync::{Arc, Mutex};

use chrono::Utc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::store::{Store, StoreExt};
use crate::types::{AccessStatus, Project, ProjectAccess, ProjectMember, User};

/// Returns true if `user_id` is the project's admin.
/// This is the only place the admin capability is decided.
#[must_use]
pub fn is_admin(project: &Project, user_id: &str) -> bool {
    project.admin_id == user_id
}

/// Returns true if the user is the admin or holds an approved access row.
pub fn has_access(store: &dyn Store, project: &Project, user_id: &str) -> Result<bool> {
    if is_admin(project, user_id) {
        return Ok(true);
    }

    let rows = store.list::<ProjectAccess>(&project.id)?;
    Ok(rows
        .iter()
        .any(|a| a.user_id == user_id && a.status == AccessStatus::Approved))
}

/// Join requests and approved membership per project.
pub struct AccessControl {
    store: Arc<dyn Store>,
    // Serializes request/review so a pair never gets two active rows.
    lock: Mutex<()>,
}

impl AccessControl {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
        }
    }

    /// Creates a pending request, or returns the pair's active row.
    ///
    /// If every earlier row was rejected a fresh pending row is appended;
    /// the rejected rows stay as history.
    pub fn request_access(&self, project_id: &str, user_id: &str) -> Result<Option<ProjectAccess>> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());

        let Some(project) = self.store.get::<Project>(project_id)? else {
            return Ok(None);
        };
        if self.store.get::<User>(user_id)?.is_none() {
            return Ok(None);
        }
        if is_admin(&project, user_id) {
            return Err(Error::BadRequest(
                "Project admin does not need to request access".to_string(),
            ));
        }

        if let Some(active) = self.active_row(project_id, user_id)? {
            return Ok(Some(active));
        }

        let access = ProjectAccess {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            user_id: user_id.to_string(),
            status: AccessStatus::Pending,
            requested_at: Utc::now(),
            approved_at: None,
            approved_by: None,
        };
        self.store.put(&access)?;

        tracing::info!("User {} requested access to project {}", user_id, project_id);
        Ok(Some(access))
    }

    pub fn approve(&self, access_id: &str, approver_id: &str) -> Result<Option<ProjectAccess>> {
        self.review(access_id, approver_id, AccessStatus::Approved)
    }

    pub fn reject(&self, access_id: &str, approver_id: &str) -> Result<Option<ProjectAccess>> {
        self.review(access_id, approver_id, AccessStatus::Rejected)
    }

    fn review(
        &self,
        access_id: &str,
        approver_id: &str,
        to: AccessStatus,
    ) -> Result<Option<ProjectAccess>> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());

        let Some(mut access) = self.store.get::<ProjectAccess>(access_id)? else {
            return Ok(None);
        };
        let Some(project) = self.store.get::<Project>(&access.project_id)? else {
            return Ok(None);
        };
        if !is_admin(&project, approver_id) {
            return Err(Error::Forbidden);
        }

        match access.status {
            AccessStatus::Pending => {}
            from if from == to => return Ok(Some(access)),
            from => {
                return Err(Error::InvalidTransition {
                    entity: "access request",
                    from: from.as_str(),
                    to: to.as_str(),
                });
            }
        }

        access.status = to;
        access.approved_by = Some(approver_id.to_string());
        if to == AccessStatus::Approved {
            access.approved_at = Some(Utc::now());
        }
        self.store.put(&access)?;

        tracing::info!(
            "Access request {} for user {} on project {} {}",
            access.id,
            access.user_id,
            access.project_id,
            to
        );
        Ok(Some(access))
    }

    /// False for unknown projects.
    pub fn has_access(&self, project_id: &str, user_id: &str) -> Result<bool> {
        match self.store.get::<Project>(project_id)? {
            Some(project) => has_access(self.store.as_ref(), &project, user_id),
            None => Ok(false),
        }
    }

    /// False for unknown projects.
    pub fn is_admin(&self, project_id: &str, user_id: &str) -> Result<bool> {
        Ok(self
            .store
            .get::<Project>(project_id)?
            .is_some_and(|p| is_admin(&p, user_id)))
    }

    /// Approved and pending members joined with their user record.
    /// The admin has no access row and is not listed.
    pub fn list_members(&self, project_id: &str) -> Result<Vec<ProjectMember>> {
        let mut members = Vec::new();
        for access in self.store.list::<ProjectAccess>(project_id)? {
            if access.status == AccessStatus::Rejected {
                continue;
            }
            let Some(user) = self.store.get::<User>(&access.user_id)? else {
                continue;
            };
            members.push(ProjectMember {
                user_id: user.id,
                user_name: user.name,
                email: user.email,
                status: access.status,
                joined_at: access.approved_at.unwrap_or(access.requested_at),
            });
        }
        Ok(members)
    }

    /// Access rows for a project, optionally filtered by status. Admin only.
    pub fn list_requests(
        &self,
        project_id: &str,
        status: Option<AccessStatus>,
        requester_id: &str,
    ) -> Result<Option<Vec<ProjectAccess>>> {
        let Some(project) = self.store.get::<Project>(project_id)? else {
            return Ok(None);
        };
        if !is_admin(&project, requester_id) {
            return Err(Error::Forbidden);
        }

        let rows = self.store.list::<ProjectAccess>(project_id)?;
        Ok(Some(
            rows.into_iter()
                .filter(|a| status.is_none_or(|s| a.status == s))
                .collect(),
        ))
    }

    /// The most recent row for the pair, rejected rows included.
    pub fn access_for(&self, project_id: &str, user_id: &str) -> Result<Option<ProjectAccess>> {
        Ok(self
            .store
            .list::<ProjectAccess>(project_id)?
            .into_iter()
            .rev()
            .find(|a| a.user_id == user_id))
    }

    /// Projects the user administers followed by projects they were approved into.
    pub fn accessible_projects(&self, user_id: &str) -> Result<Vec<Project>> {
        let mut projects = Vec::new();
        for project in self.store.list_all::<Project>()? {
            if has_access(self.store.as_ref(), &project, user_id)? {
                projects.push(project);
            }
        }
        projects.sort_by_key(|p| !is_admin(p, user_id));
        Ok(projects)
    }

    fn active_row(&self, project_id: &str, user_id: &str) -> Result<Option<ProjectAccess>> {
        Ok(self
            .store
            .list::<ProjectAccess>(project_id)?
            .into_iter()
            .find(|a| a.user_id == user_id && a.status != AccessStatus::Rejected))
    }
}
