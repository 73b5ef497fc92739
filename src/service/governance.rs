//! Two-tier write policy.
//!
//! The project admin writes files directly. Every other member submits a
//! [`ChangeRequest`] that only becomes file content once the admin approves
//! it.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use super::access::{has_access, is_admin};
use crate::diff::{Diff, diff};
use crate::error::{Error, Result};
use crate::store::{Store, StoreExt};
use crate::types::{ChangeRequest, File, Project, ReviewStatus};

#[derive(Debug, Clone, Serialize)]
pub struct Approval {
    pub request: ChangeRequest,
    /// The file as it stands after approval. `None` when a request approved
    /// earlier points at a file that has since been deleted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<File>,
}

/// A change request together with the diff shown to the reviewer.
#[derive(Debug, Clone, Serialize)]
pub struct Review {
    #[serde(flatten)]
    pub request: ChangeRequest,
    pub diff: Diff,
}

pub struct Governance {
    store: Arc<dyn Store>,
    // Reviews and direct writes touch the same file records.
    lock: Mutex<()>,
}

impl Governance {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
        }
    }

    /// Stages an edit for admin review.
    pub fn propose(
        &self,
        project_id: &str,
        file_id: &str,
        old_content: &str,
        new_content: &str,
        user_id: &str,
        message: &str,
    ) -> Result<Option<ChangeRequest>> {
        if old_content == new_content {
            return Err(Error::BadRequest("No changes to submit".to_string()));
        }
        if message.trim().is_empty() {
            return Err(Error::BadRequest(
                "A message explaining the change is required".to_string(),
            ));
        }

        let Some(project) = self.store.get::<Project>(project_id)? else {
            return Ok(None);
        };
        let Some(file) = self.store.get::<File>(file_id)? else {
            return Ok(None);
        };
        if file.project_id != project.id {
            return Ok(None);
        }
        if !has_access(self.store.as_ref(), &project, user_id)? {
            return Err(Error::Forbidden);
        }

        let request = ChangeRequest {
            id: Uuid::new_v4().to_string(),
            project_id: project.id,
            file_id: file.id,
            user_id: user_id.to_string(),
            old_content: old_content.to_string(),
            new_content: new_content.to_string(),
            message: message.trim().to_string(),
            status: ReviewStatus::Pending,
            created_at: Utc::now(),
            reviewed_at: None,
            reviewed_by: None,
        };
        self.store.put(&request)?;

        tracing::info!(
            "Change request {} proposed by {} for file {}",
            request.id,
            user_id,
            request.file_id
        );
        Ok(Some(request))
    }

    /// Approves a pending request and writes its new content onto the file.
    ///
    /// Approving an already-approved request returns it without writing again.
    /// The live file is not compared against `old_content`; a stale base is
    /// logged and then overwritten.
    pub fn approve(&self, request_id: &str, admin_id: &str) -> Result<Option<Approval>> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());

        let Some((mut request, _project)) = self.load_for_review(request_id, admin_id)? else {
            return Ok(None);
        };

        match request.status {
            ReviewStatus::Pending => {}
            ReviewStatus::Approved => {
                let file = self.store.get::<File>(&request.file_id)?;
                return Ok(Some(Approval { request, file }));
            }
            ReviewStatus::Rejected => {
                return Err(Error::InvalidTransition {
                    entity: "change request",
                    from: ReviewStatus::Rejected.as_str(),
                    to: ReviewStatus::Approved.as_str(),
                });
            }
        }

        let Some(mut file) = self.store.get::<File>(&request.file_id)? else {
            return Err(Error::Conflict("File no longer exists".to_string()));
        };

        if file.content != request.old_content {
            tracing::warn!(
                "Change request {} was based on stale content of file {}; overwriting",
                request.id,
                file.id
            );
        }

        let now = Utc::now();
        file.content = request.new_content.clone();
        file.updated_at = now;
        self.store.put(&file)?;

        request.status = ReviewStatus::Approved;
        request.reviewed_at = Some(now);
        request.reviewed_by = Some(admin_id.to_string());
        self.store.put(&request)?;

        tracing::info!("Change request {} approved by {}", request.id, admin_id);
        Ok(Some(Approval {
            request,
            file: Some(file),
        }))
    }

    /// Rejects a pending request. The file is never touched.
    pub fn reject(&self, request_id: &str, admin_id: &str) -> Result<Option<ChangeRequest>> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());

        let Some((mut request, _project)) = self.load_for_review(request_id, admin_id)? else {
            return Ok(None);
        };

        match request.status {
            ReviewStatus::Pending => {}
            ReviewStatus::Rejected => return Ok(Some(request)),
            ReviewStatus::Approved => {
                return Err(Error::InvalidTransition {
                    entity: "change request",
                    from: ReviewStatus::Approved.as_str(),
                    to: ReviewStatus::Rejected.as_str(),
                });
            }
        }

        request.status = ReviewStatus::Rejected;
        request.reviewed_at = Some(Utc::now());
        request.reviewed_by = Some(admin_id.to_string());
        self.store.put(&request)?;

        tracing::info!("Change request {} rejected by {}", request.id, admin_id);
        Ok(Some(request))
    }

    /// Pending requests in submission order.
    pub fn list_pending(&self, project_id: &str) -> Result<Vec<ChangeRequest>> {
        self.list(project_id, Some(ReviewStatus::Pending))
    }

    pub fn list(&self, project_id: &str, status: Option<ReviewStatus>) -> Result<Vec<ChangeRequest>> {
        Ok(self
            .store
            .list::<ChangeRequest>(project_id)?
            .into_iter()
            .filter(|r| status.is_none_or(|s| r.status == s))
            .collect())
    }

    pub fn review(&self, request_id: &str) -> Result<Option<Review>> {
        Ok(self.store.get::<ChangeRequest>(request_id)?.map(|request| {
            let diff = diff(&request.old_content, &request.new_content);
            Review { request, diff }
        }))
    }

    /// Direct admin edit. Last write wins.
    pub fn write_file(&self, file_id: &str, content: &str, admin_id: &str) -> Result<Option<File>> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());

        let Some(mut file) = self.store.get::<File>(file_id)? else {
            return Ok(None);
        };
        if self.require_admin(&file.project_id, admin_id)?.is_none() {
            return Ok(None);
        }

        file.content = content.to_string();
        file.updated_at = Utc::now();
        self.store.put(&file)?;
        Ok(Some(file))
    }

    pub fn create_file(
        &self,
        project_id: &str,
        file_name: &str,
        content: &str,
        admin_id: &str,
    ) -> Result<Option<File>> {
        let file_name = validate_file_name(file_name)?;
        if self.require_admin(project_id, admin_id)?.is_none() {
            return Ok(None);
        }

        let now = Utc::now();
        let file = File {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            file_name: file_name.to_string(),
            content: content.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.store.put(&file)?;

        tracing::info!("Created file {} '{}' in project {}", file.id, file.file_name, project_id);
        Ok(Some(file))
    }

    pub fn rename_file(&self, file_id: &str, file_name: &str, admin_id: &str) -> Result<Option<File>> {
        let file_name = validate_file_name(file_name)?;
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());

        let Some(mut file) = self.store.get::<File>(file_id)? else {
            return Ok(None);
        };
        if self.require_admin(&file.project_id, admin_id)?.is_none() {
            return Ok(None);
        }

        file.file_name = file_name.to_string();
        file.updated_at = Utc::now();
        self.store.put(&file)?;
        Ok(Some(file))
    }

    /// Removes a file. The last file of a project cannot be deleted.
    pub fn delete_file(&self, file_id: &str, admin_id: &str) -> Result<Option<File>> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());

        let Some(file) = self.store.get::<File>(file_id)? else {
            return Ok(None);
        };
        if self.require_admin(&file.project_id, admin_id)?.is_none() {
            return Ok(None);
        }
        if self.store.list::<File>(&file.project_id)?.len() <= 1 {
            return Err(Error::Conflict("Cannot delete the last file".to_string()));
        }

        self.store.remove::<File>(&file.id)?;
        tracing::info!("Deleted file {} from project {}", file.id, file.project_id);
        Ok(Some(file))
    }

    fn load_for_review(
        &self,
        request_id: &str,
        admin_id: &str,
    ) -> Result<Option<(ChangeRequest, Project)>> {
        let Some(request) = self.store.get::<ChangeRequest>(request_id)? else {
            return Ok(None);
        };
        Ok(self
            .require_admin(&request.project_id, admin_id)?
            .map(|project| (request, project)))
    }

    /// `None` for an unknown project, `Forbidden` for anyone but the admin.
    fn require_admin(&self, project_id: &str, user_id: &str) -> Result<Option<Project>> {
        let Some(project) = self.store.get::<Project>(project_id)? else {
            return Ok(None);
        };
        if !is_admin(&project, user_id) {
            return Err(Error::Forbidden);
        }
        Ok(Some(project))
    }
}

fn validate_file_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::BadRequest("File name cannot be empty".to_string()));
    }
    if name.contains(['\0', '\n', '\r']) {
        return Err(Error::BadRequest("File name contains invalid characters".to_string()));
    }
    Ok(name)
}
