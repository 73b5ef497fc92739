use std::sync::{Arc, Mutex};

use chrono::Utc;
use uuid::Uuid;

use super::access::has_access;
use crate::error::{Error, Result};
use crate::store::{Store, StoreExt};
use crate::types::{Branch, File, Message, Project, ProjectSnapshot, User};

pub const DEFAULT_BRANCH_NAME: &str = "main";
pub const DEFAULT_FILE_NAME: &str = "main.py";
pub const DEFAULT_FILE_CONTENT: &str = "print(\"Hello, CodeCollab!\")";

/// Users, projects, file reads and chat.
pub struct Projects {
    store: Arc<dyn Store>,
    // Keeps the email uniqueness check and insert together.
    user_lock: Mutex<()>,
}

impl Projects {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            user_lock: Mutex::new(()),
        }
    }

    /// Fails with `AlreadyExists` if the email is taken (case-insensitive).
    pub fn create_user(&self, name: &str, email: &str) -> Result<User> {
        let name = name.trim();
        let email = email.trim();
        if name.is_empty() {
            return Err(Error::BadRequest("User name cannot be empty".to_string()));
        }
        if !email.contains('@') {
            return Err(Error::BadRequest("Invalid email address".to_string()));
        }

        let _guard = self.user_lock.lock().unwrap_or_else(|e| e.into_inner());
        if self.user_by_email(email)?.is_some() {
            return Err(Error::AlreadyExists);
        }

        let user = User {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            email: email.to_string(),
            created_at: Utc::now(),
        };
        self.store.put(&user)?;

        tracing::info!("Created user {} ({})", user.id, user.email);
        Ok(user)
    }

    pub fn get_user(&self, id: &str) -> Result<Option<User>> {
        self.store.get(id)
    }

    pub fn user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self
            .store
            .list_all::<User>()?
            .into_iter()
            .find(|u| u.email.eq_ignore_ascii_case(email)))
    }

    /// Creates the project with its main branch and a starter file.
    /// The creator becomes the project's only admin.
    pub fn create_project(&self, owner_id: &str, name: &str) -> Result<Option<Project>> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::BadRequest("Project name cannot be empty".to_string()));
        }
        if self.store.get::<User>(owner_id)?.is_none() {
            return Ok(None);
        }

        let now = Utc::now();
        let project = Project {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            admin_id: owner_id.to_string(),
            name: name.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.store.put(&project)?;

        self.store.put(&Branch {
            id: Uuid::new_v4().to_string(),
            project_id: project.id.clone(),
            name: DEFAULT_BRANCH_NAME.to_string(),
            created_by: owner_id.to_string(),
            created_at: now,
            is_main: true,
            head_commit_id: None,
        })?;

        self.store.put(&File {
            id: Uuid::new_v4().to_string(),
            project_id: project.id.clone(),
            file_name: DEFAULT_FILE_NAME.to_string(),
            content: DEFAULT_FILE_CONTENT.to_string(),
            created_at: now,
            updated_at: now,
        })?;

        tracing::info!("Created project {} '{}' for {}", project.id, project.name, owner_id);
        Ok(Some(project))
    }

    pub fn get_project(&self, id: &str) -> Result<Option<Project>> {
        self.store.get(id)
    }

    pub fn list_files(&self, project_id: &str) -> Result<Vec<File>> {
        self.store.list(project_id)
    }

    pub fn get_file(&self, id: &str) -> Result<Option<File>> {
        self.store.get(id)
    }

    pub fn list_messages(&self, project_id: &str) -> Result<Vec<Message>> {
        self.store.list(project_id)
    }

    /// The {project, files, messages} tuple a relay room shares.
    pub fn snapshot(&self, project_id: &str) -> Result<Option<ProjectSnapshot>> {
        let Some(project) = self.get_project(project_id)? else {
            return Ok(None);
        };
        Ok(Some(ProjectSnapshot {
            files: self.list_files(project_id)?,
            messages: self.list_messages(project_id)?,
            project,
        }))
    }

    /// Appends a chat message. Any member with access may post.
    pub fn post_message(
        &self,
        project_id: &str,
        user_id: &str,
        content: &str,
    ) -> Result<Option<Message>> {
        if content.trim().is_empty() {
            return Err(Error::BadRequest("Message cannot be empty".to_string()));
        }
        let Some(project) = self.get_project(project_id)? else {
            return Ok(None);
        };
        let Some(user) = self.get_user(user_id)? else {
            return Ok(None);
        };
        if !has_access(self.store.as_ref(), &project, user_id)? {
            return Err(Error::Forbidden);
        }

        let message = Message {
            id: Uuid::new_v4().to_string(),
            project_id: project.id,
            user_id: user.id,
            user_name: Some(user.name),
            content: content.to_string(),
            timestamp: Utc::now(),
        };
        self.store.put(&message)?;
        Ok(Some(message))
    }
}
