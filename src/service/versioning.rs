use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use super::access::{has_access, is_admin};
use crate::diff::{Diff, diff};
use crate::error::{Error, Result};
use crate::store::{Store, StoreExt};
use crate::types::{
    Branch, Commit, CommitFile, FileAction, Project, PullRequest, PullRequestStatus,
};

/// Per-file diff of a commit, for the commit viewer.
#[derive(Debug, Clone, Serialize)]
pub struct FileDiff {
    pub file_id: String,
    pub file_name: String,
    pub action: FileAction,
    pub diff: Diff,
}

/// Branches, commits and pull requests. One linear history per branch.
pub struct VersionControl {
    store: Arc<dyn Store>,
    // Held across read-head / write-commit / move-head.
    commit_lock: Mutex<()>,
    pr_lock: Mutex<()>,
}

impl VersionControl {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            commit_lock: Mutex::new(()),
            pr_lock: Mutex::new(()),
        }
    }

    /// Creates a branch without a head commit.
    ///
    /// Nothing stops a second branch from claiming `is_main`; callers decide.
    pub fn create_branch(
        &self,
        project_id: &str,
        name: &str,
        creator_id: &str,
        is_main: bool,
    ) -> Result<Option<Branch>> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::BadRequest("Branch name cannot be empty".to_string()));
        }
        let Some(project) = self.require_member(project_id, creator_id)? else {
            return Ok(None);
        };

        let branch = Branch {
            id: Uuid::new_v4().to_string(),
            project_id: project.id,
            name: name.to_string(),
            created_by: creator_id.to_string(),
            created_at: Utc::now(),
            is_main,
            head_commit_id: None,
        };
        self.store.put(&branch)?;

        tracing::info!("Created branch {} '{}' in project {}", branch.id, branch.name, project_id);
        Ok(Some(branch))
    }

    pub fn get_branch(&self, id: &str) -> Result<Option<Branch>> {
        self.store.get(id)
    }

    pub fn list_branches(&self, project_id: &str) -> Result<Vec<Branch>> {
        self.store.list(project_id)
    }

    /// First branch flagged `is_main`, in creation order.
    pub fn main_branch(&self, project_id: &str) -> Result<Option<Branch>> {
        Ok(self.list_branches(project_id)?.into_iter().find(|b| b.is_main))
    }

    /// Records a commit on top of the branch head and advances the head.
    pub fn commit(
        &self,
        project_id: &str,
        branch_id: &str,
        user_id: &str,
        message: &str,
        files: Vec<CommitFile>,
    ) -> Result<Option<Commit>> {
        let message = message.trim();
        if message.is_empty() {
            return Err(Error::BadRequest("Commit message cannot be empty".to_string()));
        }
        if files.is_empty() {
            return Err(Error::BadRequest("Nothing to commit".to_string()));
        }
        if self.require_member(project_id, user_id)?.is_none() {
            return Ok(None);
        }

        let _guard = self.commit_lock.lock().unwrap_or_else(|e| e.into_inner());

        let Some(mut branch) = self.get_branch(branch_id)? else {
            return Ok(None);
        };
        if branch.project_id != project_id {
            return Ok(None);
        }

        let commit = Commit {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            branch_id: branch.id.clone(),
            user_id: user_id.to_string(),
            message: message.to_string(),
            files,
            created_at: Utc::now(),
            parent_commit_id: branch.head_commit_id.clone(),
        };
        self.store.put(&commit)?;

        branch.head_commit_id = Some(commit.id.clone());
        self.store.put(&branch)?;

        tracing::info!(
            "Commit {} on branch {} ({} file(s))",
            commit.id,
            branch.name,
            commit.files.len()
        );
        Ok(Some(commit))
    }

    /// Walks parent links from the branch head, newest first.
    ///
    /// Stops at a parent that is missing or lives on another branch, and at
    /// any commit already visited, so a corrupted chain still terminates.
    pub fn history(&self, branch_id: &str) -> Result<Vec<Commit>> {
        let Some(branch) = self.get_branch(branch_id)? else {
            return Ok(Vec::new());
        };
        let Some(head) = branch.head_commit_id.clone() else {
            return Ok(Vec::new());
        };

        let mut commits: HashMap<String, Commit> = self
            .store
            .list::<Commit>(&branch.project_id)?
            .into_iter()
            .filter(|c| c.branch_id == branch.id)
            .map(|c| (c.id.clone(), c))
            .collect();

        let mut history = Vec::new();
        let mut visited = HashSet::new();
        let mut current = Some(head);

        while let Some(id) = current {
            if !visited.insert(id.clone()) {
                tracing::warn!("Commit history of branch {} loops at {}", branch.id, id);
                break;
            }
            let Some(commit) = commits.remove(&id) else {
                break;
            };
            current = commit.parent_commit_id.clone();
            history.push(commit);
        }

        Ok(history)
    }

    pub fn get_commit(&self, id: &str) -> Result<Option<Commit>> {
        self.store.get(id)
    }

    #[must_use]
    pub fn commit_diffs(commit: &Commit) -> Vec<FileDiff> {
        commit
            .files
            .iter()
            .map(|f| FileDiff {
                file_id: f.file_id.clone(),
                file_name: f.file_name.clone(),
                action: f.action,
                diff: diff(&f.old_content, &f.new_content),
            })
            .collect()
    }

    /// Opens a pull request carrying the source branch's commit ids, newest first.
    pub fn open_pull_request(
        &self,
        project_id: &str,
        source_branch_id: &str,
        target_branch_id: &str,
        title: &str,
        description: &str,
        author_id: &str,
    ) -> Result<Option<PullRequest>> {
        let title = title.trim();
        if title.is_empty() {
            return Err(Error::BadRequest("Pull request title cannot be empty".to_string()));
        }
        if source_branch_id == target_branch_id {
            return Err(Error::BadRequest(
                "Source and target branch must differ".to_string(),
            ));
        }
        if self.require_member(project_id, author_id)?.is_none() {
            return Ok(None);
        }

        let (Some(source), Some(target)) = (
            self.get_branch(source_branch_id)?,
            self.get_branch(target_branch_id)?,
        ) else {
            return Ok(None);
        };
        if source.project_id != project_id || target.project_id != project_id {
            return Ok(None);
        }

        let commits = self
            .history(&source.id)?
            .into_iter()
            .map(|c| c.id)
            .collect();

        let pr = PullRequest {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            source_branch_id: source.id,
            target_branch_id: target.id,
            title: title.to_string(),
            description: description.to_string(),
            created_by: author_id.to_string(),
            status: PullRequestStatus::Open,
            commits,
            created_at: Utc::now(),
            merged_at: None,
            merged_by: None,
        };
        self.store.put(&pr)?;

        tracing::info!("Pull request {} opened by {}", pr.id, author_id);
        Ok(Some(pr))
    }

    /// Marks an open pull request merged. Commits are not replayed onto the
    /// target branch. A pull request that already left `open` is returned as is.
    pub fn merge(&self, pr_id: &str, merger_id: &str) -> Result<Option<PullRequest>> {
        let _guard = self.pr_lock.lock().unwrap_or_else(|e| e.into_inner());

        let Some(mut pr) = self.store.get::<PullRequest>(pr_id)? else {
            return Ok(None);
        };
        let Some(project) = self.store.get::<Project>(&pr.project_id)? else {
            return Ok(None);
        };
        if !is_admin(&project, merger_id) {
            return Err(Error::Forbidden);
        }
        if pr.status != PullRequestStatus::Open {
            tracing::debug!("Pull request {} is already {}", pr.id, pr.status);
            return Ok(Some(pr));
        }

        pr.status = PullRequestStatus::Merged;
        pr.merged_at = Some(Utc::now());
        pr.merged_by = Some(merger_id.to_string());
        self.store.put(&pr)?;

        tracing::info!("Pull request {} merged by {}", pr.id, merger_id);
        Ok(Some(pr))
    }

    /// Closes an open pull request without merging. Admin or author only.
    pub fn close(&self, pr_id: &str, user_id: &str) -> Result<Option<PullRequest>> {
        let _guard = self.pr_lock.lock().unwrap_or_else(|e| e.into_inner());

        let Some(mut pr) = self.store.get::<PullRequest>(pr_id)? else {
            return Ok(None);
        };
        let Some(project) = self.store.get::<Project>(&pr.project_id)? else {
            return Ok(None);
        };
        if !is_admin(&project, user_id) && pr.created_by != user_id {
            return Err(Error::Forbidden);
        }
        if pr.status != PullRequestStatus::Open {
            tracing::debug!("Pull request {} is already {}", pr.id, pr.status);
            return Ok(Some(pr));
        }

        pr.status = PullRequestStatus::Closed;
        self.store.put(&pr)?;

        tracing::info!("Pull request {} closed by {}", pr.id, user_id);
        Ok(Some(pr))
    }

    pub fn list_pull_requests(
        &self,
        project_id: &str,
        status: Option<PullRequestStatus>,
    ) -> Result<Vec<PullRequest>> {
        Ok(self
            .store
            .list::<PullRequest>(project_id)?
            .into_iter()
            .filter(|pr| status.is_none_or(|s| pr.status == s))
            .collect())
    }

    fn require_member(&self, project_id: &str, user_id: &str) -> Result<Option<Project>> {
        let Some(project) = self.store.get::<Project>(project_id)? else {
            return Ok(None);
        };
        if !has_access(self.store.as_ref(), &project, user_id)? {
            return Err(Error::Forbidden);
        }
        Ok(Some(project))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::testing::{Fixture, fixture, grant_access};
    use crate::store::StoreExt;

    fn change(name: &str, old: &str, new: &str) -> CommitFile {
        CommitFile {
            file_id: format!("{name}-id"),
            file_name: name.to_string(),
            old_content: old.to_string(),
            new_content: new.to_string(),
            action: FileAction::Update,
        }
    }

    #[test]
    fn test_history_is_newest_first() {
        let Fixture { services, project, admin, .. } = fixture();
        let main = services.versioning.main_branch(&project.id).unwrap().unwrap();

        let c1 = services
            .versioning
            .commit(&project.id, &main.id, &admin.id, "C1", vec![change("a", "", "1")])
            .unwrap()
            .unwrap();
        assert!(c1.parent_commit_id.is_none());

        let c2 = services
            .versioning
            .commit(&project.id, &main.id, &admin.id, "C2", vec![change("a", "1", "2")])
            .unwrap()
            .unwrap();
        assert_eq!(c2.parent_commit_id.as_deref(), Some(c1.id.as_str()));

        let history = services.versioning.history(&main.id).unwrap();
        let ids: Vec<&str> = history.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec![c2.id.as_str(), c1.id.as_str()]);

        let head = services.versioning.get_branch(&main.id).unwrap().unwrap();
        assert_eq!(head.head_commit_id, Some(c2.id));
    }

    #[test]
    fn test_n_commits_chain() {
        let Fixture { services, project, admin, .. } = fixture();
        let main = services.versioning.main_branch(&project.id).unwrap().unwrap();

        for i in 0..5 {
            services
                .versioning
                .commit(
                    &project.id,
                    &main.id,
                    &admin.id,
                    &format!("commit {i}"),
                    vec![change("a", "", &i.to_string())],
                )
                .unwrap()
                .unwrap();
        }

        let history = services.versioning.history(&main.id).unwrap();
        assert_eq!(history.len(), 5);
        assert_eq!(history[0].message, "commit 4");
        assert!(history.last().unwrap().parent_commit_id.is_none());
    }

    #[test]
    fn test_empty_history() {
        let Fixture { services, project, admin, .. } = fixture();
        let branch = services
            .versioning
            .create_branch(&project.id, "feature", &admin.id, false)
            .unwrap()
            .unwrap();
        assert!(services.versioning.history(&branch.id).unwrap().is_empty());
        assert!(services.versioning.history("missing").unwrap().is_empty());
    }

    #[test]
    fn test_history_stops_at_missing_parent_and_cycles() {
        let Fixture { services, store, project, admin, .. } = fixture();
        let main = services.versioning.main_branch(&project.id).unwrap().unwrap();

        let c1 = services
            .versioning
            .commit(&project.id, &main.id, &admin.id, "C1", vec![change("a", "", "1")])
            .unwrap()
            .unwrap();
        let mut c2 = services
            .versioning
            .commit(&project.id, &main.id, &admin.id, "C2", vec![change("a", "1", "2")])
            .unwrap()
            .unwrap();

        // Point C1 back at C2 to form a loop.
        let mut looped = c1.clone();
        looped.parent_commit_id = Some(c2.id.clone());
        store.put(&looped).unwrap();
        assert_eq!(services.versioning.history(&main.id).unwrap().len(), 2);

        // Truncate the chain below C2.
        c2.parent_commit_id = Some("gone".to_string());
        store.put(&c2).unwrap();
        assert_eq!(services.versioning.history(&main.id).unwrap().len(), 1);
    }

    #[test]
    fn test_commit_requires_access_and_content() {
        let Fixture { services, project, admin, member, .. } = fixture();
        let main = services.versioning.main_branch(&project.id).unwrap().unwrap();

        let denied = services.versioning.commit(
            &project.id,
            &main.id,
            &member.id,
            "msg",
            vec![change("a", "", "1")],
        );
        assert!(matches!(denied, Err(Error::Forbidden)));

        let empty = services
            .versioning
            .commit(&project.id, &main.id, &admin.id, "msg", Vec::new());
        assert!(matches!(empty, Err(Error::BadRequest(_))));

        grant_access(&services, &project, &member, &admin);
        let ok = services
            .versioning
            .commit(&project.id, &main.id, &member.id, "msg", vec![change("a", "", "1")])
            .unwrap();
        assert!(ok.is_some());
    }

    #[test]
    fn test_commit_diffs() {
        let commit = Commit {
            id: "c".to_string(),
            project_id: "p".to_string(),
            branch_id: "b".to_string(),
            user_id: "u".to_string(),
            message: "m".to_string(),
            files: vec![change("a", "x\ny", "x\nz")],
            created_at: Utc::now(),
            parent_commit_id: None,
        };
        let diffs = VersionControl::commit_diffs(&commit);
        assert_eq!(diffs.len(), 1);
        assert_eq!((diffs[0].diff.added, diffs[0].diff.removed), (1, 1));
    }

    #[test]
    fn test_pull_request_lifecycle() {
        let Fixture { services, project, admin, member, .. } = fixture();
        grant_access(&services, &project, &member, &admin);
        let main = services.versioning.main_branch(&project.id).unwrap().unwrap();
        let feature = services
            .versioning
            .create_branch(&project.id, "feature", &member.id, false)
            .unwrap()
            .unwrap();
        let commit = services
            .versioning
            .commit(&project.id, &feature.id, &member.id, "work", vec![change("a", "", "1")])
            .unwrap()
            .unwrap();

        let pr = services
            .versioning
            .open_pull_request(&project.id, &feature.id, &main.id, "Feature", "", &member.id)
            .unwrap()
            .unwrap();
        assert_eq!(pr.status, PullRequestStatus::Open);
        assert_eq!(pr.commits, vec![commit.id]);

        assert!(matches!(
            services.versioning.merge(&pr.id, &member.id),
            Err(Error::Forbidden)
        ));

        let merged = services.versioning.merge(&pr.id, &admin.id).unwrap().unwrap();
        assert_eq!(merged.status, PullRequestStatus::Merged);
        assert_eq!(merged.merged_by.as_deref(), Some(admin.id.as_str()));

        let closed = services.versioning.close(&pr.id, &admin.id).unwrap().unwrap();
        assert_eq!(closed.status, PullRequestStatus::Merged);

        let remerged = services.versioning.merge(&pr.id, &admin.id).unwrap().unwrap();
        assert_eq!(remerged.merged_at, merged.merged_at);

        // Merging never moves the target head.
        let main = services.versioning.get_branch(&main.id).unwrap().unwrap();
        assert!(main.head_commit_id.is_none());
    }

    #[test]
    fn test_close_by_author() {
        let Fixture { services, project, admin, member, .. } = fixture();
        grant_access(&services, &project, &member, &admin);
        let main = services.versioning.main_branch(&project.id).unwrap().unwrap();
        let feature = services
            .versioning
            .create_branch(&project.id, "feature", &member.id, false)
            .unwrap()
            .unwrap();
        let pr = services
            .versioning
            .open_pull_request(&project.id, &feature.id, &main.id, "Feature", "", &member.id)
            .unwrap()
            .unwrap();

        let closed = services.versioning.close(&pr.id, &member.id).unwrap().unwrap();
        assert_eq!(closed.status, PullRequestStatus::Closed);

        let merged = services.versioning.merge(&pr.id, &admin.id).unwrap().unwrap();
        assert_eq!(merged.status, PullRequestStatus::Closed);
        assert!(merged.merged_at.is_none());

        assert_eq!(
            services
                .versioning
                .list_pull_requests(&project.id, Some(PullRequestStatus::Open))
                .unwrap()
                .len(),
            0
        );
    }

    #[test]
    fn test_pull_request_validation() {
        let Fixture { services, project, admin, .. } = fixture();
        let main = services.versioning.main_branch(&project.id).unwrap().unwrap();

        let same = services
            .versioning
            .open_pull_request(&project.id, &main.id, &main.id, "t", "", &admin.id);
        assert!(matches!(same, Err(Error::BadRequest(_))));

        let missing = services
            .versioning
            .open_pull_request(&project.id, "missing", &main.id, "t", "", &admin.id)
            .unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_main_branch_is_first_flagged() {
        let Fixture { services, project, admin, .. } = fixture();
        let original = services.versioning.main_branch(&project.id).unwrap().unwrap();
        services
            .versioning
            .create_branch(&project.id, "second-main", &admin.id, true)
            .unwrap();

        let main = services.versioning.main_branch(&project.id).unwrap().unwrap();
        assert_eq!(main.id, original.id);
        assert_eq!(services.versioning.list_branches(&project.id).unwrap().len(), 2);
    }
}
