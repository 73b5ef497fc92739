use serde::{Deserialize, Serialize};

use crate::relay::RelayStats;
use crate::service::FileDiff;
use crate::types::{Commit, CommitFile};

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateFileRequest {
    pub file_name: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct RenameFileRequest {
    pub file_name: String,
}

#[derive(Debug, Deserialize)]
pub struct WriteFileRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct PostMessageRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ProposeChangeRequest {
    pub file_id: String,
    pub old_content: String,
    pub new_content: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateBranchRequest {
    pub name: String,
    #[serde(default)]
    pub is_main: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateCommitRequest {
    pub message: String,
    pub files: Vec<CommitFile>,
}

#[derive(Debug, Deserialize)]
pub struct OpenPullRequestRequest {
    pub source_branch_id: String,
    pub target_branch_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    pub code: String,
    pub language: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct StatusFilterParams {
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CommitDetail {
    #[serde(flatten)]
    pub commit: Commit,
    pub diffs: Vec<FileDiff>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub relay: RelayStats,
}
