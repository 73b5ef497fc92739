mod models;
mod status;

pub use models::*;
pub use status::{AccessStatus, FileAction, PullRequestStatus, ReviewStatus};
