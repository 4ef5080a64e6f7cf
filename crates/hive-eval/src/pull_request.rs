use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// One pull request thread that status comments can land on.
pub struct PullRequestRef {
    pub owner: String,
    pub repo: String,
    pub number: u64,
}

impl PullRequestRef {
    pub fn as_slug(&self) -> String {
        format!("{}/{}#{}", self.owner, self.repo, self.number)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
/// Issue comment as returned by the pull request comment listing.
pub struct PullRequestComment {
    pub id: u64,
    pub body: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
/// Pull request record returned by the commit-association listing.
pub struct AssociatedPullRequest {
    pub number: u64,
    #[serde(default)]
    pub title: String,
}
