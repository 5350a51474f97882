/// Preconditions that stop an operation before it writes anything.
///
/// These travel inside `anyhow::Error`; callers that care can
/// `downcast_ref::<Blocked>()`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Blocked {
    #[error("project not found: {0}")]
    ProjectNotFound(String),

    #[error("project already exists: {0}")]
    ProjectExists(String),

    #[error("invalid project name: {0:?}")]
    InvalidProjectName(String),

    #[error("outline not approved")]
    OutlineNotApproved,

    #[error("model is not registered in this project: {0} (see `plotforge models --set`)")]
    UnknownModel(String),

    #[error("page {0} has no draft")]
    PageNotDrafted(u32),

    #[error("chapter {0} is not finalized (run `approve-chapter` or `concat-chapter` first)")]
    ChapterNotFinalized(u32),

    #[error("chapter {0} is out of range")]
    ChapterOutOfRange(u32),
}

pub fn is_blocked(err: &anyhow::Error) -> bool {
    err.downcast_ref::<Blocked>().is_some()
}
