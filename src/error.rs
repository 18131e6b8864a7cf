#[derive(Debug, thiserror::Error)]
pub enum ShowError {
    /// A show document node that doesn't match the action grammar.
    /// `tag` is the node's `type`, or `<missing>` when it has none.
    #[error("malformed {tag} action: {reason}")]
    MalformedAction { tag: String, reason: String },

    #[error("unknown command: {0:?}")]
    UnknownCommand(String),

    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
}

impl ShowError {
    pub fn malformed(tag: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedAction { tag: tag.into(), reason: reason.into() }
    }
}
