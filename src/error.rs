use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors reported by build context operations.
///
/// Misuse of the API (foreign handles, mutation after commit) fails fast;
/// workspace I/O and state persistence failures are propagated as-is.
#[derive(Debug, Error)]
pub enum ContextError {
    /// The workspace cannot see the resource being registered.
    #[error("resource does not exist or cannot be read: {0}")]
    ResourceNotFound(Utf8PathBuf),

    /// A handle created by a different build context was passed in.
    #[error("resource belongs to a different build context: {0}")]
    ForeignHandle(Utf8PathBuf),

    /// The resource is not registered with the current build.
    #[error("resource is not registered with this build: {0}")]
    UnknownResource(Utf8PathBuf),

    /// An input was re-registered with conflicting file information.
    #[error("inconsistent resource state: {0}")]
    InconsistentResource(Utf8PathBuf),

    /// Deleting a file that neither build declared as an output.
    #[error("not an output of this or the previous build: {0}")]
    NotAnOutput(Utf8PathBuf),

    /// Mutation attempted after the context was committed or closed.
    #[error("build context is closed")]
    Closed,

    /// `mark_skip_execution` is only legal before anything was processed.
    #[error("cannot skip execution, resources have already been processed")]
    SkipAfterProcessing,

    #[error(transparent)]
    Pattern(#[from] glob::PatternError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The state record could not be serialized at commit.
    #[error("failed to persist build state: {0}")]
    Persist(#[from] serde_json::Error),

    /// Commit found error messages and had no sink to hand them to.
    #[error("{count} build error(s):\n{summary}")]
    BuildFailure { count: usize, summary: String },

    /// An aggregate creator or input processor reported a failure.
    #[error("builder callback failed: {0}")]
    Callback(anyhow::Error),
}
