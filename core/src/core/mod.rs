pub mod engine;
pub mod reporter;
pub mod summary;
pub mod throttle;
pub mod tracker;

/// Result of a single issued request, as reported by the transport.
///
/// Any HTTP status counts as `Completed`; only transport-level problems map
/// to the other two variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Completed(u16),
    TimedOut,
    Failed,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Completed(code) => write!(f, "Completed ({})", code),
            Outcome::TimedOut => write!(f, "Timed out"),
            Outcome::Failed => write!(f, "Failed"),
        }
    }
}
