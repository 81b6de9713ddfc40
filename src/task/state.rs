//! Task lifecycle states.

/// Where a task is in its lifecycle.
///
/// A task moves strictly forward: once a terminal state is reached it never
/// changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskState {
    /// Built but not yet asked to execute.
    #[default]
    Created,

    /// Execution requested; waiting for prerequisites to finish.
    Started,

    /// Networking phase submitted and not yet concluded.
    AwaitingNetworking,

    /// Processing phase submitted and not yet concluded.
    AwaitingProcessing,

    /// Both phases finished.
    Completed,

    /// A phase failed, or a prerequisite failed before this task ran.
    Failed,

    /// Cancelled before it could complete.
    Cancelled,
}

impl TaskState {
    /// True for states the task can never leave.
    ///
    /// Terminal states are: Completed, Failed, Cancelled.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// True while the task can still make progress.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// True when the task finished both phases.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Started => write!(f, "Started"),
            Self::AwaitingNetworking => write!(f, "AwaitingNetworking"),
            Self::AwaitingProcessing => write!(f, "AwaitingProcessing"),
            Self::Completed => write!(f, "Completed"),
            Self::Failed => write!(f, "Failed"),
            Self::Cancelled => write!(f, "Cancelled"),
        }
    }
}
