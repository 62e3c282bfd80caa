//! Cancellation support for in-flight calls
//!
//! Cancelling only asks the driver to stop; the call still resolves through
//! its normal finish path.

use tokio_util::sync::CancellationToken;

/// Wrapper around CancellationToken for call cancellation
#[derive(Clone, Debug)]
pub struct CallCancellation {
    token: CancellationToken,
}

impl CallCancellation {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Request cancellation of every call sharing this token
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Get a child token; cancelling the parent cancels the child too
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
        }
    }

    /// Resolves once cancellation has been requested
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }
}

impl Default for CallCancellation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_cancels_child() {
        let parent = CallCancellation::new();
        let child = parent.child();
        assert!(!child.is_cancelled());

        parent.cancel();
        assert!(child.is_cancelled());
    }

    #[test]
    fn test_child_does_not_cancel_parent() {
        let parent = CallCancellation::new();
        let child = parent.child();
        child.cancel();

        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
    }
}
