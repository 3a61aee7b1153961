use tokio_util::sync::CancellationToken;

/// Cooperative stop signal for one stream. Clones share the same state, so the
/// session can keep one handle while the aggregator awaits on another.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: CancellationToken,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Resolves once [`CancelToken::cancel`] has been called on any clone.
    pub async fn cancelled(&self) {
        self.inner.cancelled().await
    }
}
