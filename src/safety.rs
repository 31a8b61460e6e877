use async_trait::async_trait;

/// Decides whether a model-flagged safety check may be acknowledged.
///
/// Called once per pending check, before the observation of the action is
/// sent back to the model. Returning `false` aborts the turn.
#[async_trait]
pub trait SafetyCheckHandler: Send + Sync {
    async fn acknowledge(&self, message: &str) -> bool;
}

/// Rejects every check. Used when the caller configures nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct RejectAll;

#[async_trait]
impl SafetyCheckHandler for RejectAll {
    async fn acknowledge(&self, _message: &str) -> bool {
        false
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct AcknowledgeAll;

#[async_trait]
impl SafetyCheckHandler for AcknowledgeAll {
    async fn acknowledge(&self, _message: &str) -> bool {
        true
    }
}

#[async_trait]
impl<F> SafetyCheckHandler for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    async fn acknowledge(&self, message: &str) -> bool {
        self(message)
    }
}
