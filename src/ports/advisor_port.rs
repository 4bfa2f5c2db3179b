//! Language-model advisor port used by the tuner and the symbol selector.

use crate::domain::error::HftaError;
use async_trait::async_trait;

#[async_trait]
pub trait AdvisorPort: Send + Sync {
    /// Send the prompts plus the serialized state and return the raw reply text.
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        state_json: &str,
    ) -> Result<String, HftaError>;
}
