use anyhow::Result;
use serde_json::Value;

use crate::images::PreparedImage;

/// Text returned by a vision provider for one comparison.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderReply {
    pub text: String,
    pub model: String,
    pub usage: Option<Value>,
    pub warnings: Vec<String>,
}

/// A generative model that can compare two images given an instruction.
///
/// Implementations own authentication, timeouts and transport retries.
pub trait VisionProvider: Send + Sync {
    fn name(&self) -> &str;
    /// Name shown in user-facing messages.
    fn display_name(&self) -> &str {
        self.name()
    }
    fn model(&self) -> &str;
    /// `images` are ordered before, after.
    fn compare(&self, instruction: &str, images: &[PreparedImage]) -> Result<ProviderReply>;
    fn ping(&self) -> Result<String>;
}
