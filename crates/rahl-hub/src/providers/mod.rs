pub mod openai;

pub use openai::OpenAiProvider;

use rahl_core::provider::{LlmProvider, ProviderConfig};

/// Build the configured provider.
pub fn from_config(config: &ProviderConfig) -> Box<dyn LlmProvider> {
    Box::new(OpenAiProvider::new(config.clone()))
}
