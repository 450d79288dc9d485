pub mod providers;

use nodeflow_core::config::ModelConfig;
use nodeflow_core::traits::TextGenerator;

pub use providers::ollama::OllamaGenerator;
pub use providers::openai::OpenAiGenerator;

/// Create a text generator based on the provider name.
pub fn create_generator(config: &ModelConfig) -> Box<dyn TextGenerator> {
    match config.provider.as_str() {
        "ollama" => Box::new(OllamaGenerator::new()),
        // Everything else uses the OpenAI-compatible client
        _ => Box::new(OpenAiGenerator::new()),
    }
}
