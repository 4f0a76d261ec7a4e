mod registry;
mod selectors;

pub use registry::{ModelProvider, ModelRegistry, ModelSpec, DEFAULT_MODEL};
pub use selectors::{ModelSelection, ModelSelector};
