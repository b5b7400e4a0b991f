pub mod loader;
pub mod models;
pub mod validation;

pub use loader::load_config;
pub use models::*;
pub use validation::{ResolverConfigValidator, ValidationError, ValidationResult};
