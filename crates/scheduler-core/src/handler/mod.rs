pub mod context;
pub mod mapping;
pub mod registry;
pub mod trait_def;

pub use context::ExecutionContext;
pub use mapping::{MappingConfig, MappingError, load_mapping};
pub use registry::{HandlerFactoryRegistry, HandlerRegistry};
pub use trait_def::JobHandler;
