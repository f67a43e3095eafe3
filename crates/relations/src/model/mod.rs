//! Model types: definitions, instances, capability traits and the registry

pub mod definition;
pub mod instance;
pub mod naming;
pub mod registry;
pub mod traits;

pub use definition::{Getter, ModelDefinition, ModelDefinitionBuilder, Setter};
pub use instance::{Model, RelationValue};
pub use registry::{ModelRegistry, ModelRegistryBuilder};
pub use traits::{Attributable, Relatable, SoftDeletable, Timestamped};
