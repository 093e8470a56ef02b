pub mod container;
pub mod credentials;
pub mod error;
pub mod registry;
pub mod request;
pub mod steampipe;
pub mod trait_def;

pub use container::{ContainerTool, ToolSpec, CONTAINER_TOOLS};
pub use credentials::{provider_credentials, Credentials};
pub use error::ToolError;
pub use registry::ToolRegistry;
pub use request::{Params, ToolInvocation, ToolKind, ToolRequest, ToolResult};
pub use steampipe::{QueryError, QueryRunner, SteampipeRunner, SteampipeTool};
pub use trait_def::ToolAdapter;
