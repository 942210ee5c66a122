pub mod params;
pub mod schema;

pub use params::{ParamDef, Params};
pub use schema::{
    AgentConfig, BudgetConfig, CaptureConfig, Config, ModelConfig, OutputConfig, Viewport,
};
