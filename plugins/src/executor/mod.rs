pub mod processors;
pub mod renderers;
pub mod strategies;

pub use processors::RepairHintPlugin;
pub use renderers::{JsonlRendererPlugin, TextRendererPlugin};
pub use strategies::LinearRetryPlugin;
