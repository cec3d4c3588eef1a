pub mod invoker;
pub mod processor;
pub mod renderer;
pub mod strategy;

pub use invoker::*;
pub use processor::*;
pub use renderer::*;
pub use strategy::*;
