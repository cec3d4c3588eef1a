pub mod config;
pub mod error;
pub mod outcome;
pub mod result;
pub mod task;

pub use config::*;
pub use error::*;
pub use outcome::*;
pub use result::*;
pub use task::*;
