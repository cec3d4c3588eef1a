pub mod retry;

pub use retry::LinearRetryPlugin;
