pub mod echo;
pub mod http;

pub use echo::EchoInvoker;
pub use http::HttpInvoker;
