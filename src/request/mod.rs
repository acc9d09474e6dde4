pub mod async_request;
#[allow(clippy::module_inception)]
pub mod request;
pub mod status;

pub use async_request::AsyncRequest;
pub use request::Request;
pub use status::Status;
