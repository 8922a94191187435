pub mod client;
pub mod dispatcher;
pub mod format;
pub mod method;
pub mod request;
pub mod response;
