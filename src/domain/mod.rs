pub mod detection;
pub mod errors;
pub mod request;
pub mod session;
