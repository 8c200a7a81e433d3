pub mod courier;
pub mod driver;
pub mod location;
pub mod request;
