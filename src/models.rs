pub mod capabilities;
pub mod content;
pub mod message;
pub mod request;
pub mod response;
pub mod role;
pub mod tool;
