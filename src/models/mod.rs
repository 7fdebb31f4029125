pub mod courier;
pub mod exposure;
pub mod job;
pub mod message;
pub mod requester;
