pub mod errors;
pub mod job_client;
pub mod policy;
pub mod polling;
pub mod session;
pub mod single_flight;
pub mod timeline;
pub mod tracker;
