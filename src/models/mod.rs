pub mod job;
pub mod owner;
pub mod tryon;
