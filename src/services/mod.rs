pub mod dispatch;
pub mod fetch;
pub mod imaging;
pub mod inference;
pub mod orchestrator;
pub mod pipeline;
pub mod queue;
pub mod storage;
