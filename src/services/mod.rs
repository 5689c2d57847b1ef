pub mod callback;
pub mod orchestrator;
pub mod stages;
pub mod storage;
