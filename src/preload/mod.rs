pub mod recent;
pub mod scheduler;
pub mod task;
