pub mod domain;
pub mod job;
pub mod notification;
pub mod placement_test;
pub mod pool;
