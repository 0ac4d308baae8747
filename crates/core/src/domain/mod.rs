pub mod column;
pub mod ids;
pub mod memory;
pub mod plan;
pub mod report;
