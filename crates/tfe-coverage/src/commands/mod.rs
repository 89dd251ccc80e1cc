pub mod cache;
pub mod report;
pub mod resource_types;
