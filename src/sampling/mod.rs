pub mod batch;
pub mod cache;
pub mod source;
pub mod stats;
