pub mod annotator;
pub mod catalog;
pub mod observation;
pub mod types;
