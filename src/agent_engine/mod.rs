pub mod artifacts;
pub mod budget;
pub mod engine;
pub mod history;
pub mod loop_control;
pub mod page_data;
pub mod parallel;
pub mod recorder;
pub mod report;
pub mod state;
pub mod url_hint;
