pub mod openai_compatible;
pub mod prompt;
pub mod provider;
pub mod registry;
pub mod sse_parser;
pub mod types;
