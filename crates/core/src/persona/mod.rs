pub mod council;
pub mod evaluator;
pub mod prompt;
pub mod store;
