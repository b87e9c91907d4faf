pub mod aggregate;
pub mod macro_context;
pub mod provider;
pub mod types;
