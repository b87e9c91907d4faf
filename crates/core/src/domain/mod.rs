pub mod consensus;
pub mod contract;
pub mod opportunity;
pub mod persona;
pub mod score;
pub mod trigger;
