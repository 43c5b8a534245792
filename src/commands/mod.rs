pub mod alternatives;
pub mod diff;
pub mod frames;
pub mod history;
pub mod pick;
pub mod score;
pub mod stats;
pub mod utils;
pub mod validate;

#[cfg(test)]
#[path = "../commands_test.rs"]
mod commands_test;
