pub mod billing;
pub mod plans;
pub mod subscribers;
pub mod webhook;

#[cfg(test)]
mod tests;
