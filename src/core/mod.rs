pub mod catalogue;
pub mod chat_completion;
pub mod config;
pub mod error;
pub mod listener;
pub mod orchestrator;
pub mod session;
pub mod transcript;

#[cfg(test)]
pub mod test_helpers;
