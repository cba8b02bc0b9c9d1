//! Natter core library: persistence, conversations, the Ollama client and the tool-calling
//! turn pipeline shared by the CLI and desktop applications.

pub mod agent;
pub mod app;
pub mod compose;
pub mod config;
pub mod init;
pub mod llm;
pub mod reply;
pub mod session;
pub mod store;
pub mod tools;
pub mod worker;
