//! chatbot-service: a TCP bot that answers one JSON query per connection
//! with a generated, cleaned-up follow-up.

pub mod config;
pub mod error;
pub mod normalizer;
pub mod protocol;
pub mod server;
pub mod services;
pub mod startup;
