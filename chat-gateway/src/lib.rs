//! chat-gateway: stateless HTTP-to-TCP forwarder for the chatbot service.

pub mod config;
pub mod handlers;
pub mod services;
pub mod startup;
