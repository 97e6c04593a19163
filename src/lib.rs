// OAuth membership gateway for a chat server

// HTTP callback endpoint
pub mod api;

// Command surface for the chat dispatch layer
pub mod commands;

// Environment and TOML configuration
pub mod config;

// Credential and admin storage
pub mod credentials;

pub mod error;

// Add-member with stored grants
pub mod join;

// Token exchange, refresh and sweep
pub mod oauth;

// Chat platform REST seam
pub mod platform;
