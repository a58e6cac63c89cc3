//! Cross-subsystem scenarios.

mod message_security;
mod swap_scenarios;
