//! RegTrust CLI - diagnose and work around registry certificate failures.

pub mod commands;
pub mod output;

#[cfg(test)]
mod testutil;
