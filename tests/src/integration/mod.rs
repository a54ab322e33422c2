//! Cross-role integration scenarios.

#[cfg(test)]
mod harness;

mod e2e_delegation;
mod flows;
