//! Built-in source connectors.

pub mod circleci;
pub mod testrails;
