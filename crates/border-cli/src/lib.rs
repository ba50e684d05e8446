//! CLI argument model and validation for the border hook binary.
//!
//! Every flag mirrors an environment variable so the hook can be configured
//! from the agent's hook settings without a wrapper script.

pub mod cli_args;
pub mod validation;

pub use cli_args::Cli;
pub use validation::*;
