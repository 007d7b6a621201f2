//! One module per subcommand.

pub mod job;
pub mod migrate;
pub mod serve;
pub mod worker;
