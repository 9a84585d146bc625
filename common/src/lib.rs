//! Process-level helpers shared by the split-stats crates and tools:
//! logging/panic setup and test fixture lookup.

pub mod init;
pub mod test_utils;
