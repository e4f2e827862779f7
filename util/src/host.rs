//! Host platform utility functions

use std::path::PathBuf;

/// Name of the environment variable pointing at the root of the software
/// checkout (the directory containing `params/`).
pub const SW_ROOT_ENV_VAR: &str = "MOWER_SW_ROOT";

/// Get the root directory of the mower software from the environment.
pub fn get_mower_sw_root() -> Result<PathBuf, std::env::VarError> {
    std::env::var(SW_ROOT_ENV_VAR).map(PathBuf::from)
}
