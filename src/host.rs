//! # Host Process
//!
//! Restart capability of the process running the emulator. A restart
//! replaces the process image, so nothing held in memory survives it.

use tracing::info;

use crate::supervisor::RestartRequest;

/// Exit status used when the process cannot re-execute itself
pub const RESTART_EXIT_CODE: i32 = 75;

/// Restart the process
///
/// Re-executes the current binary with the same arguments. If that fails
/// (or on non-Unix hosts) the process exits with [`RESTART_EXIT_CODE`] so a
/// service manager can start it again.
pub fn restart(request: RestartRequest) -> ! {
    info!("Restarting process");

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        use std::process::Command;

        match std::env::current_exe() {
            Ok(exe) => {
                // exec only returns on failure
                let err = Command::new(exe).args(std::env::args_os().skip(1)).exec();
                tracing::error!("Failed to re-execute: {}", err);
            }
            Err(e) => tracing::error!("Cannot locate current executable: {}", e),
        }
    }

    drop(request);
    std::process::exit(RESTART_EXIT_CODE);
}
