use std::path::{Path, PathBuf};

/// Platform-specific operations abstracted behind a common interface so call
/// sites remain free of `#[cfg]` blocks.
pub trait Platform {
    /// Set restrictive directory permissions (0o700 on Unix).
    fn restrict_dir_permissions(path: &Path);

    /// Set restrictive file permissions (0o600 on Unix).
    fn restrict_file_permissions(path: &Path);

    /// Root data directory for vigil (`~/.vigil` on Unix).
    fn data_dir() -> PathBuf;

    /// Trigger a system reboot. The child is detached; the process is expected
    /// to die with the machine.
    fn reboot() -> std::io::Result<std::process::Child>;
}

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub use unix::NativePlatform;
