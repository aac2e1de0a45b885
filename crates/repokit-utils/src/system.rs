use std::fs;

/// Machine hardware name of the running kernel (`uname -m`).
///
/// Falls back to the compile-time architecture if `uname` fails.
pub fn machine() -> String {
    nix::sys::utsname::uname()
        .map(|uts| uts.machine().to_string_lossy().into_owned())
        .unwrap_or_else(|_| std::env::consts::ARCH.to_string())
}

/// Contents of `/proc/cpuinfo`, or an empty string where it is unavailable.
pub fn cpu_info() -> String {
    fs::read_to_string("/proc/cpuinfo").unwrap_or_default()
}
