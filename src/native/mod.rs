/// Native module contains implementations of core traits
/// backed by the running operating system: nix syscalls and
/// procfs for the platform hooks, sysinfo for process statistics.
pub mod monitor;
pub mod platform;
