/// Main entry point for the scheduler binary.
///
/// A thin wrapper that delegates to the interfaces layer; the actual
/// application logic lives in `interfaces::cli`.

use kv_scheduler::interfaces::cli;

fn main() {
    std::process::exit(cli::run());
}
