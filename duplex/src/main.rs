use std::io::Write;
use std::process::ExitCode;

use duplex::{DuplexConfig, DuplexError};

fn main() -> ExitCode {
    duplex::logging::init_tracing();

    let config = match DuplexConfig::from_env() {
        Ok(config) => config,
        Err(e) => return fail(&e.into()),
    };

    // Safety: nothing has spawned a thread yet; the runtime is created inside
    // `run`, after the fork.
    match unsafe { duplex::run(config) } {
        Ok(outcome) => {
            tracing::debug!(role = %outcome.role(), "Session finished");
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

fn fail(err: &DuplexError) -> ExitCode {
    // One write: the peer process shares stderr.
    let line = format!("error: {err}\n");
    let _ = std::io::stderr().write_all(line.as_bytes());
    ExitCode::from(err.exit_code())
}
