//! `rqg`: the CLI entry point. Installs logging, runs `rqg::cli`, and
//! translates the result into a process exit code:
//! `0` success, `1` configuration or unrecoverable runtime error, `2` usage
//! error (handled by `clap` itself before this ever runs), `130` interrupted.

use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match rqg::cli::run() {
        Ok(code) => ExitCode::from(code as u8),
        Err(err) => {
            eprintln!("rqg: {}", err);
            ExitCode::from(1)
        }
    }
}
