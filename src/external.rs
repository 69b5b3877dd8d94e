//! Locating executables on `PATH` and spawning external programs.

use crate::command::{Command, ExitCode, StageIo};
use crate::env::Environment;
use std::borrow::Cow;
use std::ffi::OsStr;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::ExitStatus;

/// Exit status reported when the program name does not resolve.
pub const NOT_FOUND_STATUS: ExitCode = 127;

/// Resolve a command path the way a typical shell would.
///
/// Behavior:
/// - Absolute names, and names beginning with `./` or `../`, are checked
///   for existence and returned unchanged.
/// - Any other name is probed against each directory of the
///   colon-separated `search_paths` value in first-match order; a match
///   must exist, be a regular file and carry an execute permission bit.
/// - Unreadable or missing directories are skipped silently.
///
/// Returns either a borrowed reference to the provided `name` or an owned
/// path discovered via the search list.
pub fn find_command_path<'a>(search_paths: &OsStr, name: &'a Path) -> Option<Cow<'a, Path>> {
    if name.is_absolute() || name.starts_with("./") || name.starts_with("../") {
        return name.exists().then_some(Cow::Borrowed(name));
    }
    for dir in std::env::split_paths(search_paths) {
        let candidate = dir.join(name);
        if is_executable_file(&candidate) {
            tracing::debug!(path = %candidate.display(), "resolved on search path");
            return Some(Cow::Owned(candidate));
        }
    }
    None
}

#[cfg(unix)]
fn is_executable_file(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    match fs::metadata(path) {
        Ok(metadata) => metadata.is_file() && metadata.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn is_executable_file(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}

/// Spawn the external program for `command` with the wired streams and
/// wait for it to terminate.
///
/// The child runs the resolved path, but its `argv[0]` keeps the name the
/// user typed. Returns the child's exit status, [`NOT_FOUND_STATUS`] when
/// the name does not resolve, and 1 when the spawn itself fails.
pub fn run(command: Command, mut io: StageIo, env: &Environment) -> ExitCode {
    let name = &command.argv[0];
    let search_paths = env.get_var("PATH").unwrap_or_default();
    let resolved = match find_command_path(OsStr::new(&search_paths), Path::new(name)) {
        Some(path) => path.into_owned(),
        None => {
            let _ = writeln!(io.stderr, "{}: command not found", name);
            return NOT_FOUND_STATUS;
        }
    };

    let mut child = std::process::Command::new(&resolved);
    child
        .args(&command.argv[1..])
        .envs(env.vars.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .current_dir(&env.current_dir)
        .stdin(io.stdin.stdio())
        .stdout(io.stdout.stdio())
        .stderr(io.stderr.stdio());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        child.arg0(name);
    }

    match child.spawn() {
        Ok(mut running) => match running.wait() {
            Ok(status) => exit_code(status),
            Err(err) => {
                let _ = writeln!(std::io::stderr(), "{}: {}", name, err);
                1
            }
        },
        Err(err) => {
            let _ = writeln!(std::io::stderr(), "{}: {}", name, err);
            1
        }
    }
}

fn exit_code(status: ExitStatus) -> ExitCode {
    match status.code() {
        Some(code) => code,
        None => terminated_by_signal(status),
    }
}

#[cfg(unix)]
fn terminated_by_signal(exit_status: ExitStatus) -> ExitCode {
    use std::os::unix::process::ExitStatusExt;
    if let Some(signal) = ExitStatusExt::signal(&exit_status) {
        128 + signal
    } else if ExitStatusExt::core_dumped(&exit_status) {
        255
    } else {
        -1
    }
}

#[cfg(not(unix))]
fn terminated_by_signal(_exit_status: ExitStatus) -> ExitCode {
    -1
}
