//! Pipeline execution: conduit creation, concurrent stage dispatch, join.
//!
//! Adjacent stages are connected by anonymous OS pipes. Each pipe end
//! implements the stage stream traits and converts into a process
//! `Stdio`, so the same conduit serves builtin stages (which read and
//! write it in-process) and external stages (which hand it to a child).
//! Ownership of both ends moves into the stages at dispatch; the
//! executor keeps nothing, which is what lets a downstream reader see
//! EOF as soon as its upstream writer is done.

use crate::builtin::Builtin;
use crate::command::{Command, ExitCode, StageIo, Stdin, Stdout};
use crate::external;
use crate::interpreter::ShellContext;
use crate::io_adapters::{InheritedStderr, InheritedStdin, InheritedStdout};
use std::io::{self, ErrorKind, Write};
use std::thread;

/// Exit status of a builtin stage whose conduit closed under it.
const BROKEN_CONDUIT_STATUS: ExitCode = 141;

/// Execute the stages of one pipeline concurrently.
///
/// Stage 0 inherits the shell's stdin, the last stage inherits the
/// shell's stdout, every stage inherits the shell's stderr, and each
/// stage may override any of those with its own redirections. The call
/// returns once every stage has terminated; the pipeline's status is the
/// last stage's status. Stages with an empty argv are skipped by
/// dropping their conduit ends, so their neighbors observe EOF on that
/// boundary.
pub fn run(ctx: &ShellContext, stages: Vec<Command>) -> ExitCode {
    let count = stages.len();
    if count == 0 {
        return 0;
    }
    tracing::debug!(stages = count, "running pipeline");

    let mut last_status = 0;
    thread::scope(|scope| {
        let mut handles = Vec::with_capacity(count);
        let mut carry: Option<io::PipeReader> = None;

        for (index, stage) in stages.into_iter().enumerate() {
            let is_last = index + 1 == count;
            let stdin: Box<dyn Stdin> = match carry.take() {
                Some(reader) => Box::new(reader),
                None => Box::new(InheritedStdin),
            };
            let stdout: Box<dyn Stdout> = if is_last {
                Box::new(InheritedStdout)
            } else {
                match io::pipe() {
                    Ok((reader, writer)) => {
                        carry = Some(reader);
                        Box::new(writer)
                    }
                    Err(err) => {
                        let _ = writeln!(io::stderr(), "shoal: pipe: {}", err);
                        last_status = 1;
                        return;
                    }
                }
            };

            if stage.argv.is_empty() {
                // Dropping this stage's ends right here is what makes the
                // neighbors see EOF across the gap.
                continue;
            }

            let io = StageIo {
                stdin,
                stdout,
                stderr: Box::new(InheritedStderr),
            };
            handles.push((is_last, scope.spawn(move || run_stage(ctx, stage, io))));
        }

        for (is_last, handle) in handles {
            let status = handle.join().unwrap_or(1);
            if is_last {
                last_status = status;
            }
        }
    });
    last_status
}

/// Run one stage to completion with its wired streams.
///
/// Redirections are applied first; an unopenable target fails the stage
/// with status 1 and no dispatch. Builtins run in-process, everything
/// else goes through the external launcher.
fn run_stage(ctx: &ShellContext, command: Command, mut io: StageIo) -> ExitCode {
    if let Err(err) = io.apply_redirections(&command) {
        let _ = writeln!(io.stderr, "{}: {}", command.argv[0], err);
        return 1;
    }
    match Builtin::from_name(&command.argv[0]) {
        Some(builtin) => {
            let StageIo {
                mut stdin,
                mut stdout,
                mut stderr,
            } = io;
            match builtin.run(&command.argv[1..], &mut stdin, &mut stdout, &mut stderr, ctx) {
                Ok(status) => {
                    let _ = stdout.flush();
                    status
                }
                // The downstream reader went away; die quietly the way a
                // SIGPIPE-killed child would.
                Err(err) if err.kind() == ErrorKind::BrokenPipe => BROKEN_CONDUIT_STATUS,
                Err(err) => {
                    let _ = writeln!(stderr, "{}: {}", command.argv[0], err);
                    1
                }
            }
        }
        None => external::run(command, io, &ctx.environment()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::Environment;
    use crate::lexer::split_into_tokens;
    use crate::parser::parse_pipeline;
    use std::fs;
    use std::path::PathBuf;

    fn make_unique_temp_dir(tag: &str) -> PathBuf {
        let dir =
            std::env::temp_dir().join(format!("shoal_pipeline_{}_{}", tag, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).expect("create temp dir");
        dir
    }

    fn stages_for(line: &str) -> Vec<Command> {
        parse_pipeline(split_into_tokens(line).unwrap()).unwrap()
    }

    fn test_context() -> ShellContext {
        // Pin the working directory to one that always exists; other
        // tests in this binary move the process cwd around.
        let mut env = Environment::new();
        env.current_dir = std::env::temp_dir();
        ShellContext::new(env, None)
    }

    #[test]
    fn zero_stages_is_a_no_op() {
        assert_eq!(run(&test_context(), Vec::new()), 0);
    }

    #[test]
    #[cfg(unix)]
    fn single_builtin_stage_with_redirection() {
        let dir = make_unique_temp_dir("single");
        let out = dir.join("out.txt");

        let stages = stages_for(&format!("echo hello world > {}", out.display()));
        assert_eq!(run(&test_context(), stages), 0);
        assert_eq!(fs::read_to_string(&out).unwrap(), "hello world\n");

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    #[cfg(unix)]
    fn builtin_output_flows_through_a_conduit_into_an_external() {
        let dir = make_unique_temp_dir("conduit");
        let out = dir.join("out.txt");

        let stages = stages_for(&format!("echo across the pipe | sh -c cat > {}", out.display()));
        assert_eq!(run(&test_context(), stages), 0);
        assert_eq!(fs::read_to_string(&out).unwrap(), "across the pipe\n");

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    #[cfg(unix)]
    fn external_output_flows_into_an_external() {
        let dir = make_unique_temp_dir("extext");
        let out = dir.join("out.txt");

        let line = format!(
            "sh -c 'printf one\\\\ntwo\\\\n' | sh -c 'wc -l' > {}",
            out.display()
        );
        let stages = stages_for(&line);
        assert_eq!(run(&test_context(), stages), 0);
        assert_eq!(fs::read_to_string(&out).unwrap().trim(), "2");

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    #[cfg(unix)]
    fn pipeline_status_is_the_last_stage_status() {
        let ctx = test_context();
        let stages = stages_for("sh -c 'exit 3'");
        assert_eq!(run(&ctx, stages), 3);

        let stages = stages_for("sh -c 'exit 3' | sh -c 'exit 5'");
        assert_eq!(run(&ctx, stages), 5);

        let stages = stages_for("sh -c 'exit 9' | sh -c 'exit 0'");
        assert_eq!(run(&ctx, stages), 0);
    }

    #[test]
    #[cfg(unix)]
    fn unknown_command_in_a_pipeline_does_not_abort_peers() {
        let dir = make_unique_temp_dir("peer");
        let out = dir.join("out.txt");

        let stages = stages_for(&format!(
            "definitely_missing_cmd | sh -c cat > {}",
            out.display()
        ));
        // The last stage sees immediate EOF and succeeds.
        assert_eq!(run(&test_context(), stages), 0);
        assert_eq!(fs::read_to_string(&out).unwrap(), "");

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    #[cfg(unix)]
    fn skipped_empty_stage_gives_downstream_eof() {
        let dir = make_unique_temp_dir("skip");
        let out = dir.join("out.txt");

        // "echo x |" parses into a real stage plus an empty one.
        let mut stages = stages_for("echo x |");
        assert_eq!(stages.len(), 2);
        assert!(stages[1].argv.is_empty());

        // Append a real consumer after the gap.
        stages.push(
            stages_for(&format!("sh -c cat > {}", out.display()))
                .pop()
                .unwrap(),
        );
        assert_eq!(run(&test_context(), stages), 0);
        assert_eq!(fs::read_to_string(&out).unwrap(), "");

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    #[cfg(unix)]
    fn redirect_open_failure_fails_the_stage_without_spawning() {
        let stages = stages_for("sh -c 'echo should not run' < /no/such/input/file");
        assert_eq!(run(&test_context(), stages), 1);
    }

    #[test]
    #[cfg(unix)]
    fn stderr_redirection_captures_child_diagnostics() {
        let dir = make_unique_temp_dir("errfile");
        let err = dir.join("err.txt");

        let stages = stages_for(&format!(
            "sh -c 'echo oops >&2; exit 4' 2> {}",
            err.display()
        ));
        assert_eq!(run(&test_context(), stages), 4);
        assert_eq!(fs::read_to_string(&err).unwrap(), "oops\n");

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    #[cfg(unix)]
    fn history_builtin_can_feed_a_conduit() {
        let dir = make_unique_temp_dir("histpipe");
        let out = dir.join("out.txt");

        let ctx = test_context();
        ctx.record_history("first");
        ctx.record_history("second");

        let stages = stages_for(&format!("history | sh -c 'wc -l' > {}", out.display()));
        assert_eq!(run(&ctx, stages), 0);
        assert_eq!(fs::read_to_string(&out).unwrap().trim(), "2");

        let _ = fs::remove_dir_all(dir);
    }
}
