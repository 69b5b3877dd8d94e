use anyhow::Result;
use argh::FromArgs;
use shoal::Shell;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(FromArgs)]
/// An interactive POSIX-style shell with pipelines, redirections and
/// tab completion.
struct Args {
    /// history file to load on startup and save on exit (overrides HISTFILE)
    #[argh(option)]
    histfile: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Args = argh::from_env();
    Shell::new(args.histfile).run()
}
