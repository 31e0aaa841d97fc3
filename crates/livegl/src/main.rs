mod cli;
mod run;
mod scenes;

use anyhow::Result;
use cli::Command;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();

    match cli.command {
        Command::Scenes => run::list_scenes(),
        Command::Compile(args) => run::compile(args),
        Command::Replay(args) => run::replay(args),
    }
}
