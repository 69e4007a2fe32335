mod cli;
mod run;
mod still;
mod window;

use anyhow::Result;

fn main() -> Result<()> {
    let args = cli::parse();
    run::run(args)
}
