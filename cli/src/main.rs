mod commands;
mod terminal;

use commands::{CommandLine, generate};
use terminal::{logging, print};

fn main() -> anyhow::Result<()> {
    let commands = CommandLine::parse_args();

    logging::init_logging(commands.verbose);

    print::header("generating latency scripts");
    let report = generate::generate(&commands)?;
    generate::summary(&report);
    Ok(())
}
