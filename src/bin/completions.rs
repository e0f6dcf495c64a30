//! Generate shell completions for ontap-metrocluster
//!
//! ```bash
//! eval "$(ontap-completions bash)"
//! ontap-completions zsh > ~/.zsh/completions/_ontap-metrocluster
//! ```

use std::io;

use clap::{CommandFactory, Parser};
use clap_complete::{generate, Shell};
use ontap_metrocluster::cli::Cli;

/// Print a completion script for ontap-metrocluster
#[derive(Parser, Debug)]
#[command(name = "ontap-completions", version, about)]
struct Args {
    /// Target shell
    #[arg(value_enum)]
    shell: Shell,
}

fn main() {
    let args = Args::parse();
    let mut command = Cli::command();
    let name = command.get_name().to_string();
    generate(args.shell, &mut command, name, &mut io::stdout());
}
