use clap::{Parser, Subcommand};

use crate::client::Target;

#[derive(Parser)]
#[command(version, about = "Obfuscate proxy links, render them remotely and restore the result", long_about = None)]
pub struct Args {
    #[arg(short, long, global = true, help = "Emit debug log")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the full pipeline described by a generator profile
    Generate {
        #[arg(short, long, help = "Generator profile, accept file path or URL")]
        profile: String,

        #[arg(short, long, help = "Config output path, overrides the profile")]
        output: Option<String>,
    },

    /// Print the obfuscated form of every link in a link list
    Confuse {
        #[arg(short, long, help = "Link list, accept file path or URL")]
        input: String,

        #[arg(long, help = "Print a Base64 subscription body instead of one link per line")]
        base64: bool,

        #[arg(long, default_value_t = 3, help = "Fetch retries for remote input")]
        retries: u32,
    },

    /// Merge several rendered configs into one
    Merge {
        #[arg(short, long, value_enum, default_value_t = Target::Clash, help = "Config format")]
        target: Target,

        #[arg(short, long, help = "Output path, print to stdout if omitted")]
        output: Option<String>,

        #[arg(long, default_value_t = 3, help = "Fetch retries for remote inputs")]
        retries: u32,

        #[arg(required = true, num_args = 1.., help = "Configs to merge, accept file paths or URLs")]
        inputs: Vec<String>,
    },
}
