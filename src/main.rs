#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::style)]

use clap::Parser;
use subconfuse::cli::{Args, Command};
use subconfuse::generator::{self, Generator};
use subconfuse::parser::ProtocolRegistry;
use tracing::Level;

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let is_verbose = args.verbose;
    tracing_subscriber::fmt()
        .with_max_level(if is_verbose {
            Level::TRACE
        } else {
            Level::INFO
        })
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(args).await {
        tracing::error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    match args.command {
        Command::Generate { profile, output } => {
            tracing::info!("Loading generator profile from: {}", profile);
            let generator = Generator::load(&profile).await?;
            generator.generate_to_file(output.as_deref()).await?;
            tracing::info!("Config generation complete!");
        }
        Command::Confuse {
            input,
            base64,
            retries,
        } => {
            let registry = ProtocolRegistry::with_builtin_parsers();
            let links = generator::confuse_source(&registry, &input, retries).await?;
            tracing::info!("Obfuscated {} link(s)", links.len());
            println!("{}", generator::encode_confused(&links, base64));
        }
        Command::Merge {
            target,
            output,
            retries,
            inputs,
        } => {
            let text = generator::merge_sources(target, &inputs, retries).await?;
            match output {
                Some(path) => generator::write_output(&path, &text).await?,
                None => print!("{}", text),
            }
        }
    }
    Ok(())
}
