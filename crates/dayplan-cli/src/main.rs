use clap::Parser;

mod cli;
mod commands;

#[tokio::main]
async fn main() {
    let args = cli::GlobalCli::parse();
    if let Err(err) = commands::run(args).await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
