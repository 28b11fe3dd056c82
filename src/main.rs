use clap::Parser;

fn main() -> anyhow::Result<()> {
    gusto_lib::run(gusto_lib::cli::Cli::parse())
}
