/// Customer name dump - print every FirstName row of the customer database
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueHint};
use emotion_cnn::customers::CustomerDirectory;

#[derive(Parser)]
#[command(author, version, about = "Print customer first names from a SQLite database")]
struct Cli {
    /// SQLite database file
    #[arg(long, default_value = "AdventureWorks-sqlite.db", value_hint = ValueHint::FilePath)]
    db: PathBuf,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let directory = CustomerDirectory::open(&cli.db)
        .with_context(|| format!("opening {:?}", cli.db))?;

    for name in directory.first_names()? {
        println!("{}", name.as_deref().unwrap_or("NULL"));
    }

    Ok(())
}
