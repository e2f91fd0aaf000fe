//! chatsplit CLI: turn saved chat conversations into linked Markdown notes.
//!
//! Reads an HTML or MHTML export of a conversation, splits it into one page
//! per question (or per requested group of questions), and writes the pages
//! with navigation links, keyword tags, and a header index.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli)
}
