use std::path::PathBuf;

use journal_read::{read_journal, InputOpts};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("journal.ledger"));
    let text = std::fs::read_to_string(&path)?;
    let journal = read_journal(&InputOpts::default(), &path, &text)?;
    println!("{:#?}", journal);
    Ok(())
}
