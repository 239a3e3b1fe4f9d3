//! Example: list a folder
//!
//! Usage:
//!   cargo run --example ls -- [--config adrivefs.toml] [PATH]

mod cli;

use adrivefs::OpenFlags;
use cli::{ArgParser, connect, format_size, init_tracing, usage_and_exit};

const USAGE: &str = "Usage: cargo run --example ls -- [--config FILE] [PATH]";

#[tokio::main]
async fn main() {
    init_tracing();
    let mut parser = ArgParser::new(USAGE);
    let fs = connect(&mut parser).await;

    let args = parser.remaining();
    if args.len() > 1 {
        usage_and_exit(USAGE);
    }
    let path = args.first().map_or("/", String::as_str);

    let dir = match fs.open(path, OpenFlags::READ).await {
        Ok(dir) if dir.is_dir() => dir,
        Ok(_) => {
            eprintln!("Not a folder: {}", path);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Failed to open {}: {}", path, e);
            std::process::exit(1);
        }
    };

    match dir.readdir().await {
        Ok(entries) => {
            for entry in entries {
                let kind = if entry.is_dir { "d" } else { "-" };
                println!(
                    "{} {:>12}  {}  {}",
                    kind,
                    format_size(entry.size),
                    entry.modified.format("%Y-%m-%d %H:%M"),
                    entry.name
                );
            }
        }
        Err(e) => {
            eprintln!("Failed to list {}: {}", path, e);
            std::process::exit(1);
        }
    }

    fs.shutdown().await;
}
