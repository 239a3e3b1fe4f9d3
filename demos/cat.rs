//! Example: print a remote file, optionally from an offset
//!
//! Usage:
//!   cargo run --example cat -- [--config adrivefs.toml] [--offset N] REMOTE_PATH

mod cli;

use std::io::{SeekFrom, Write};

use adrivefs::OpenFlags;
use cli::{ArgParser, connect, init_tracing, usage_and_exit};

const USAGE: &str = "Usage: cargo run --example cat -- [--config FILE] [--offset N] REMOTE_PATH";

#[tokio::main]
async fn main() {
    init_tracing();
    let mut parser = ArgParser::new(USAGE);
    let offset = parser
        .take_value(&["--offset"])
        .map(|v| v.parse::<u64>().unwrap_or_else(|_| usage_and_exit(USAGE)));
    let fs = connect(&mut parser).await;

    let args = parser.remaining();
    if args.len() != 1 {
        usage_and_exit(USAGE);
    }
    let path = &args[0];

    let file = match fs.open(path, OpenFlags::READ).await {
        Ok(file) if !file.is_dir() => file,
        Ok(_) => {
            eprintln!("{} is a folder", path);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Failed to open {}: {}", path, e);
            std::process::exit(1);
        }
    };

    if let Some(offset) = offset {
        if let Err(e) = file.seek(SeekFrom::Start(offset)).await {
            eprintln!("Seek failed: {}", e);
            std::process::exit(1);
        }
    }

    let mut stdout = std::io::stdout().lock();
    let mut buf = vec![0u8; 256 * 1024];
    loop {
        match file.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                if stdout.write_all(&buf[..n]).is_err() {
                    break;
                }
            }
            Err(e) => {
                eprintln!("Read failed: {}", e);
                std::process::exit(1);
            }
        }
    }
    let _ = file.close().await;
    fs.shutdown().await;
}
