//! Example: upload a local file
//!
//! Usage:
//!   cargo run --example put -- [--config adrivefs.toml] LOCAL_FILE REMOTE_PATH

mod cli;

use std::io::Read;

use adrivefs::OpenFlags;
use cli::{ArgParser, connect, format_size, init_tracing, usage_and_exit};

const USAGE: &str = "Usage: cargo run --example put -- [--config FILE] LOCAL_FILE REMOTE_PATH";

#[tokio::main]
async fn main() {
    init_tracing();
    let mut parser = ArgParser::new(USAGE);
    let fs = connect(&mut parser).await;

    let args = parser.remaining();
    if args.len() != 2 {
        usage_and_exit(USAGE);
    }
    let (local, remote) = (&args[0], &args[1]);

    let mut input = match std::fs::File::open(local) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Failed to open {}: {}", local, e);
            std::process::exit(1);
        }
    };

    let file = match fs
        .open(remote, OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE)
        .await
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Failed to create {}: {}", remote, e);
            std::process::exit(1);
        }
    };

    let mut buf = vec![0u8; 1024 * 1024];
    let mut total = 0u64;
    loop {
        let n = match input.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                eprintln!("Read error: {}", e);
                std::process::exit(1);
            }
        };
        if let Err(e) = file.write_all(&buf[..n]).await {
            eprintln!("Upload failed: {}", e);
            std::process::exit(1);
        }
        total += n as u64;
    }

    match file.close().await {
        Ok(()) => println!("Uploaded {} to {}", format_size(total), remote),
        Err(e) => {
            eprintln!("Upload failed: {}", e);
            std::process::exit(1);
        }
    }

    fs.shutdown().await;
}
