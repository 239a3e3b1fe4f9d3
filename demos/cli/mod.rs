use std::env;
use std::path::Path;
use std::process;

use adrivefs::{Config, FileSystem};
use tracing_subscriber::{EnvFilter, fmt};

const DEFAULT_CONFIG: &str = "adrivefs.toml";

pub fn usage_and_exit(usage: &str) -> ! {
    eprintln!("{usage}");
    process::exit(1);
}

pub struct ArgParser {
    args: Vec<String>,
    usage: &'static str,
}

impl ArgParser {
    pub fn new(usage: &'static str) -> Self {
        let args: Vec<String> = env::args().skip(1).collect();

        if args.iter().any(|a| a == "--help" || a == "-h") {
            println!("{usage}");
            process::exit(0);
        }

        Self { args, usage }
    }

    pub fn take_value(&mut self, names: &[&str]) -> Option<String> {
        let i = self.args.iter().position(|a| names.contains(&a.as_str()))?;
        if i + 1 >= self.args.len() {
            usage_and_exit(self.usage);
        }
        let value = self.args.remove(i + 1);
        self.args.remove(i);
        Some(value)
    }

    pub fn remaining(self) -> Vec<String> {
        self.args
    }
}

pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("adrivefs=info"));
    fmt().with_env_filter(filter).with_target(false).init();
}

/// Load `--config` (or `./adrivefs.toml` when present) and sign in.
pub async fn connect(parser: &mut ArgParser) -> FileSystem {
    let path = parser.take_value(&["--config", "-c"]);
    let config = match path {
        Some(path) => Config::load(path),
        None if Path::new(DEFAULT_CONFIG).exists() => Config::load(DEFAULT_CONFIG),
        None => Ok(Config::default()),
    };
    let config = match config {
        Ok(config) => config.apply_env(),
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            process::exit(1);
        }
    };

    match FileSystem::connect(&config).await {
        Ok(fs) => fs,
        Err(e) => {
            eprintln!("Failed to connect: {}", e);
            process::exit(1);
        }
    }
}

#[allow(dead_code)] // Not every demo prints sizes.
pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1_048_576 {
        format!("{:.2} KB", bytes as f64 / 1024.0)
    } else if bytes < 1_073_741_824 {
        format!("{:.2} MB", bytes as f64 / 1_048_576.0)
    } else {
        format!("{:.2} GB", bytes as f64 / 1_073_741_824.0)
    }
}
