//! Open an interactive shell on a VM.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example shell -- --vm abc123 --key ~/.vers/keys/abc123
//! ```
//!
//! The local terminal is switched to raw mode for the session, so Ctrl-C and
//! friends go to the remote shell. Exit the shell to return.

use std::env;
use std::path::PathBuf;

use tokio_util::sync::CancellationToken;
use vers_ssh::{Client, RawModeGuard};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let client = Client::new(&args.vm, &args.key);
    let cancel = CancellationToken::new();

    println!("Connecting to {}...", client.hostname());

    let result = {
        let _raw = RawModeGuard::enable()?;
        client
            .interactive(
                &cancel,
                tokio::io::stdin(),
                &mut tokio::io::stdout(),
                &mut tokio::io::stderr(),
            )
            .await
    };

    match result {
        Ok(()) => Ok(()),
        Err(e) => match e.exit_code() {
            Some(code) => std::process::exit(code as i32),
            None => Err(e.into()),
        },
    }
}

/// Simple argument parser (avoiding external dependencies)
struct Args {
    vm: String,
    key: PathBuf,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = env::args().collect();
        let mut vm = None;
        let mut key = None;

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--vm" | "-v" => {
                    i += 1;
                    if i < args.len() {
                        vm = Some(args[i].clone());
                    }
                }
                "--key" | "-k" => {
                    i += 1;
                    if i < args.len() {
                        key = Some(PathBuf::from(&args[i]));
                    }
                }
                "--help" => {
                    Self::print_help();
                    std::process::exit(0);
                }
                _ => {
                    eprintln!("Unknown argument: {}", args[i]);
                }
            }
            i += 1;
        }

        let (Some(vm), Some(key)) = (vm, key) else {
            Self::print_help();
            std::process::exit(2);
        };
        Self { vm, key }
    }

    fn print_help() {
        println!(
            r#"vers-ssh shell example

USAGE:
    cargo run --example shell -- --vm <ID> --key <PATH>

OPTIONS:
    -v, --vm <ID>            VM id
    -k, --key <PATH>         Path to the VM's private key
    --help                   Print this help message
"#
        );
    }
}
