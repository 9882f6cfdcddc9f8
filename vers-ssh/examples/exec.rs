//! Run one command on a VM and stream its output.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example exec -- --vm abc123 --key ~/.vers/keys/abc123 -- uname -a
//! ```
//!
//! Ctrl-C cancels the command locally. The process exits with the remote
//! command's exit status.

use std::env;
use std::path::PathBuf;

use tokio_util::sync::CancellationToken;
use vers_ssh::ClientBuilder;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging (set RUST_LOG=debug for verbose output)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let mut builder = ClientBuilder::new(&args.vm, &args.key);
    if let Some(domain) = &args.domain {
        builder = builder.domain(domain);
    }
    let client = builder.build();

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    // Commands are sent as one string; quote arguments yourself.
    let command = args.command.join(" ");
    log::info!("running '{}' on {}", command, client.hostname());

    let mut stdout = tokio::io::stdout();
    let mut stderr = tokio::io::stderr();
    match client.execute(&cancel, &command, &mut stdout, &mut stderr).await {
        Ok(()) => Ok(()),
        Err(e) => {
            if let Some(code) = e.exit_code() {
                std::process::exit(code as i32);
            }
            if e.is_cancelled() {
                eprintln!("interrupted");
                std::process::exit(130);
            }
            Err(e.into())
        }
    }
}

/// Simple argument parser (avoiding external dependencies)
struct Args {
    vm: String,
    key: PathBuf,
    domain: Option<String>,
    command: Vec<String>,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = env::args().collect();
        let mut vm = None;
        let mut key = None;
        let mut domain = None;
        let mut command = Vec::new();

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
                "--domain" => {
                    i += 1;
                    if i < args.len() {
                        domain = Some(args[i].clone());
                    }
                }
                "--help" => {
                    Self::print_help();
                    std::process::exit(0);
                }
                "--" => {
                    command.extend(args[i + 1..].iter().cloned());
                    break;
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
        if command.is_empty() {
            eprintln!("Error: no command given after --");
            std::process::exit(2);
        }

        Self {
            vm,
            key,
            domain,
            command,
        }
    }

    fn print_help() {
        println!(
            r#"vers-ssh exec example

USAGE:
    cargo run --example exec -- --vm <ID> --key <PATH> [OPTIONS] -- <COMMAND>...

OPTIONS:
    -v, --vm <ID>            VM id
    -k, --key <PATH>         Path to the VM's private key
    --domain <DOMAIN>        Hostname domain [default: vm.vers.sh]
    --help                   Print this help message

EXAMPLES:
    cargo run --example exec -- --vm abc123 --key ~/.vers/keys/abc123 -- ls -la /root
"#
        );
    }
}
