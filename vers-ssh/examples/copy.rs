//! Copy files to or from a VM over SFTP.
//!
//! # Usage
//!
//! ```bash
//! # Upload a directory tree
//! cargo run --example copy -- --vm abc123 --key ~/.vers/keys/abc123 -r ./dist :/srv/app
//!
//! # Download a single file
//! cargo run --example copy -- --vm abc123 --key ~/.vers/keys/abc123 :/var/log/app.log ./app.log
//! ```
//!
//! The side prefixed with `:` is the remote path.

use std::env;
use std::path::PathBuf;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use vers_ssh::Client;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let client = Client::new(&args.vm, &args.key);
    let cancel = CancellationToken::new();
    let start = Instant::now();

    match (args.source.strip_prefix(':'), args.dest.strip_prefix(':')) {
        (None, Some(remote)) => {
            println!("Uploading {} -> {}:{}", args.source, args.vm, remote);
            client
                .upload(&cancel, &args.source, remote, args.recursive)
                .await?;
        }
        (Some(remote), None) => {
            println!("Downloading {}:{} -> {}", args.vm, remote, args.dest);
            client
                .download(&cancel, remote, &args.dest, args.recursive)
                .await?;
        }
        _ => {
            eprintln!("Error: exactly one of SOURCE and DEST must start with ':'");
            std::process::exit(2);
        }
    }

    println!("Done in {:?}", start.elapsed());
    Ok(())
}

/// Simple argument parser (avoiding external dependencies)
struct Args {
    vm: String,
    key: PathBuf,
    recursive: bool,
    source: String,
    dest: String,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = env::args().collect();
        let mut vm = None;
        let mut key = None;
        let mut recursive = false;
        let mut paths = Vec::new();

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
                "--recursive" | "-r" => recursive = true,
                "--help" => {
                    Self::print_help();
                    std::process::exit(0);
                }
                other => paths.push(other.to_string()),
            }
            i += 1;
        }

        let (Some(vm), Some(key), [source, dest]) = (vm, key, paths.as_slice()) else {
            Self::print_help();
            std::process::exit(2);
        };
        Self {
            vm,
            key,
            recursive,
            source: source.clone(),
            dest: dest.clone(),
        }
    }

    fn print_help() {
        println!(
            r#"vers-ssh copy example

USAGE:
    cargo run --example copy -- --vm <ID> --key <PATH> [-r] <SOURCE> <DEST>

OPTIONS:
    -v, --vm <ID>            VM id
    -k, --key <PATH>         Path to the VM's private key
    -r, --recursive          Copy directories
    --help                   Print this help message

One of SOURCE or DEST must be a remote path written as :/path.
"#
        );
    }
}
