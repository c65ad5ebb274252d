//! Boost Guard Keygen - create guard keys and an encrypted keystore
//!
//! Usage:
//!   boost-guard-keygen --count 2 --out guards.json
//!   boost-guard-keygen --append --out guards.json
//!
//! An existing keystore is never replaced unless `--force` is given.
//!
//! Environment variables:
//!   GUARD_KEYSTORE_PASSPHRASE - passphrase sealing the keystore (required)
//!   GUARD_KEYSTORE - keystore file to append to / write (optional)

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use boost_guard::custody::{crypto::generate_keypair, guard_address, Keystore};

#[derive(Parser, Debug)]
#[command(name = "boost-guard-keygen")]
#[command(about = "Generate guard signing keys into an encrypted keystore")]
#[command(version)]
struct Args {
    /// Number of new guard keys to generate
    #[arg(long, default_value = "1")]
    count: usize,

    /// Keystore file to write; printed to stdout when omitted
    #[arg(long, env = "GUARD_KEYSTORE")]
    out: Option<PathBuf>,

    /// Keep the keys already in --out and add the new ones
    #[arg(long)]
    append: bool,

    /// Replace an existing keystore at --out, discarding its keys
    #[arg(long, conflicts_with = "append")]
    force: bool,

    /// Passphrase sealing the keystore
    #[arg(long, env = "GUARD_KEYSTORE_PASSPHRASE", hide_env_values = true)]
    passphrase: String,
}

/// What happens to the keystore at `--out`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteMode {
    Print,
    Create,
    Append,
    Overwrite,
}

fn write_mode(out: Option<&Path>, append: bool, force: bool) -> anyhow::Result<WriteMode> {
    Ok(match (out, append, force) {
        (None, true, _) => bail!("--append requires --out"),
        (None, false, _) => WriteMode::Print,
        (Some(_), true, true) => bail!("--append and --force cannot be combined"),
        (Some(path), true, false) if path.exists() => WriteMode::Append,
        (Some(_), false, true) => WriteMode::Overwrite,
        (Some(path), false, false) if path.exists() => bail!(
            "{} already exists; use --append to add keys or --force to replace it",
            path.display()
        ),
        (Some(_), _, false) => WriteMode::Create,
    })
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    if args.count == 0 {
        bail!("--count must be at least 1");
    }

    let mode = write_mode(args.out.as_deref(), args.append, args.force)?;
    let mut keys = match (&args.out, mode) {
        (Some(path), WriteMode::Append) => Keystore::load(path)?
            .open(&args.passphrase)
            .context("cannot open existing keystore")?,
        _ => Vec::new(),
    };
    let existing = keys.len();

    for _ in 0..args.count {
        let (signing_key, verifying_key) = generate_keypair();
        info!("Generated guard {}", guard_address(&verifying_key));
        keys.push(signing_key);
    }

    let keystore = Keystore::seal(&keys, &args.passphrase)?;
    match (&args.out, mode) {
        (Some(path), WriteMode::Create) => {
            keystore
                .create(path)
                .with_context(|| format!("cannot create {}", path.display()))?;
            info!("Wrote {} guard(s) to {}", keys.len(), path.display());
        }
        (Some(path), _) => {
            if mode == WriteMode::Overwrite {
                warn!("Replacing {}; its previous guard keys are discarded", path.display());
            }
            keystore.save(path)?;
            info!(
                "Wrote {} guard(s) ({} new) to {}",
                keys.len(),
                keys.len() - existing,
                path.display()
            );
        }
        (None, _) => println!("{}", serde_json::to_string_pretty(&keystore)?),
    }

    for guard in &keystore.guards {
        eprintln!("{guard}");
    }
    Ok(())
}
