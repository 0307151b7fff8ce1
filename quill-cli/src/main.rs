//! Quill CLI - stateful hash-based signatures from the command line.
//!
//! Private keys are stateful: `sign` advances the key file on disk before a
//! signature is written, so a crash can lose an index but never reuse one.

use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use clap::{ArgAction, Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use quill_xmss::{
    export_private_key, import_private_key, CachePolicy, HashType, MultiTreeSignature, Params,
    PrivateKey, ThreadMode, XmssMt,
};
use rand::rng;
use std::ffi::OsString;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use zeroize::{Zeroize, Zeroizing};

/// Stateful hash-based signature CLI tool
#[derive(Parser)]
#[command(name = "quill")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output (-v info, -vv debug; RUST_LOG overrides)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new key pair
    Keygen {
        #[command(flatten)]
        scheme: SchemeArgs,

        /// Output file prefix (creates `<prefix>.pub` and `<prefix>.key`)
        #[arg(short, long)]
        output: String,

        /// Public key output format
        #[arg(short, long, value_enum, default_value = "hex")]
        format: OutputFormat,
    },

    /// Sign a file, advancing the private key on disk first
    Sign {
        /// Path to the private key file
        #[arg(long = "key")]
        key: PathBuf,

        /// Input file to sign
        #[arg(short, long)]
        input: PathBuf,

        /// Output file for signature
        #[arg(short, long)]
        output: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "hex")]
        format: OutputFormat,

        #[command(flatten)]
        scheme: SchemeArgs,
    },

    /// Verify a signature; exits non-zero if it does not verify
    Verify {
        /// Path to the public key file
        #[arg(long = "pub")]
        pubkey: PathBuf,

        /// Input file that was signed
        #[arg(short, long)]
        input: PathBuf,

        /// Signature file
        #[arg(short, long)]
        signature: PathBuf,

        #[command(flatten)]
        scheme: SchemeArgs,
    },

    /// Write a private key as an armoured text backup
    Export {
        /// Path to the private key file
        #[arg(long = "key")]
        key: PathBuf,

        /// Output file for the text backup
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Restore a private key from an armoured text backup
    Import {
        /// Text backup to read
        #[arg(short, long)]
        input: PathBuf,

        /// Output private key file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Show key state, or supported parameters when no key is given
    Info {
        /// Path to the private key file
        #[arg(long = "key")]
        key: Option<PathBuf>,
    },

    /// Drop cached tree nodes no future signature needs
    Evict {
        /// Path to the private key file
        #[arg(long = "key")]
        key: PathBuf,

        #[command(flatten)]
        scheme: SchemeArgs,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Scheme parameters. Flags override the parameter file; for commands that
/// take a private key, the key's own header overrides both.
#[derive(Args, Clone, Debug, Default)]
struct SchemeArgs {
    /// JSON parameter file
    #[arg(long)]
    params: Option<PathBuf>,

    /// Total tree height
    #[arg(long)]
    height: Option<u32>,

    /// Number of layers
    #[arg(long)]
    layers: Option<u32>,

    /// Winternitz parameter (4, 16 or 256)
    #[arg(short = 'w', long)]
    winternitz: Option<u32>,

    /// Primary digest
    #[arg(long, value_enum)]
    hash: Option<HashArg>,

    /// Backup digest
    #[arg(long, value_enum)]
    backup_hash: Option<HashArg>,

    /// Nonces are drawn below 2^exponent
    #[arg(long)]
    nonce_exponent: Option<u32>,

    /// Worker threads for tree hashing
    #[arg(long, value_enum)]
    threads: Option<ThreadArg>,

    /// Node cache policy
    #[arg(long, value_enum)]
    cache: Option<CacheArg>,

    /// Levels below the root always cached by the auto policy
    #[arg(long)]
    cache_levels: Option<u32>,
}

impl SchemeArgs {
    /// Parameter file, then flags.
    fn resolve(&self) -> Result<Params> {
        let mut params = match &self.params {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read parameter file {}", path.display()))?;
                serde_json::from_str(&text).context("Invalid parameter file")?
            }
            None => Params::default(),
        };

        if let Some(height) = self.height {
            params.height = height;
        }
        if let Some(layers) = self.layers {
            params.layers = layers;
        }
        if let Some(w) = self.winternitz {
            params.winternitz = w;
        }
        if let Some(hash) = self.hash {
            params.hash = hash.into();
        }
        if let Some(backup) = self.backup_hash {
            params.backup_hash = Some(backup.into());
        }
        if let Some(exponent) = self.nonce_exponent {
            params.nonce_exponent = exponent;
        }
        if let Some(threads) = self.threads {
            params.threads = threads.into();
        }
        match (self.cache, self.cache_levels) {
            (Some(CacheArg::Full), _) => params.cache = CachePolicy::Full,
            (Some(CacheArg::Disabled), _) => params.cache = CachePolicy::Disabled,
            (Some(CacheArg::Auto), levels) => {
                params.cache = CachePolicy::Auto {
                    absolute_levels: levels.unwrap_or(4),
                }
            }
            (None, Some(levels)) => {
                params.cache = CachePolicy::Auto {
                    absolute_levels: levels,
                }
            }
            (None, None) => {}
        }

        params.validate().context("Invalid parameters")?;
        Ok(params)
    }

    /// Resolved parameters with the geometry and digests of `sk`.
    fn for_key(&self, sk: &PrivateKey) -> Result<Params> {
        let mut params = self.resolve()?;
        params.height = sk.height();
        params.layers = sk.layers();
        params.hash = sk.hash();
        params.backup_hash = sk.backup_hash();
        params.nonce_exponent = sk.nonce_exponent();
        params.validate().context("Private key header is invalid")?;
        Ok(params)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum HashArg {
    #[value(name = "sha2-256")]
    Sha2_256,
    #[value(name = "sha3-256")]
    Sha3_256,
    #[value(name = "shake256")]
    Shake256,
    #[value(name = "sha2-512")]
    Sha2_512,
}

impl From<HashArg> for HashType {
    fn from(arg: HashArg) -> Self {
        match arg {
            HashArg::Sha2_256 => HashType::Sha2_256,
            HashArg::Sha3_256 => HashType::Sha3_256,
            HashArg::Shake256 => HashType::Shake256,
            HashArg::Sha2_512 => HashType::Sha2_512,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ThreadArg {
    Single,
    Quarter,
    Half,
    ThreeQuarters,
    Full,
}

impl From<ThreadArg> for ThreadMode {
    fn from(arg: ThreadArg) -> Self {
        match arg {
            ThreadArg::Single => ThreadMode::Single,
            ThreadArg::Quarter => ThreadMode::Quarter,
            ThreadArg::Half => ThreadMode::Half,
            ThreadArg::ThreeQuarters => ThreadMode::ThreeQuarters,
            ThreadArg::Full => ThreadMode::Full,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum CacheArg {
    Auto,
    Full,
    Disabled,
}

/// Output format for public keys and signatures
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Hexadecimal encoding
    Hex,
    /// Base64 encoding
    Base64,
    /// PEM format
    Pem,
}

/// Encode bytes to the specified format
fn encode_output(data: &[u8], format: OutputFormat, label: &str) -> String {
    match format {
        OutputFormat::Hex => hex::encode(data),
        OutputFormat::Base64 => BASE64.encode(data),
        OutputFormat::Pem => {
            let b64 = BASE64.encode(data);
            let wrapped: Vec<&str> = b64
                .as_bytes()
                .chunks(64)
                .filter_map(|chunk| std::str::from_utf8(chunk).ok())
                .collect();
            format!(
                "-----BEGIN {}-----\n{}\n-----END {}-----",
                label,
                wrapped.join("\n"),
                label
            )
        }
    }
}

/// Check if a string is valid hexadecimal
fn is_hex(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// Decode bytes with auto-detection of format.
/// Detection order: PEM (by header) -> Hex (if all hex chars) -> Base64.
fn decode_input(data: &str) -> Result<Vec<u8>> {
    let data = data.trim();

    if data.starts_with("-----BEGIN") {
        let lines: Vec<&str> = data.lines().collect();
        if lines.len() < 3 {
            bail!("Invalid PEM format");
        }
        let b64: String = lines[1..lines.len() - 1].concat();
        return BASE64
            .decode(&b64)
            .context("Failed to decode PEM base64 content");
    }

    if is_hex(data) && data.len() % 2 == 0 {
        return hex::decode(data).context("Failed to decode hex");
    }

    BASE64.decode(data).context("Failed to decode base64")
}

fn read_private_key(path: &Path) -> Result<PrivateKey> {
    let mut text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read private key {}", path.display()))?;
    let decoded = hex::decode(text.trim());
    text.zeroize();
    let bytes = Zeroizing::new(decoded.context("Private key file is not hex")?);
    PrivateKey::from_bytes(&bytes).context("Invalid private key")
}

/// Replace the key file and flush it to disk before returning.
fn write_private_key(path: &Path, sk: &PrivateKey) -> Result<()> {
    let encoded = Zeroizing::new(hex::encode(&*sk.to_bytes()));
    let mut tmp = OsString::from(path.as_os_str());
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let mut file = fs::File::create(&tmp)
        .with_context(|| format!("Failed to create {}", tmp.display()))?;
    file.write_all(encoded.as_bytes())
        .context("Failed to write private key")?;
    file.sync_all().context("Failed to flush private key")?;
    fs::rename(&tmp, path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

/// Generate a key pair
fn cmd_keygen(scheme: &SchemeArgs, output: &str, format: OutputFormat) -> Result<()> {
    let params = scheme.resolve()?;
    info!(
        height = params.height,
        layers = params.layers,
        hash = %params.hash,
        winternitz = params.winternitz,
        "generating key pair"
    );

    let engine = XmssMt::new(params)?;
    let (sk, pk) = engine
        .generate_keys(&mut rng())
        .context("Key generation failed")?;

    let pub_path = format!("{output}.pub");
    let key_path = PathBuf::from(format!("{output}.key"));
    fs::write(&pub_path, encode_output(&pk.to_bytes(), format, "QUILL PUBLIC KEY"))
        .context("Failed to write public key")?;
    write_private_key(&key_path, &sk)?;

    println!("Public key written to: {pub_path}");
    println!("Private key written to: {}", key_path.display());
    println!("Signatures available: {}", sk.max_signatures());
    Ok(())
}

/// Reserve an index, persist the key, then sign
fn cmd_sign(
    key: &Path,
    input: &Path,
    output: &Path,
    format: OutputFormat,
    scheme: &SchemeArgs,
) -> Result<()> {
    let mut sk = read_private_key(key)?;
    let engine = XmssMt::new(scheme.for_key(&sk)?)?;
    engine.check_key(&sk)?;

    let message = fs::read(input).context("Failed to read input file")?;
    debug!(bytes = message.len(), "read message");

    let reservation = sk.reserve_next_index().context("Cannot sign")?;
    write_private_key(key, &sk).context("Failed to persist the advanced key; nothing was signed")?;
    let index = reservation.index();
    let signature = engine
        .sign_committed(&mut sk, reservation.commit(), &message)
        .context("Signing failed")?;

    // The Winternitz parameter is not part of the key header. Caches built
    // under a mismatched one must not reach disk.
    if !engine.verify(&signature, &message, &sk.public_key()) {
        bail!(
            "Signature at index {index} does not verify against the key's public root; \
             the index is spent. Check the --winternitz value used at keygen"
        );
    }

    // Same index, refreshed caches.
    write_private_key(key, &sk)?;

    let bytes = signature.to_bytes();
    fs::write(output, encode_output(&bytes, format, "QUILL SIGNATURE"))
        .context("Failed to write signature")?;

    info!(index, size = bytes.len(), remaining = sk.remaining(), "signed");
    println!("Signature written to: {}", output.display());
    Ok(())
}

/// Verify a signature
fn cmd_verify(pubkey: &Path, input: &Path, signature: &Path, scheme: &SchemeArgs) -> Result<()> {
    let params = scheme.resolve()?;
    let engine = XmssMt::new(params)?;

    let pk_bytes = decode_input(&fs::read_to_string(pubkey).context("Failed to read public key")?)?;
    let sig_bytes =
        decode_input(&fs::read_to_string(signature).context("Failed to read signature")?)?;
    let message = fs::read(input).context("Failed to read input file")?;

    if let Ok(parsed) = MultiTreeSignature::from_bytes(&sig_bytes, params.n(), params.tree_height()) {
        debug!(index = parsed.index, selector = ?parsed.selector, "parsed signature");
    }

    let valid = engine
        .verify_bytes(&sig_bytes, &message, &pk_bytes)
        .context("Malformed signature or public key")?;
    if !valid {
        bail!("Signature verification failed");
    }
    println!("Signature is valid.");
    Ok(())
}

fn cmd_export(key: &Path, output: &Path) -> Result<()> {
    let sk = read_private_key(key)?;
    let text = export_private_key(&sk);
    fs::write(output, text.as_bytes()).context("Failed to write text backup")?;
    println!("Backup written to: {}", output.display());
    Ok(())
}

fn cmd_import(input: &Path, output: &Path) -> Result<()> {
    let text = Zeroizing::new(fs::read_to_string(input).context("Failed to read text backup")?);
    let sk = import_private_key(&text).context("Invalid text backup")?;
    write_private_key(output, &sk)?;
    println!("Private key written to: {}", output.display());
    println!("Next index: {}", sk.index());
    Ok(())
}

fn cmd_info(key: Option<&Path>) -> Result<()> {
    let Some(key) = key else {
        println!("Quill - XMSS / XMSS^MT stateful hash-based signatures");
        println!();
        println!("Digests:");
        for hash in [
            HashType::Sha2_256,
            HashType::Sha3_256,
            HashType::Shake256,
            HashType::Sha2_512,
        ] {
            println!("    {:<10} n = {} bytes", hash.name(), hash.output_size());
        }
        println!();
        println!("Height 2-60, layers 1-12, height per layer 1-20");
        println!("Winternitz parameter 4, 16 or 256 (default 16)");
        println!("Cache policies: auto (default, 4 levels), full, disabled");
        return Ok(());
    };

    let sk = read_private_key(key)?;
    println!("Height:          {}", sk.height());
    println!("Layers:          {}", sk.layers());
    println!("Hash:            {}", sk.hash());
    match sk.backup_hash() {
        Some(backup) => println!("Backup hash:     {backup}"),
        None => println!("Backup hash:     none"),
    }
    println!("Next index:      {}", sk.index());
    println!("Remaining:       {} of {}", sk.remaining(), sk.max_signatures());
    println!("Root:            {}", hex::encode(sk.root()));
    println!("Cached trees:    {}", sk.cache().tree_count());
    for (&(layer, tree), cache) in sk.cache().iter() {
        println!("    layer {layer} tree {tree}: {} nodes", cache.len());
    }
    Ok(())
}

fn cmd_evict(key: &Path, scheme: &SchemeArgs) -> Result<()> {
    let mut sk = read_private_key(key)?;
    let engine = XmssMt::new(scheme.for_key(&sk)?)?;
    let evicted = engine.evict_auth_nodes(&mut sk);
    write_private_key(key, &sk)?;
    println!(
        "Evicted {evicted} nodes, {} remain cached",
        sk.cache().node_count()
    );
    Ok(())
}

/// Generate shell completions
fn cmd_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "quill", &mut io::stdout());
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Keygen {
            scheme,
            output,
            format,
        } => cmd_keygen(&scheme, &output, format),

        Commands::Sign {
            key,
            input,
            output,
            format,
            scheme,
        } => cmd_sign(&key, &input, &output, format, &scheme),

        Commands::Verify {
            pubkey,
            input,
            signature,
            scheme,
        } => cmd_verify(&pubkey, &input, &signature, &scheme),

        Commands::Export { key, output } => cmd_export(&key, &output),

        Commands::Import { input, output } => cmd_import(&input, &output),

        Commands::Info { key } => cmd_info(key.as_deref()),

        Commands::Evict { key, scheme } => cmd_evict(&key, &scheme),

        Commands::Completions { shell } => {
            cmd_completions(shell);
            Ok(())
        }
    }
}
