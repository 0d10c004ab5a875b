//! Notary command line
//!
//! Keys, trusted identities and the local collaborator files all live under
//! the data directory (`NOTARY_DATA_DIR`, or `--data-dir`).

mod placement;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use notary_core::{
    decline_request, deliver_local, deliver_remote, ensure_identity, export_identity, now_ms,
    rotate_identity, sign_document, verify, FileKeyStore, FsBlobStore, FsMessenger, FsProfileStore,
    FsRequestRegistry, NotaryConfig, RequestRegistry, TrustRegistry,
};
use shared_crypto::{NotaryIdentity, RootAuthority, SigningIdentity};
use shared_types::SigningRequest;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "notary")]
#[command(version, about = "Sign PDFs page by page and verify them against their certificates")]
struct Args {
    /// Override NOTARY_DATA_DIR
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Provision (or show) the signing identity for a member
    Keygen {
        #[arg(long)]
        uid: String,
    },
    /// Retire the current key and start a new epoch
    Rotate {
        #[arg(long)]
        uid: String,
    },
    /// Print a shard that peers can import
    ExportIdentity {
        #[arg(long)]
        uid: String,
        /// Hex private key of a root authority to vouch for the shard
        #[arg(long)]
        root_key_file: Option<PathBuf>,
    },
    /// Generate a root authority key pair
    RootKeygen {
        /// Where to write the hex private key
        #[arg(long)]
        out: PathBuf,
    },
    /// Trust a peer's shard under their uid
    ImportIdentity { uid: String, shard: String },
    /// List trusted identities
    Trusted {
        #[arg(long)]
        json: bool,
    },
    /// Revoke a trusted identity
    Revoke {
        uid: String,
        /// Revocation time in ms since the epoch (default: now)
        #[arg(long)]
        at: Option<i64>,
    },
    /// Print the per-page hash manifest of a PDF
    Hash { pdf: PathBuf },
    /// Ask a member to sign a document
    Request {
        #[arg(long)]
        id: String,
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        document: String,
    },
    /// List pending signing requests for a member
    Requests {
        #[arg(long)]
        uid: String,
    },
    /// Decline a pending signing request
    Decline {
        id: String,
        #[arg(long)]
        uid: String,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Sign a PDF
    Sign {
        pdf: PathBuf,
        #[arg(long)]
        uid: String,
        /// Signer id bound into the signature (default: uid)
        #[arg(long)]
        signer: Option<String>,
        /// Text overlay, PAGE:X,Y,W,H:TEXT
        #[arg(long)]
        text: Vec<String>,
        /// Image overlay, PAGE:X,Y,W,H:PNG_PATH
        #[arg(long)]
        image: Vec<String>,
        #[arg(long, default_value = "12")]
        font_size: f64,
        /// Complete a pending signing request instead of writing files
        #[arg(long)]
        request: Option<String>,
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
    /// Verify a PDF against its certificate
    Verify {
        pdf: PathBuf,
        certificate: PathBuf,
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("notary_core=info".parse()?)
                .add_directive("notary_cli=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut config = NotaryConfig::from_env()?;
    if let Some(dir) = args.data_dir {
        config = config.with_data_dir(dir);
    }
    tracing::debug!(data_dir = %config.data_dir.display(), "Loaded configuration");

    run(args.command, &config)
}

fn run(command: Command, config: &NotaryConfig) -> Result<()> {
    let store = FileKeyStore::new(config.keystore_path());
    let profiles = FsProfileStore::new(config.profiles_path());
    let requests = FsRequestRegistry::new(config.requests_path());

    match command {
        Command::Keygen { uid } => {
            let identity = ensure_identity(&store, &profiles, &uid, now_ms())?;
            println!("uid:        {}", identity.uid());
            println!("epoch:      {}", identity.epoch());
            println!("public key: {}", identity.public_key());
        }
        Command::Rotate { uid } => {
            let identity = rotate_identity(&store, &profiles, &uid, now_ms())?;
            println!("uid:        {}", identity.uid());
            println!("epoch:      {}", identity.epoch());
            println!("public key: {}", identity.public_key());
        }
        Command::ExportIdentity { uid, root_key_file } => {
            let root = match root_key_file {
                Some(path) => {
                    let hex_key = std::fs::read_to_string(&path)
                        .with_context(|| format!("failed to read {}", path.display()))?;
                    let key = NotaryIdentity::from_private_key_hex(hex_key.trim())?;
                    Some(RootAuthority::new(key, &config.root_issuer))
                }
                None => None,
            };
            let shard = export_identity(&store, &uid, &config.root_issuer, root.as_ref())?;
            println!("{}", shard);
        }
        Command::RootKeygen { out } => {
            let key = NotaryIdentity::generate();
            std::fs::write(&out, key.export_private_key_hex())
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("NOTARY_ROOT_PUBLIC_KEY={}", key.public_key_base64()?);
        }
        Command::ImportIdentity { uid, shard } => {
            let registry = TrustRegistry::new(&store, config.trust_anchor()?);
            let entry = registry.import_identity(&uid, &shard, now_ms())?;
            println!("trusted {} ({})", entry.uid, entry.issuer);
        }
        Command::Trusted { json } => {
            let registry = TrustRegistry::new(&store, config.trust_anchor()?);
            let entries = registry.trusted_identities()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                for entry in entries {
                    let status = match entry.revoked_at_ms {
                        Some(at) => format!("revoked at {}", at),
                        None => "active".to_string(),
                    };
                    let epoch = entry.epoch.map_or("-".to_string(), |e| e.to_string());
                    println!(
                        "{}\t{}\tepoch {}\t{}\t{}",
                        entry.uid, entry.issuer, epoch, status, entry.public_key
                    );
                }
            }
        }
        Command::Revoke { uid, at } => {
            let registry = TrustRegistry::new(&store, config.trust_anchor()?);
            let entry = registry.revoke_identity(&uid, at.unwrap_or_else(now_ms))?;
            println!("revoked {} from {}", entry.uid, entry.revoked_at_ms.unwrap_or_default());
        }
        Command::Hash { pdf } => {
            let bytes = std::fs::read(&pdf)
                .with_context(|| format!("failed to read {}", pdf.display()))?;
            let manifest = shared_pdf::manifest_from_bytes(&bytes)?;
            for entry in manifest.entries() {
                println!("{}", entry);
            }
        }
        Command::Request {
            id,
            from,
            to,
            document,
        } => {
            if requests.get_request(&id)?.is_some() {
                bail!("request {} already exists", id);
            }
            requests.save_request(&SigningRequest::new(&id, &from, &to, &document))?;
            println!("requested {} from {}", document, to);
        }
        Command::Requests { uid } => {
            for request in requests.pending_for(&uid)? {
                println!("{}\t{}\t{}", request.id, request.requester_id, request.document_name);
            }
        }
        Command::Decline { id, uid, reason } => {
            let declined = decline_request(
                &id,
                &uid,
                reason.as_deref(),
                &requests,
                &FsMessenger::new(config.outbox_path()),
                now_ms(),
            )?;
            println!("declined {} from {}", declined.document_name, declined.requester_id);
        }
        Command::Sign {
            pdf,
            uid,
            signer,
            text,
            image,
            font_size,
            request,
            out_dir,
        } => {
            let bytes = std::fs::read(&pdf)
                .with_context(|| format!("failed to read {}", pdf.display()))?;

            let mut placements = Vec::new();
            for spec in &text {
                placements.push(placement::parse_text(spec, font_size)?);
            }
            for spec in &image {
                placements.push(placement::parse_image(spec)?);
            }

            let identity = ensure_identity(&store, &profiles, &uid, now_ms())?;
            let signer_id = signer.unwrap_or_else(|| uid.clone());
            let artifacts = sign_document(&bytes, &placements, &identity, &signer_id, now_ms())?;

            match request {
                Some(request_id) => {
                    let delivered = deliver_remote(
                        &artifacts,
                        &request_id,
                        &FsBlobStore::new(config.blobs_dir()),
                        &requests,
                        &FsMessenger::new(config.outbox_path()),
                        now_ms(),
                    )?;
                    println!("signed:      {}", delivered.signed_url.unwrap_or_default());
                    println!("certificate: {}", delivered.certificate_url.unwrap_or_default());
                }
                None => {
                    let name = pdf
                        .file_name()
                        .and_then(|n| n.to_str())
                        .unwrap_or("document.pdf");
                    let (signed, cert) = deliver_local(&artifacts, &out_dir, name)?;
                    println!("signed:      {}", signed.display());
                    println!("certificate: {}", cert.display());
                }
            }
        }
        Command::Verify {
            pdf,
            certificate,
            json,
        } => {
            let target = std::fs::read(&pdf)
                .with_context(|| format!("failed to read {}", pdf.display()))?;
            let cert = std::fs::read(&certificate)
                .with_context(|| format!("failed to read {}", certificate.display()))?;

            let registry = TrustRegistry::new(&store, config.trust_anchor()?);
            let report = verify(&target, &cert, &registry, None);

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("verdict:  {}", report.verdict());
                if let Some(signer) = &report.signer_id {
                    println!("signer:   {}", signer);
                }
                if let Some(source) = report.trust_source {
                    println!("trust:    {}", source);
                }
                let pages: Vec<&str> = report
                    .page_matches
                    .iter()
                    .map(|m| if *m { "ok" } else { "MODIFIED" })
                    .collect();
                if !pages.is_empty() {
                    println!("pages:    {}", pages.join(" "));
                }
                if let Some(reason) = &report.reason {
                    println!("reason:   {}", reason);
                }
            }

            if !report.is_valid {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
