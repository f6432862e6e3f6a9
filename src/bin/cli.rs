use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tabled::{Table, Tabled, settings::Style};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use modelseal::{AnchorCache, AnchorClient, ArtifactDigests, ArtifactStore, Config, LedgerConfig, RpcLedger};
use modelseal::{Facet, Mutation, Verdict, VerificationResult, Verifier, diff_artifacts, pretty_facet};
use modelseal::error::{LedgerError, ModelSealError};

#[derive(Parser)]
#[command(name = "modelseal")]
#[command(about = "Anchor model artifact digests on a ledger and detect tampering")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file (defaults to ./modelseal.yaml when present)
    #[arg(short, long, env = "MODELSEAL_CONFIG")]
    config: Option<PathBuf>,

    /// Artifact store directory
    #[arg(short, long, env = "MODELSEAL_STORE")]
    store: Option<PathBuf>,

    /// Ledger JSON-RPC endpoint (e.g. http://127.0.0.1:8545)
    #[arg(long, env = "MODELSEAL_LEDGER_URL")]
    ledger_url: Option<String>,

    /// ModelStorage contract address
    #[arg(long, env = "MODELSEAL_CONTRACT")]
    contract: Option<String>,

    /// Node address file written at provisioning time ({"eip_address": ...})
    #[arg(long, requires = "contract_info")]
    eip_info: Option<PathBuf>,

    /// Contract address file written at deploy time ({"contract_address": ...})
    #[arg(long, requires = "eip_info")]
    contract_info: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the ledger node answers
    Ping,

    /// Import a trainer's model_data.json into the store
    Import {
        #[arg(long)]
        id: u64,

        /// Path to model_data.json
        #[arg(short, long)]
        file: PathBuf,

        /// Also take a backup right after import
        #[arg(long)]
        backup: bool,
    },

    /// Print the facet digests of a stored artifact
    Digest {
        #[arg(long)]
        id: u64,
    },

    /// Anchor the digests of a stored artifact and read the anchor back
    Anchor {
        #[arg(long)]
        id: u64,

        /// Overall timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Verify a stored artifact against its anchor
    Verify {
        #[arg(long)]
        id: u64,

        /// Overall timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Output format: table, yaml, json
        #[arg(short, long, default_value = "table")]
        output: OutputFormat,
    },

    /// Copy the current artifact into its backup slot
    Backup {
        #[arg(long)]
        id: u64,
    },

    /// Copy the backup slot over the current artifact
    Restore {
        #[arg(long)]
        id: u64,
    },

    /// Deliberately modify a stored artifact
    Tamper {
        #[arg(long)]
        id: u64,

        /// Amount added to parameter values
        #[arg(long, default_value = "0.01", allow_negative_numbers = true)]
        delta: f64,

        /// Shift one scalar of this tensor instead of the whole first tensor
        #[arg(long, requires = "index")]
        tensor: Option<usize>,

        /// Flattened scalar index within --tensor
        #[arg(long, requires = "tensor")]
        index: Option<usize>,

        /// Set a metadata field instead (KEY=VALUE, VALUE parsed as JSON when possible)
        #[arg(long, conflicts_with_all = ["tensor", "index"])]
        set: Option<String>,
    },

    /// Show what changed between the backup and the current artifact
    Diff {
        #[arg(long)]
        id: u64,
    },

    /// Show a stored artifact, its digests and its last known anchor
    Show {
        #[arg(long)]
        id: u64,

        /// Print the canonical facets as well
        #[arg(long)]
        facets: bool,
    },

    /// List stored artifacts
    List,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Yaml,
    Json,
}

#[derive(Tabled)]
struct ArtifactRow {
    #[tabled(rename = "Id")]
    id: u64,
    #[tabled(rename = "Parameters")]
    parameters: String,
    #[tabled(rename = "Metadata")]
    metadata: String,
    #[tabled(rename = "Backup")]
    backup: String,
    #[tabled(rename = "Anchor")]
    anchor: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("modelseal=debug,info")
    } else {
        EnvFilter::new("modelseal=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            print_error(e);
            ExitCode::FAILURE
        }
    }
}

fn print_error(err: Box<dyn std::error::Error>) {
    if let Some(ModelSealError::Ledger(ledger_err)) = err.downcast_ref::<ModelSealError>() {
        print_ledger_error(ledger_err);
        return;
    }
    if let Some(ledger_err) = err.downcast_ref::<LedgerError>() {
        print_ledger_error(ledger_err);
        return;
    }

    eprintln!("\x1b[31m✗ Error:\x1b[0m {}", err);
}

fn print_ledger_error(err: &LedgerError) {
    eprintln!("\n\x1b[31m✗ Ledger Error [{}]\x1b[0m", err.error_code());
    eprintln!("  {}", err);
    eprintln!("\n\x1b[33mSuggestion:\x1b[0m");
    for line in err.suggestion().lines() {
        eprintln!("  {}", line);
    }
    eprintln!();
}

fn load_config(cli: &Cli) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = Config::load_or_default(cli.config.as_deref())?;

    if let (Some(eip_info), Some(contract_info)) = (&cli.eip_info, &cli.contract_info) {
        let deployed = LedgerConfig::from_deployment_files(eip_info, contract_info)?;
        config.ledger.host = deployed.host;
        config.ledger.url = None;
        config.ledger.contract_address = deployed.contract_address;
    }
    if let Some(url) = &cli.ledger_url {
        config.ledger.url = Some(url.clone());
    }
    if let Some(contract) = &cli.contract {
        config.ledger.contract_address = Some(contract.clone());
    }
    if let Some(dir) = &cli.store {
        config.store.dir = Some(dir.clone());
    }

    Ok(config)
}

fn anchor_client(config: &Config, store: &ArtifactStore) -> Result<AnchorClient, Box<dyn std::error::Error>> {
    let ledger = RpcLedger::new(&config.ledger)?;
    Ok(AnchorClient::new(Arc::new(ledger))
        .with_retry(config.retry.policy())
        .with_confirmation(config.ledger.confirmation_policy())
        .with_cache(AnchorCache::in_dir(store.root())))
}

async fn run(cli: Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let config = load_config(&cli)?;
    let store = ArtifactStore::open(config.store.resolve_dir())?;

    match cli.command {
        Commands::Ping => {
            cmd_ping(&config).await?;
        }

        Commands::Import { id, file, backup } => {
            cmd_import(&store, id, &file, backup)?;
        }

        Commands::Digest { id } => {
            cmd_digest(&store, id)?;
        }

        Commands::Anchor { id, timeout } => {
            let client = anchor_client(&config, &store)?;
            return cmd_anchor(&client, &store, id, timeout).await;
        }

        Commands::Verify { id, timeout, output } => {
            let client = anchor_client(&config, &store)?;
            return cmd_verify(&client, &store, id, timeout, output).await;
        }

        Commands::Backup { id } => {
            store.backup(id)?;
            println!("✓ Backed up artifact {} to {}", id, store.backup_path(id).display());
        }

        Commands::Restore { id } => {
            store.restore(id)?;
            println!("✓ Restored artifact {} from backup", id);
        }

        Commands::Tamper { id, delta, tensor, index, set } => {
            let mutation = match (set, tensor, index) {
                (Some(assignment), _, _) => parse_metadata_assignment(&assignment)?,
                (None, Some(tensor), Some(index)) => Mutation::ShiftParameter { tensor, index, delta },
                _ => Mutation::ShiftFirstTensor { delta },
            };
            cmd_tamper(&store, id, &mutation)?;
        }

        Commands::Diff { id } => {
            cmd_diff(&store, id)?;
        }

        Commands::Show { id, facets } => {
            cmd_show(&store, id, facets)?;
        }

        Commands::List => {
            cmd_list(&store)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

async fn cmd_ping(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let ledger = RpcLedger::for_node(&config.ledger)?;
    let client = AnchorClient::new(Arc::new(ledger)).with_retry(config.retry.policy());

    let status = client.ping().await?;
    println!("✓ Connected to {}", status.endpoint);
    println!("  Block number: {}", status.block_number);
    Ok(())
}

fn cmd_import(store: &ArtifactStore, id: u64, file: &Path, backup: bool) -> Result<(), Box<dyn std::error::Error>> {
    let artifact = store.import_model_data(id, file)?;
    let digests = ArtifactDigests::compute(&artifact)?;

    println!("✓ Imported artifact {} from {}", id, file.display());
    print_digests(&digests);

    if backup {
        store.backup(id)?;
        println!("✓ Backup written to {}", store.backup_path(id).display());
    }
    Ok(())
}

fn cmd_digest(store: &ArtifactStore, id: u64) -> Result<(), Box<dyn std::error::Error>> {
    let artifact = store.load(id)?;
    let digests = ArtifactDigests::compute(&artifact)?;
    print_digests(&digests);
    Ok(())
}

async fn cmd_anchor(
    client: &AnchorClient,
    store: &ArtifactStore,
    id: u64,
    timeout: Option<u64>,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let verifier = Verifier::new(client, store);
    let artifact = store.load(id)?;

    info!("Anchoring artifact {} on {}", id, client.endpoint());

    let (receipt, result) = match timeout {
        Some(secs) => {
            let limit = Duration::from_secs(secs);
            tokio::time::timeout(limit, verifier.anchor_and_confirm(&artifact))
                .await
                .map_err(|_| LedgerError::Timeout {
                    operation: format!("anchor artifact {id}"),
                    duration_ms: Some(limit.as_millis() as u64),
                })??
        }
        None => verifier.anchor_and_confirm(&artifact).await?,
    };

    if receipt.already_anchored {
        println!("✓ Artifact {} is already anchored with these digests", id);
    } else {
        println!("✓ Anchored artifact {}", id);
        if let Some(tx) = &receipt.transaction_id {
            println!("  Transaction: {}", tx);
        }
        if let Some(block) = receipt.block_number {
            println!("  Block:       {}", block);
        }
    }
    print_digests(&receipt.digests);

    println!("\nRead back from the ledger:");
    print_verification(&result);
    Ok(ExitCode::from(result.verdict.exit_code()))
}

async fn cmd_verify(
    client: &AnchorClient,
    store: &ArtifactStore,
    id: u64,
    timeout: Option<u64>,
    output: OutputFormat,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let verifier = Verifier::new(client, store);
    let artifact = store.load(id)?;

    let result = match timeout {
        Some(secs) => verifier.verify_with_timeout(&artifact, Duration::from_secs(secs)).await?,
        None => verifier.verify(&artifact).await?,
    };

    match output {
        OutputFormat::Yaml => {
            println!("{}", serde_yaml::to_string(&result)?);
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        OutputFormat::Table => print_verification(&result),
    }

    Ok(ExitCode::from(result.verdict.exit_code()))
}

fn print_verification(result: &VerificationResult) {
    println!("\nVerification of artifact {}\n", result.artifact_id);

    let mut table = Table::new(result.table_rows());
    table.with(Style::markdown());
    println!("{}", table);
    println!();

    match &result.verdict {
        Verdict::Verified => {
            println!("\x1b[32m{} Integrity verified\x1b[0m: local artifact matches its anchor", result.verdict.symbol());
        }
        Verdict::Mismatch { facets } => {
            let names: Vec<&str> = facets.iter().map(Facet::as_str).collect();
            println!(
                "\x1b[31m{} TAMPERING DETECTED\x1b[0m: {} differ from the anchored digests",
                result.verdict.symbol(),
                names.join(" and ")
            );
            println!("  Restore with: modelseal restore --id {}", result.artifact_id);
        }
        Verdict::NotAnchored => {
            println!("\x1b[33m{} Not anchored\x1b[0m: no digests recorded for artifact {}", result.verdict.symbol(), result.artifact_id);
            println!("  Anchor with: modelseal anchor --id {}", result.artifact_id);
        }
        Verdict::Unreachable { reason } => {
            println!("\x1b[33m{} Could not verify\x1b[0m: {}", result.verdict.symbol(), reason);
            println!("  The artifact was not compared; this is not evidence of tampering.");
        }
    }
}

fn cmd_tamper(store: &ArtifactStore, id: u64, mutation: &Mutation) -> Result<(), Box<dyn std::error::Error>> {
    if !store.has_backup(id) {
        warn!("Artifact {} has no backup; restore will not be possible", id);
    }

    let before = store.load(id)?;
    let after = store.tamper(id, mutation)?;

    println!("⚠ Tampered with {} of artifact {}", mutation.facet(), id);
    for (facet, diff) in diff_artifacts(&before, &after)? {
        println!("\n{}:", facet);
        println!("{}", diff);
    }
    Ok(())
}

fn cmd_diff(store: &ArtifactStore, id: u64) -> Result<(), Box<dyn std::error::Error>> {
    let backup = store.load_backup(id)?;
    let current = store.load(id)?;

    let diffs = diff_artifacts(&backup, &current)?;
    if diffs.is_empty() {
        println!("✓ Artifact {} matches its backup", id);
        return Ok(());
    }

    for (facet, diff) in diffs {
        println!("\n{} (backup → current):", facet);
        println!("{}", diff);
    }
    Ok(())
}

fn cmd_show(store: &ArtifactStore, id: u64, show_facets: bool) -> Result<(), Box<dyn std::error::Error>> {
    let artifact = store.load(id)?;
    let digests = ArtifactDigests::compute(&artifact)?;

    println!("Artifact: {}", id);
    println!("Path:     {}", store.artifact_path(id).display());
    println!("Backup:   {}", if store.has_backup(id) { "yes" } else { "no" });

    if let Ok(params) = artifact.parameters() {
        println!("Tensors:  {} ({} values)", params.tensors.len(), params.scalar_count());
    }
    println!();
    print_digests(&digests);

    let cache = AnchorCache::in_dir(store.root());
    match cache.get(id)? {
        Some(record) => {
            let current = record.parameters_hash == digests.parameters.to_hex()
                && record.metadata_hash == digests.metadata.to_hex();
            println!("\nLast anchor (local record):");
            println!("  Anchored at: {}", record.anchored_at.format("%Y-%m-%d %H:%M:%S UTC"));
            if let Some(tx) = &record.transaction_id {
                println!("  Transaction: {}", tx);
            }
            if let Some(block) = record.block_number {
                println!("  Block:       {}", block);
            }
            if !current {
                println!("  \x1b[33m⚠ Local digests differ from the recorded anchor\x1b[0m");
            }
        }
        None => println!("\nNo anchor recorded from this machine"),
    }

    if show_facets {
        for facet in Facet::ALL {
            println!("\n{}:", facet);
            println!("{}", pretty_facet(&artifact, facet)?);
        }
    }
    Ok(())
}

fn cmd_list(store: &ArtifactStore) -> Result<(), Box<dyn std::error::Error>> {
    let ids = store.list()?;
    if ids.is_empty() {
        println!("No artifacts in {}", store.root().display());
        return Ok(());
    }

    let cache = AnchorCache::in_dir(store.root());
    let mut rows = Vec::new();

    for id in ids {
        let (parameters, metadata) = match store.load(id).and_then(|a| ArtifactDigests::compute(&a)) {
            Ok(d) => (d.parameters.short(), d.metadata.short()),
            Err(e) => {
                warn!("Skipping digests of artifact {}: {}", id, e);
                ("-".to_string(), "-".to_string())
            }
        };
        let anchor = match cache.get(id)? {
            Some(record) => match record.block_number {
                Some(block) => format!("block {}", block),
                None => "anchored".to_string(),
            },
            None => "-".to_string(),
        };

        rows.push(ArtifactRow {
            id,
            parameters,
            metadata,
            backup: if store.has_backup(id) { "yes" } else { "no" }.to_string(),
            anchor,
        });
    }

    let mut table = Table::new(rows);
    table.with(Style::markdown());
    println!("{}", table);
    Ok(())
}

fn print_digests(digests: &ArtifactDigests) {
    println!("  parameters: {}", digests.parameters);
    println!("  metadata:   {}", digests.metadata);
}

fn parse_metadata_assignment(assignment: &str) -> Result<Mutation, Box<dyn std::error::Error>> {
    let (key, raw) = assignment
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", assignment))?;
    let value = serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));
    Ok(Mutation::SetMetadata {
        key: key.trim().to_string(),
        value,
    })
}
