use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use pdns_provider::{
    PowerDnsProvider, ProviderConfig, ProviderError, Record, RecordType,
    config::{DEFAULT_DIRTY_DEADLINE, DEFAULT_TTL, ZoneKind},
    powerdns::client::PowerDnsClient,
};
use tracing::{error, info};

/// Exit status for requests refused before anything was sent.
const EXIT_INVALID_INPUT: u8 = 2;

#[derive(Parser, Debug)]
#[command(author, version, about, rename_all = "kebab-case")]
struct Cli {
    /// PowerDNS API URL (e.g. http://127.0.0.1:8081/api/v1)
    #[arg(long, value_name = "URL")]
    endpoint: String,
    /// PowerDNS API key
    #[arg(long, value_name = "KEY")]
    api_key: String,
    /// PowerDNS server ID
    #[arg(long, value_name = "ID", default_value = "localhost")]
    server_id: String,
    /// Hosting nameserver FQDN (repeat for multiple values)
    #[arg(long = "nameserver", value_name = "FQDN")]
    nameservers: Vec<String>,
    /// SOA contact, `{domain}` is replaced by the zone (defaults to hostmaster@<zone>)
    #[arg(long, value_name = "CONTACT")]
    soa_contact: Option<String>,
    /// Zone kind used when creating zones (native, master, slave)
    #[arg(long, value_name = "KIND", default_value = "native")]
    zone_kind: ZoneKind,
    /// The server recurses, so apex CNAMEs may become ALIAS records
    #[arg(long)]
    recursion: bool,
    /// Seconds a written record may still be served from the packet cache
    #[arg(long, value_name = "SECS", default_value_t = DEFAULT_DIRTY_DEADLINE)]
    dirty_deadline: u64,
    /// TTL for records that do not specify one
    #[arg(long, value_name = "SECS", default_value_t = DEFAULT_TTL)]
    default_ttl: u32,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that the API key is accepted
    Verify,
    /// List all zones
    Zones,
    /// Create a zone with SOA and NS records
    ZoneAdd { zone: String },
    /// Delete a zone
    ZoneRemove { zone: String },
    /// Print a zone in master file format
    Export { zone: String },
    /// List the records of a zone
    Records { zone: String },
    /// Add a record
    Add(RecordArgs),
    /// Remove a record; without a parameter the whole rrset goes
    Remove(RecordArgs),
    /// Replace one record with another
    Update {
        #[command(flatten)]
        old: RecordArgs,
        /// New name (defaults to the old one)
        #[arg(long, value_name = "NAME")]
        new_name: Option<String>,
        /// New type (defaults to the old one)
        #[arg(long, value_name = "TYPE")]
        new_type: Option<String>,
        /// New parameter
        #[arg(long, value_name = "VALUE")]
        new_parameter: String,
        /// New TTL (defaults to the existing rrset's)
        #[arg(long, value_name = "SECS")]
        new_ttl: Option<u32>,
    },
    /// Check whether a record exists
    Exists(RecordArgs),
    /// Flush a domain from the packet cache
    Flush { domain: String },
}

#[derive(Args, Debug)]
struct RecordArgs {
    zone: String,
    /// Label relative to the zone, `@` for the apex
    name: String,
    #[arg(value_name = "TYPE")]
    rtype: String,
    #[arg(default_value = "")]
    parameter: String,
    #[arg(long, value_name = "SECS")]
    ttl: Option<u32>,
    /// Type-specific field (priority=10, weight=5, port=443, flags=0, tag=issue, data=...)
    #[arg(long = "meta", value_name = "KEY=VALUE")]
    meta: Vec<String>,
}

impl RecordArgs {
    fn to_record(&self) -> Result<Record> {
        let rtype: RecordType = self
            .rtype
            .parse()
            .with_context(|| format!("invalid record type '{}'", self.rtype))?;
        let mut record = Record::new(&self.zone, &self.name, rtype, &self.parameter);
        record.ttl = self.ttl;
        for pair in &self.meta {
            let Some((key, value)) = pair.split_once('=') else {
                bail!("metadata '{pair}' must be KEY=VALUE");
            };
            record = record.with_meta(key.trim(), value.trim());
        }
        Ok(record)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();
    match execute(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::from(exit_status(&err))
        }
    }
}

async fn execute(cli: Cli) -> Result<()> {
    let config = build_provider_config(&cli)?;
    let provider = PowerDnsProvider::connect(config).context("failed to build PowerDNS client")?;

    run(&provider, cli.command).await
}

fn exit_status(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<ProviderError>() {
        Some(e) if e.is_invalid_input() => EXIT_INVALID_INPUT,
        _ => 1,
    }
}

async fn run(provider: &PowerDnsProvider<PowerDnsClient>, command: Command) -> Result<()> {
    match command {
        Command::Verify => {
            provider.verify_key().await.context("PowerDNS key failed")?;
            println!("ok");
        }
        Command::Zones => {
            for zone in provider.list_zones().await.context("failed to list zones")? {
                println!("{zone}");
            }
        }
        Command::ZoneAdd { zone } => {
            provider
                .add_zone(&zone)
                .await
                .with_context(|| format!("failed to add zone '{zone}'"))?;
        }
        Command::ZoneRemove { zone } => {
            provider
                .remove_zone(&zone)
                .await
                .with_context(|| format!("failed to remove zone '{zone}'"))?;
        }
        Command::Export { zone } => {
            let text = provider
                .export_zone(&zone)
                .await
                .with_context(|| format!("failed to transfer zone '{zone}'"))?;
            print!("{text}");
        }
        Command::Records { zone } => {
            let records = provider
                .zone_records(&zone)
                .await
                .with_context(|| format!("failed to fetch zone '{zone}'"))?;
            for r in records {
                println!(
                    "{}\t{}\t{}\t{}",
                    r.name,
                    r.ttl.unwrap_or_default(),
                    r.rtype,
                    r.parameter
                );
            }
        }
        Command::Add(args) => {
            let record = args.to_record()?;
            provider
                .add_record(&record)
                .await
                .with_context(|| format!("failed to create record '{record}'"))?;
        }
        Command::Remove(args) => {
            let record = args.to_record()?;
            provider
                .remove_record(&record)
                .await
                .with_context(|| format!("failed to delete record '{record}'"))?;
        }
        Command::Update {
            old,
            new_name,
            new_type,
            new_parameter,
            new_ttl,
        } => {
            let old_record = old.to_record()?;
            let rtype = match new_type {
                Some(t) => t
                    .parse::<RecordType>()
                    .with_context(|| format!("invalid record type '{t}'"))?,
                None => old_record.rtype,
            };
            let mut new_record = Record::new(
                &old.zone,
                new_name.unwrap_or_else(|| old.name.clone()),
                rtype,
                new_parameter,
            );
            new_record.ttl = new_ttl;
            new_record.meta = old_record.meta.clone();
            provider
                .update_record(&old_record, &new_record)
                .await
                .with_context(|| {
                    format!("failed to update record '{old_record}' on zone '{}'", old.zone)
                })?;
        }
        Command::Exists(args) => {
            let record = args.to_record()?;
            let exists = provider
                .record_exists(&record.zone, &record.name, record.rtype, &record.parameter)
                .await
                .context("failed to look up record")?;
            println!("{exists}");
        }
        Command::Flush { domain } => {
            provider
                .flush(&domain)
                .await
                .with_context(|| format!("failed to flush '{domain}'"))?;
        }
    }
    Ok(())
}

fn build_provider_config(cli: &Cli) -> Result<ProviderConfig> {
    let nameservers = cli
        .nameservers
        .iter()
        .map(|ns| normalize_fqdn(ns).with_context(|| format!("invalid nameserver value '{ns}'")))
        .collect::<Result<Vec<_>>>()?;

    let mut config = ProviderConfig::new(cli.endpoint.trim_end_matches('/'), &cli.api_key);
    config.server_id = cli.server_id.clone();
    config.nameservers = nameservers;
    config.soa_contact = cli.soa_contact.clone();
    config.zone_kind = cli.zone_kind;
    config.recursion = cli.recursion;
    config.dirty_deadline = cli.dirty_deadline;
    config.default_ttl = cli.default_ttl;

    info!(
        endpoint = %config.endpoint,
        server_id = %config.server_id,
        kind = %config.zone_kind,
        "using PowerDNS"
    );
    Ok(config)
}

fn normalize_fqdn(input: &str) -> Result<String> {
    let trimmed = input.trim().trim_end_matches('.');
    if trimmed.is_empty() {
        bail!("FQDN cannot be empty");
    }
    Ok(format!("{}.", trimmed))
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}
