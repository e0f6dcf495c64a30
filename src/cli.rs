//! Command-line surface
//!
//! Connection fields come from `--params` (YAML or JSON), overridden by flags
//! and `ONTAP_*` environment variables. Module parameters follow the same
//! rule. Every run prints one JSON document: the module outcome, or
//! `{"failed": true, "msg": ..}`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::client::OntapRestApi;
use crate::config::{load_params, ConnectionConfig, JobPollConfig, UseRest};
use crate::diagnostics::DiagnosticLog;
use crate::dialect::{probe, Backend};
use crate::error::{Error, Result};
use crate::jobs::JobPoller;
use crate::modules::{
    AutosupportInvoke, AutosupportParams, AutosupportType, DrPair, InfoSubset,
    MetroClusterReconciler, MetroClusterSpec, ModuleOutcome, RestInfo, RestInfoParams,
};

pub const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_SHA"),
    ", built ",
    env!("BUILD_DATE"),
    ")"
);

/// Manage MetroCluster pairing and related tasks on NetApp ONTAP clusters
#[derive(Parser, Debug)]
#[command(name = "ontap-metrocluster")]
#[command(author, version = VERSION, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(flatten)]
    pub logging: LogArgs,

    /// YAML or JSON file with connection and module parameters
    #[arg(long, global = true, env = "ONTAP_PARAMS")]
    pub params: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Default)]
pub struct ConnectionArgs {
    /// Cluster management address
    #[arg(long, global = true, env = "ONTAP_HOSTNAME")]
    pub hostname: Option<String>,

    #[arg(long, global = true, env = "ONTAP_USERNAME")]
    pub username: Option<String>,

    #[arg(long, global = true, env = "ONTAP_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Use HTTPS instead of HTTP (`--https` alone means true)
    #[arg(long, global = true, num_args = 0..=1, default_missing_value = "true")]
    pub https: Option<bool>,

    /// Verify the cluster certificate (true/false)
    #[arg(long, global = true)]
    pub validate_certs: Option<bool>,

    #[arg(long, global = true)]
    pub http_port: Option<u16>,

    /// Always, Never or Auto
    #[arg(long, global = true, env = "ONTAP_USE_REST")]
    pub use_rest: Option<UseRest>,

    /// Client certificate (PEM)
    #[arg(long, global = true)]
    pub cert_filepath: Option<PathBuf>,

    /// Client private key (PEM)
    #[arg(long, global = true)]
    pub key_filepath: Option<PathBuf>,

    /// Per-request timeout in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Args, Debug, Default)]
pub struct LogArgs {
    /// Write the debug log here when the run ends
    #[arg(long, global = true)]
    pub debug_log: Option<PathBuf>,

    /// Write the error log here when the run ends
    #[arg(long, global = true)]
    pub error_log: Option<PathBuf>,

    /// Append to the log files instead of truncating them
    #[arg(long, global = true)]
    pub append_logs: bool,

    /// Format of the tracing output on stderr
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Detect which API dialect the cluster speaks
    Probe,

    /// Create the MetroCluster pairing unless it already matches
    Metrocluster(MetroClusterArgs),

    /// Gather aggregate, SVM and volume information
    RestInfo(RestInfoArgs),

    /// Send an AutoSupport message
    AutosupportInvoke(AutosupportArgs),
}

#[derive(Args, Debug, Default)]
pub struct MetroClusterArgs {
    /// Name of the partner cluster
    #[arg(long)]
    pub partner_cluster: Option<String>,

    /// Local node and its partner, as `node:partner` (repeatable)
    #[arg(long = "dr-pair", value_parser = parse_dr_pair)]
    pub dr_pairs: Vec<DrPair>,

    /// Report what would change without changing it
    #[arg(long)]
    pub check: bool,

    /// Seconds between job status checks
    #[arg(long)]
    pub poll_interval: Option<u64>,

    /// Job status checks before giving up
    #[arg(long)]
    pub max_attempts: Option<u32>,
}

#[derive(Args, Debug, Default)]
pub struct RestInfoArgs {
    /// Subsets to gather (repeatable); defaults to all
    #[arg(long = "gather-subset", value_parser = parse_subset)]
    pub gather_subset: Vec<InfoSubset>,

    #[arg(long)]
    pub max_records: Option<u32>,
}

#[derive(Args, Debug, Default)]
pub struct AutosupportArgs {
    /// Node to send the message from
    #[arg(long)]
    pub name: Option<String>,

    /// Subject line
    #[arg(long)]
    pub message: Option<String>,

    #[arg(long = "type", value_parser = parse_autosupport_type)]
    pub kind: Option<AutosupportType>,

    /// Alternate delivery destination
    #[arg(long)]
    pub uri: Option<String>,

    #[arg(long)]
    pub check: bool,
}

fn parse_dr_pair(raw: &str) -> std::result::Result<DrPair, String> {
    match raw.split_once(':') {
        Some((node, partner)) if !node.is_empty() && !partner.is_empty() => {
            Ok(DrPair::new(node, partner))
        }
        _ => Err(format!("expected node:partner, got '{raw}'")),
    }
}

fn parse_subset(raw: &str) -> std::result::Result<InfoSubset, String> {
    raw.parse().map_err(|e: Error| e.to_string())
}

fn parse_autosupport_type(raw: &str) -> std::result::Result<AutosupportType, String> {
    match raw {
        "test" => Ok(AutosupportType::Test),
        "performance" => Ok(AutosupportType::Performance),
        "all" => Ok(AutosupportType::All),
        other => Err(format!("expected test, performance or all, got '{other}'")),
    }
}

/// Module fields of a params file for the metrocluster command
#[derive(Debug, Default, Deserialize)]
struct MetroClusterParams {
    #[serde(default)]
    partner_cluster_name: Option<String>,
    #[serde(default)]
    dr_pairs: Vec<DrPair>,
}

fn module_params<T: DeserializeOwned + Default>(path: Option<&Path>) -> Result<T> {
    match path {
        Some(path) => load_params(path),
        None => Ok(T::default()),
    }
}

impl Cli {
    /// Connection settings from the params file with flag overrides applied
    pub fn connection_config(&self) -> Result<ConnectionConfig> {
        let args = &self.connection;
        let mut config = match &self.params {
            Some(path) => {
                let mut raw: Value = load_params(path)?;
                // flags may supply the hostname the file leaves out
                if let (Some(hostname), Some(map)) = (&args.hostname, raw.as_object_mut()) {
                    map.insert("hostname".to_string(), json!(hostname));
                }
                serde_json::from_value::<ConnectionConfig>(raw).map_err(|e| {
                    Error::ConfigError(format!("{}: {e}", path.display()))
                })?
            }
            None => {
                let hostname = args.hostname.clone().ok_or_else(|| {
                    Error::ConfigError(
                        "hostname is required (--hostname or ONTAP_HOSTNAME)".to_string(),
                    )
                })?;
                let mut config = ConnectionConfig::new(hostname, "", "");
                config.username = None;
                config.password = None;
                config
            }
        };

        if let Some(username) = &args.username {
            config.username = Some(username.clone());
        }
        if let Some(password) = &args.password {
            config.password = Some(password.clone());
        }
        if let Some(https) = args.https {
            config.https = https;
        }
        if let Some(validate_certs) = args.validate_certs {
            config.validate_certs = validate_certs;
        }
        if let Some(port) = args.http_port {
            config.http_port = Some(port);
        }
        if let Some(use_rest) = args.use_rest {
            config.use_rest = use_rest;
        }
        if let Some(cert) = &args.cert_filepath {
            config.cert_filepath = Some(cert.clone());
        }
        if let Some(key) = &args.key_filepath {
            config.key_filepath = Some(key.clone());
        }
        if let Some(timeout) = args.timeout {
            config.timeout_secs = timeout;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn metrocluster_spec(&self, args: &MetroClusterArgs) -> Result<MetroClusterSpec> {
        let file: MetroClusterParams = module_params(self.params.as_deref())?;
        let spec = MetroClusterSpec {
            partner_cluster_name: args
                .partner_cluster
                .clone()
                .or(file.partner_cluster_name)
                .unwrap_or_default(),
            dr_pairs: if args.dr_pairs.is_empty() {
                file.dr_pairs
            } else {
                args.dr_pairs.clone()
            },
        };
        spec.validate()?;
        Ok(spec)
    }

    pub fn rest_info_params(&self, args: &RestInfoArgs) -> Result<RestInfoParams> {
        let mut params: RestInfoParams = module_params(self.params.as_deref())?;
        if !args.gather_subset.is_empty() {
            params.gather_subset = args.gather_subset.clone();
        }
        if let Some(max_records) = args.max_records {
            params.max_records = max_records;
        }
        Ok(params)
    }

    pub fn autosupport_params(&self, args: &AutosupportArgs) -> Result<AutosupportParams> {
        let mut params: AutosupportParams = module_params(self.params.as_deref())?;
        if args.name.is_some() {
            params.name = args.name.clone();
        }
        if args.message.is_some() {
            params.message = args.message.clone();
        }
        if let Some(kind) = args.kind {
            params.kind = kind;
        }
        if args.uri.is_some() {
            params.uri = args.uri.clone();
        }
        Ok(params)
    }
}

fn job_poller(args: &MetroClusterArgs) -> Result<JobPoller> {
    let mut config = JobPollConfig::default();
    if let Some(secs) = args.poll_interval {
        config.interval = Duration::from_secs(secs);
    }
    if let Some(attempts) = args.max_attempts {
        config.max_attempts = attempts;
    }
    config.validate()?;
    Ok(JobPoller::new(config))
}

/// Connect, run the selected command and flush the diagnostic logs
pub async fn execute(cli: &Cli) -> Result<ModuleOutcome> {
    let config = cli.connection_config()?;
    info!(hostname = %config.hostname, use_rest = %config.use_rest, "Connecting to cluster");

    let api = OntapRestApi::from_config(&config)?;
    execute_with(cli, api, &config.hostname).await
}

/// Same as [`execute`] over an already built client.
///
/// The log files are written on every path past client construction,
/// including failed dialect detection.
pub async fn execute_with(
    cli: &Cli,
    mut api: OntapRestApi,
    hostname: &str,
) -> Result<ModuleOutcome> {
    let dialect = match probe(&mut api).await {
        Ok(dialect) => dialect,
        Err(e) => {
            flush_logs(api.diagnostics(), &cli.logging);
            return Err(e);
        }
    };

    let mut backend = Backend::commit(api, dialect, hostname);
    let outcome = run_command(cli, &mut backend).await;
    flush_logs(backend.diagnostics(), &cli.logging);
    outcome
}

async fn run_command(cli: &Cli, backend: &mut Backend) -> Result<ModuleOutcome> {
    match &cli.command {
        Command::Probe => {
            Ok(ModuleOutcome::unchanged().with("dialect", backend.dialect().to_string()))
        }
        Command::Metrocluster(args) => {
            let spec = cli.metrocluster_spec(args)?;
            MetroClusterReconciler::new(spec, job_poller(args)?)
                .with_check_mode(args.check)
                .reconcile(backend)
                .await
        }
        Command::RestInfo(args) => RestInfo::new(cli.rest_info_params(args)?).run(backend).await,
        Command::AutosupportInvoke(args) => {
            AutosupportInvoke::new(cli.autosupport_params(args)?)
                .with_check_mode(args.check)
                .run(backend)
                .await
        }
    }
}

fn flush_logs(log: &DiagnosticLog, logging: &LogArgs) {
    if let Err(e) = write_logs(log, logging) {
        warn!("Failed to write diagnostic logs: {}", e);
    }
}

fn write_logs(log: &DiagnosticLog, logging: &LogArgs) -> Result<()> {
    if let Some(path) = &logging.debug_log {
        log.write_debug_log_to_file(path, logging.append_logs)?;
    }
    if let Some(path) = &logging.error_log {
        log.write_errors_to_file(path, logging.append_logs)?;
    }
    Ok(())
}

/// Module-exit document for a failed run
pub fn failure_document(msg: &str) -> Value {
    json!({"failed": true, "msg": msg})
}
