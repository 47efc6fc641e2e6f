//! APPGRAPH CLI
//!
//! Validates application manifests, emits fingerprinted declarations and
//! verifies declarations before they are handed to an executor.

#![warn(missing_docs)]
#![warn(clippy::all)]

use appgraph_core::{Access, Capability, Fingerprint, KindSupport, ResourceKind};
use appgraph_plan::{
    verify, DeclarationBundle, Manifest, ManifestError, Method, RouteTable, ValidatedGraph,
    ValidationReport, ValidationWarning, Validator, VerifyError,
};
use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::Result;
use console::style;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "appgraph=info,appgraph_plan=info,appgraph_cli=info";

#[derive(Parser)]
#[command(name = "appgraph")]
#[command(about = "APPGRAPH - application graph assembly and declaration emitter", long_about = None)]
#[command(version)]
struct Cli {
    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,
    /// Forbid capabilities on a resource kind, e.g. `keyed-table:read`
    #[arg(long = "deny", value_name = "KIND:ACCESS", global = true)]
    deny: Vec<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per event
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a manifest and report every violation
    Validate {
        /// Path to manifest (.toml or .json)
        #[arg(short, long)]
        manifest: PathBuf,
    },
    /// Emit the fingerprinted declaration for a manifest
    Emit {
        /// Path to manifest (.toml or .json)
        #[arg(short, long)]
        manifest: PathBuf,
        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Indent the JSON
        #[arg(long)]
        pretty: bool,
    },
    /// Verify a declaration bundle
    Verify {
        /// Path to declaration bundle
        #[arg(short, long)]
        declaration: PathBuf,
    },
    /// List route bindings
    Routes {
        /// Path to manifest (.toml or .json)
        #[arg(short, long)]
        manifest: PathBuf,
    },
    /// Resolve a request to its compute unit
    Match {
        /// Path to manifest (.toml or .json)
        #[arg(short, long)]
        manifest: PathBuf,
        /// HTTP method
        method: String,
        /// Request path, e.g. /orders/42
        path: String,
    },
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(cli.log_format)?;

    let validator = Validator::new().with_support(support_from(&cli.deny)?);

    match cli.command {
        Commands::Validate { manifest } => {
            let validated = build(&manifest, &validator)?;
            print_warnings(validated.warnings());
            println!(
                "{} {} is valid",
                style("ok").green().bold(),
                manifest.display()
            );
            Ok(())
        }
        Commands::Emit {
            manifest,
            output,
            pretty,
        } => {
            let bundle = emit_bundle(&manifest, &validator)?;
            let json = if pretty {
                bundle.to_json_pretty()?
            } else {
                serde_json::to_string(&bundle)?
            };
            match output {
                Some(path) => {
                    std::fs::write(&path, json)
                        .wrap_err_with(|| format!("failed to write {}", path.display()))?;
                    info!(path = %path.display(), "wrote declaration");
                }
                None => println!("{}", json),
            }
            eprintln!("fingerprint: {}", style(bundle.fingerprint).cyan());
            Ok(())
        }
        Commands::Verify { declaration } => {
            let fingerprint = verify_file(&declaration, &validator)?;
            println!(
                "{} {} ({})",
                style("verified").green().bold(),
                declaration.display(),
                fingerprint.short()
            );
            Ok(())
        }
        Commands::Routes { manifest } => {
            let validated = build(&manifest, &validator)?;
            print!("{}", render_routes(validated.graph().routes()));
            Ok(())
        }
        Commands::Match {
            manifest,
            method,
            path,
        } => {
            let validated = build(&manifest, &validator)?;
            println!("{}", resolve(&validated, &method, &path)?);
            Ok(())
        }
    }
}

fn init_tracing(format: LogFormat) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(DEFAULT_LOG_FILTER))?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
    Ok(())
}

/// Build the capability matrix from `--deny kind:access` flags
fn support_from(deny: &[String]) -> Result<KindSupport> {
    let mut allowed: BTreeMap<ResourceKind, Vec<Capability>> = ResourceKind::ALL
        .iter()
        .map(|kind| (*kind, vec![Capability::Read, Capability::Write]))
        .collect();

    for rule in deny {
        let (kind, access) = rule
            .split_once(':')
            .ok_or_else(|| eyre!("invalid --deny '{}': expected KIND:ACCESS", rule))?;
        let kind: ResourceKind = kind.parse()?;
        let access: Access = access.parse()?;
        if let Some(caps) = allowed.get_mut(&kind) {
            caps.retain(|cap| !access.capabilities().contains(cap));
        }
        debug!(%kind, ?access, "denied capability");
    }

    Ok(allowed
        .into_iter()
        .fold(KindSupport::permissive(), |support, (kind, caps)| {
            support.with_kind(kind, &caps)
        }))
}

fn build(path: &Path, validator: &Validator) -> Result<ValidatedGraph> {
    let manifest = Manifest::from_path(path)?;
    match manifest.build(validator) {
        Ok(validated) => Ok(validated),
        Err(ManifestError::Invalid(report)) => {
            eprint!("{}", render_report(&report));
            Err(eyre!(
                "{} has {} violation(s)",
                path.display(),
                report.len()
            ))
        }
        Err(err) => Err(err.into()),
    }
}

fn emit_bundle(path: &Path, validator: &Validator) -> Result<DeclarationBundle> {
    let validated = build(path, validator)?;
    print_warnings(validated.warnings());
    Ok(validated.emit().seal()?)
}

fn verify_file(path: &Path, validator: &Validator) -> Result<Fingerprint> {
    let bytes =
        std::fs::read(path).wrap_err_with(|| format!("failed to read {}", path.display()))?;
    let bundle = DeclarationBundle::from_json(&bytes)?;
    match verify(&bundle, validator) {
        Ok(fingerprint) => Ok(fingerprint),
        Err(VerifyError::Invalid(report)) => {
            eprint!("{}", render_report(&report));
            Err(eyre!("{} describes an invalid graph", path.display()))
        }
        Err(err) => Err(err.into()),
    }
}

fn resolve(validated: &ValidatedGraph, method: &str, path: &str) -> Result<String> {
    let method: Method = method.parse()?;
    let found = validated
        .graph()
        .routes()
        .match_route(method, path)
        .ok_or_else(|| eyre!("no route matches {} {}", method, path))?;

    let mut line = format!("{} {} -> {}", found.method, path, found.unit);
    for (name, value) in &found.parameters {
        line.push_str(&format!(" {}={}", name, value));
    }
    Ok(line)
}

fn render_routes(routes: &RouteTable) -> String {
    routes
        .bindings()
        .iter()
        .map(|b| {
            let integration = if b.proxy { "proxy" } else { "direct" };
            format!("{:<7} {:<24} -> {} ({})\n", b.method.as_str(), b.path, b.unit, integration)
        })
        .collect()
}

fn render_report(report: &ValidationReport) -> String {
    let mut out = String::new();
    for err in report.errors() {
        out.push_str(&format!(
            "{} [{}] {}\n",
            style("error").red().bold(),
            err.code(),
            err
        ));
    }
    for warning in report.warnings() {
        out.push_str(&format!("{} {}\n", style("warning").yellow(), warning));
    }
    out
}

fn print_warnings(warnings: &[ValidationWarning]) {
    for warning in warnings {
        eprintln!("{} {}", style("warning").yellow(), warning);
    }
}
