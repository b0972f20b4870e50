use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use dqm_fetch::app::{BatchReport, BatchRequest, Orchestrator, ProgressSink};
use dqm_fetch::config::{
    ARCHIVE_BASE_URL, CERT_DIR_ENV, CertificateChain, OMS_AUTH_ENV, OMS_BASE_URL, OMS_TOKEN_URL,
    OmsCredentialsLoader, TransportOptions, env_path,
};
use dqm_fetch::domain::{DasDatasetName, RunSet};
use dqm_fetch::era::EraResolver;
use dqm_fetch::error::DqmError;
use dqm_fetch::oms::OmsHttpClient;
use dqm_fetch::output::{JsonOutput, OutputMode, write_summary};
use dqm_fetch::progress::{LineProgress, TerminalProgress};
use dqm_fetch::resolver::{ArchiveLayout, LinkResolver, OfflineLinkResolver, OnlineLinkResolver};
use dqm_fetch::transport::{ArchiveTransport, CertAuthClient};

const DEFAULT_ONLINE_CLIENT: &str = "GEM";

#[derive(Parser)]
#[command(name = "dqm-fetch")]
#[command(about = "Download DQM ROOT files from the certificate-protected DQM GUI archive")]
#[command(version, author)]
struct Cli {
    /// Print the batch report as JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    #[arg(long, global = true)]
    non_interactive: bool,

    /// Directory holding usercert.pem and userkey.pem [env: CERN_CERTIFICATE_PATH]
    #[arg(long, global = true, value_name = "DIR")]
    cert_dir: Option<PathBuf>,

    /// Skip server certificate and hostname verification
    #[arg(long, global = true)]
    insecure_skip_verify: bool,

    #[arg(long, global = true, default_value = ARCHIVE_BASE_URL, value_name = "URL")]
    archive_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(visible_alias = "off", about = "Download offline (reprocessed) DQMIO files")]
    Offline(OfflineArgs),
    #[command(visible_alias = "on", about = "Download files written by online DQM clients")]
    Online(OnlineArgs),
}

#[derive(Args)]
struct BatchArgs {
    /// Runs or inclusive run ranges, e.g. 355100 355200-355300
    #[arg(short, long = "run", required = true, num_args = 1.., value_name = "RUN")]
    runs: Vec<String>,

    #[arg(short, long, default_value = ".", value_name = "DIR")]
    output_dir: Utf8PathBuf,
}

#[derive(Args)]
struct OfflineArgs {
    #[command(flatten)]
    batch: BatchArgs,

    /// Primary datasets like StreamExpress, Muon, or full DAS names
    #[arg(short, long = "dataset", required = true, num_args = 1.., value_name = "DATASET")]
    datasets: Vec<String>,

    /// OMS client credentials JSON [env: OMS_CLIENT_AUTH]
    #[arg(long, value_name = "FILE")]
    oms_auth: Option<PathBuf>,

    #[arg(long, default_value = OMS_BASE_URL, value_name = "URL")]
    oms_url: String,
}

#[derive(Args)]
struct OnlineArgs {
    #[command(flatten)]
    batch: BatchArgs,

    /// Online DQM clients
    #[arg(short, long = "dataset", num_args = 1.., default_value = DEFAULT_ONLINE_CLIENT, value_name = "CLIENT")]
    datasets: Vec<String>,
}

fn main() -> ExitCode {
    match run() {
        Ok(report) if report.is_success() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(3),
        Err(report) => {
            eprintln!("{report:?}");
            if let Some(error) = report.downcast_ref::<DqmError>() {
                return ExitCode::from(map_exit_code(error));
            }
            ExitCode::from(1)
        }
    }
}

fn map_exit_code(error: &DqmError) -> u8 {
    if error.is_configuration() { 2 } else { 1 }
}

fn run() -> miette::Result<BatchReport> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::WARN.into())
                .from_env_lossy(),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else if cli.non_interactive || !std::io::stderr().is_terminal() {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let (batch, datasets) = match &cli.command {
        Commands::Offline(args) => (&args.batch, &args.datasets),
        Commands::Online(args) => (&args.batch, &args.datasets),
    };
    RunSet::parse(&batch.runs)?;
    let request = BatchRequest {
        run_expressions: batch.runs.clone(),
        datasets: datasets.clone(),
        output_dir: batch.output_dir.clone(),
    };

    let chain = CertificateChain::resolve(cli.cert_dir.clone().or_else(|| env_path(CERT_DIR_ENV)))?;
    let options = TransportOptions {
        insecure_skip_verify: cli.insecure_skip_verify,
        ..TransportOptions::default()
    };
    let transport = CertAuthClient::new(&chain, &options)?;
    let layout = ArchiveLayout::new(&cli.archive_url)?;

    match &cli.command {
        Commands::Offline(args) => {
            let needs_eras = args
                .datasets
                .iter()
                .any(|dataset| !DasDatasetName::looks_like_das(dataset));
            let credentials = if needs_eras {
                let path = args.oms_auth.clone().or_else(|| env_path(OMS_AUTH_ENV));
                Some(OmsCredentialsLoader::resolve(path.as_deref())?)
            } else {
                None
            };
            let oms = OmsHttpClient::with_endpoints(credentials, &options, &args.oms_url, OMS_TOKEN_URL)?;
            let resolver = OfflineLinkResolver::new(&transport, layout, EraResolver::new(oms));
            execute(&transport, &resolver, &request, output_mode)
        }
        Commands::Online(_) => {
            let resolver = OnlineLinkResolver::new(&transport, layout);
            execute(&transport, &resolver, &request, output_mode)
        }
    }
}

fn execute(
    transport: &dyn ArchiveTransport,
    resolver: &dyn LinkResolver,
    request: &BatchRequest,
    output_mode: OutputMode,
) -> miette::Result<BatchReport> {
    let sink: Box<dyn ProgressSink> = match output_mode {
        OutputMode::Interactive => Box::new(TerminalProgress::new()),
        OutputMode::NonInteractive => Box::new(LineProgress::new(std::io::stderr())),
        OutputMode::Json => Box::new(JsonOutput),
    };
    let report = Orchestrator::new(transport).run(request, resolver, sink.as_ref())?;

    match output_mode {
        OutputMode::Json => JsonOutput::print_report(&report).into_diagnostic()?,
        OutputMode::Interactive | OutputMode::NonInteractive => {
            let mut stdout = std::io::stdout();
            let color = stdout.is_terminal();
            write_summary(&mut stdout, &report, color).into_diagnostic()?
        }
    }
    Ok(report)
}
