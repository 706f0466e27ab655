use std::io;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use anyhow::Result;
use clap::{Args, CommandFactory, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::EffectiveConfig;
use crate::core::{Termination, VersionScheme};
use crate::engine::{
    CancelToken, Orchestrator, Plan, ProgressEvent, RunEvent, RunHandle, RunOutcome,
};
use crate::oracle::RemoteOracle;
use crate::probe::SystemProbe;
use crate::ui::{RunProgress, UiConfig};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Parser)]
#[command(
    name = "rebel",
    version,
    about = "一時ファイルやキャッシュを掃除し、メモリ・ディスク・古いランタイム・グレーリスト対象アプリを診断する"
)]
pub struct Cli {
    #[arg(long, global = true)]
    pub json: bool,
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,
    #[arg(long, global = true)]
    pub verbose: bool,
    #[arg(long, global = true)]
    pub quiet: bool,
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    #[arg(long, default_value_t = 30, global = true)]
    pub timeout: u64,
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// 掃除と診断をすべて実行する
    Run,
    /// 診断のみを実行する（掃除はしない）
    Check,
    /// rebel 自身の新しいバージョンを確認する
    UpdateCheck,
    Completion(CompletionArgs),
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
pub struct CompletionArgs {
    pub shell: String,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[arg(long)]
    pub show: bool,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let stdout_is_tty = io::stdout().is_terminal();
    let stderr_is_tty = io::stderr().is_terminal();

    if cli.timeout == 0 {
        return Err(crate::exit::invalid_args(
            "--timeout は 1 以上を指定してください",
        ));
    }

    let home_dir = crate::platform::effective_home_dir()?;
    let cfg = crate::config::load(cli.config.as_deref(), &home_dir)
        .map_err(crate::exit::invalid_args_err)?;

    let ui_cfg = UiConfig {
        color: stdout_is_tty && cfg.ui.color && !cli.no_color,
        stderr_is_tty,
        max_table_rows: cfg.ui.max_table_rows,
        quiet: cli.quiet,
    };

    match &cli.command {
        Commands::Run => run_plan(Plan::full(), "run", &cli, &cfg, &ui_cfg, &home_dir)?,
        Commands::Check => {
            run_plan(Plan::diagnostics_only(), "check", &cli, &cfg, &ui_cfg, &home_dir)?
        }
        Commands::UpdateCheck => update_check(&cli, &cfg, &ui_cfg)?,
        Commands::Completion(args) => {
            let shell = parse_shell(&args.shell)?;
            let mut cmd = Cli::command();
            let mut out = std::io::stdout().lock();
            clap_complete::generate(shell, &mut cmd, "rebel", &mut out);
        }
        Commands::Config(args) => {
            if args.show {
                if cli.json {
                    write_json(&cfg)?;
                } else {
                    println!("{}", toml::to_string_pretty(&cfg)?);
                }
            } else if !ui_cfg.quiet {
                eprintln!("config: `rebel config --show` を使用してください");
            }
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool, quiet: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_log_level(verbose, quiet)));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .try_init()
        .ok();
}

fn default_log_level(verbose: bool, quiet: bool) -> &'static str {
    if quiet {
        "off"
    } else if verbose {
        "debug"
    } else {
        "warn"
    }
}

fn run_plan(
    plan: Plan,
    command: &str,
    cli: &Cli,
    cfg: &EffectiveConfig,
    ui_cfg: &UiConfig,
    home_dir: &Path,
) -> Result<()> {
    let probe = SystemProbe::detect(Duration::from_secs(cli.timeout), cli.dry_run)?;
    let oracle = crate::oracle::connect(&cfg.remote.base_url, cfg.remote_timeout());
    let orchestrator = Orchestrator::new(Arc::new(probe), oracle, cfg.thresholds());

    let interrupts = interrupt_channel();
    let progress = RunProgress::new(ui_cfg.stderr_is_tty && !cli.quiet && !cli.json);
    let handle = orchestrator.start(plan, CancelToken::new())?;
    let outcome = drive_run(handle, &interrupts, |ev| progress.update(ev));
    progress.finish();

    if cli.dry_run {
        tracing::info!("dry-run: ログは書き込みません");
    } else {
        match crate::logs::write_run_log(home_dir, command, &outcome) {
            Ok(path) => tracing::debug!(path = %path.display(), "run log written"),
            Err(err) => tracing::warn!(error = %err, "run log could not be written"),
        }
    }

    match outcome.termination() {
        Termination::Cancelled => Err(crate::exit::cancelled()),
        Termination::Failed => Err(crate::exit::run_failed(
            "実行が異常終了しました（結果は表示しません）",
        )),
        Termination::Completed => {
            if cli.json {
                write_json(&outcome.report)
            } else {
                crate::ui::print_report(
                    &outcome.report,
                    outcome.duration(),
                    ui_cfg,
                    &cfg.remote.articles_url,
                );
                Ok(())
            }
        }
    }
}

fn drive_run(
    handle: RunHandle,
    interrupts: &mpsc::Receiver<()>,
    mut on_progress: impl FnMut(&ProgressEvent),
) -> RunOutcome {
    loop {
        if interrupts.try_recv().is_ok() {
            handle.cancel();
        }
        match handle.recv_timeout(POLL_INTERVAL) {
            Ok(RunEvent::Progress(ev)) => on_progress(&ev),
            Ok(RunEvent::Finished(outcome)) => return handle.complete(outcome),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return handle.wait(|_| {}),
        }
    }
}

fn interrupt_channel() -> mpsc::Receiver<()> {
    let (tx, rx) = mpsc::channel();
    if let Err(err) = ctrlc::set_handler(move || {
        let _ = tx.send(());
    }) {
        tracing::warn!(error = %err, "Ctrl-C handler could not be installed");
    }
    rx
}

#[derive(Debug, Serialize)]
struct UpdateCheck<'a> {
    current: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    latest: Option<&'a str>,
    update_available: bool,
}

fn update_check(cli: &Cli, cfg: &EffectiveConfig, ui_cfg: &UiConfig) -> Result<()> {
    let own = env!("CARGO_PKG_VERSION");
    let oracle = crate::oracle::connect(&cfg.remote.base_url, cfg.remote_timeout());
    let latest = oracle.latest_version(crate::rules::SELF_PRODUCT);
    let latest_name = latest.as_ref().map(|r| r.name.as_str());
    let update_available = latest_name
        .and_then(|l| VersionScheme::Ordered.is_outdated(own, l))
        .unwrap_or(false);

    if cli.json {
        return write_json(&UpdateCheck {
            current: own,
            latest: latest_name,
            update_available,
        });
    }
    if let (true, Some(latest)) = (update_available, latest_name) {
        crate::ui::print_update_notice(own, latest, ui_cfg);
    }
    Ok(())
}

fn write_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    use std::io::Write;

    let buf = serde_json::to_vec_pretty(value)?;

    let mut stdout = std::io::stdout().lock();
    match stdout.write_all(&buf) {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::BrokenPipe => return Ok(()),
        Err(err) => return Err(err.into()),
    }
    match stdout.write_all(b"\n") {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn parse_shell(s: &str) -> Result<clap_complete::Shell> {
    let s = s.trim().to_ascii_lowercase();
    match s.as_str() {
        "bash" => Ok(clap_complete::Shell::Bash),
        "zsh" => Ok(clap_complete::Shell::Zsh),
        "fish" => Ok(clap_complete::Shell::Fish),
        "powershell" => Ok(clap_complete::Shell::PowerShell),
        other => Err(crate::exit::invalid_args(format!(
            "未対応のシェルです: {other}（bash|zsh|fish|powershell を指定してください）"
        ))),
    }
}
