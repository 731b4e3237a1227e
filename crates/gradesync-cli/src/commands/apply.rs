use crate::cli::StatusColumnArg;
use crate::support::{
    exit_with_error, load_config_or_exit, load_roster_or_exit, print_roster_warnings,
    render_json_or_exit, yes_no,
};
use gradesync_core::{
    CancelToken, EngineConfig, EngineError, MismatchReport, PromptChannel, PromptError,
    PromptReply, PromptResponder, RecordFailure, RunOutcome, Session, SettleConfig, SourceRecord,
    StatusColumnMode, run_batch, validate_total_marks,
};
use gradesync_store::{
    FileTarget, ReportSink, RosterWarning, TargetMutationError, mutate_target_file,
};
use serde_json::json;
use signal_hook::consts::{SIGINT, SIGTERM};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::thread;

pub struct Args {
    pub roster: String,
    pub target: String,
    pub config: String,
    pub roster_id: Option<String>,
    pub total_marks: Option<String>,
    pub status_column: Option<StatusColumnArg>,
    pub settle_ms: Option<u64>,
    pub report_dir: Option<String>,
    pub prompt: bool,
    pub json: bool,
}

#[derive(Debug)]
enum WorkerError {
    Prompt(PromptError),
    PromptCancelled,
    Run(TargetMutationError<EngineError>),
}

impl std::fmt::Display for WorkerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Prompt(err) => write!(f, "{err}"),
            Self::PromptCancelled => write!(f, "cancelled at prompt; nothing was written"),
            Self::Run(err) => write!(f, "{err}"),
        }
    }
}

/// File config, then environment, then flags.
fn resolve_config(args: &Args) -> EngineConfig {
    let mut config = load_config_or_exit(&args.config);
    if let Some(roster_id) = &args.roster_id {
        config.roster_id = Some(roster_id.trim().to_string());
    }
    if let Some(total) = &args.total_marks {
        let total = validate_total_marks(total)
            .unwrap_or_else(|e| exit_with_error(format!("invalid --total-marks: {e}")));
        config.total_marks = Some(total);
    }
    if let Some(mode) = args.status_column {
        config.status_column = match mode {
            StatusColumnArg::Auto => StatusColumnMode::Auto,
            StatusColumnArg::On => StatusColumnMode::On,
            StatusColumnArg::Off => StatusColumnMode::Off,
        };
    }
    if let Some(ms) = args.settle_ms {
        config.settle = SettleConfig::uniform(ms);
    }
    config
}

fn report_dir_for(args: &Args) -> PathBuf {
    match &args.report_dir {
        Some(dir) => PathBuf::from(dir),
        None => Path::new(&args.target)
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    }
}

/// The first SIGINT or SIGTERM cancels after the in-flight record; a second
/// one exits immediately.
fn register_cancel_signals(cancel: &CancelToken) {
    for signal in [SIGINT, SIGTERM] {
        let registered = signal_hook::flag::register_conditional_shutdown(signal, 130, cancel.flag())
            .and_then(|_| signal_hook::flag::register(signal, cancel.flag()));
        if let Err(err) = registered {
            tracing::warn!(signal, "cancel signal not registered: {err}");
        }
    }
}

/// Engine work for the worker thread: resolve prompted values, then run one
/// lock-scoped batch against the target file.
fn run_worker(
    target: String,
    mut config: EngineConfig,
    records: Vec<SourceRecord>,
    has_status_column: bool,
    prompts: Option<PromptChannel>,
    cancel: CancelToken,
) -> Result<RunOutcome, WorkerError> {
    if let Some(channel) = prompts.as_ref().filter(|_| config.total_marks.is_none()) {
        let answer = channel
            .ask(
                "total_marks",
                "Total marks for this assessment (blank to cancel)",
                validate_total_marks,
            )
            .map_err(WorkerError::Prompt)?;
        match answer {
            Some(total) => config.total_marks = Some(total),
            None => return Err(WorkerError::PromptCancelled),
        }
    }
    drop(prompts);

    mutate_target_file(&target, |surface: &mut FileTarget| {
        let mut session = Session::new(surface, config).with_cancel_token(cancel);
        run_batch(&mut session, &records, has_status_column)
    })
    .map_err(WorkerError::Run)
}

/// Answer worker prompts from stdin until the worker drops its channel.
fn serve_prompts(responder: PromptResponder) {
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    while let Some(request) = responder.recv() {
        if let Some(previous) = &request.previous_error {
            eprintln!("invalid answer: {previous}");
        }
        eprint!("{} [attempt {}]: ", request.message, request.attempt);
        let _ = io::stderr().flush();

        let reply = match lines.next() {
            Some(Ok(line)) if !line.trim().is_empty() => PromptReply::Value(line.trim().to_string()),
            _ => PromptReply::Cancel,
        };
        if request.reply(reply).is_err() {
            break;
        }
    }
}

fn append_report_or_exit(sink: &ReportSink, report: &MismatchReport) -> PathBuf {
    sink.append(report)
        .unwrap_or_else(|e| exit_with_error(format!("failed to write mismatch report: {e}")))
}

fn print_summary(outcome: &RunOutcome, report_path: &Path) {
    let summary = &outcome.summary;
    println!("gradesync apply");
    println!();
    println!("  roster id: {}", summary.roster_id);
    println!("  status written: {}", yes_no(summary.status_written));
    if let Some(applied) = summary.total_marks_applied {
        println!("  total marks set: {}", yes_no(applied));
    }
    println!(
        "  matched: {}  updated: {}  failed: {}",
        summary.matched, summary.updated, summary.failed
    );
    println!(
        "  unmatched source: {}  unmatched target: {}",
        summary.unmatched_source, summary.unmatched_target
    );
    println!(
        "  grades verified: {}  statuses verified: {}",
        summary.grades_verified, summary.statuses_verified
    );
    println!(
        "  handle corrections: {}  guard failures: {}",
        summary.corrections, summary.guard_failures
    );
    println!("  contamination warnings: {}", summary.contamination_warnings);
    println!("  report: {}", report_path.display());
}

pub fn run(args: Args) {
    let config = resolve_config(&args);
    let loaded = load_roster_or_exit(&args.roster);
    if !args.json {
        print_roster_warnings(&loaded.warnings);
    }
    if !Path::new(&args.target).exists() {
        exit_with_error(format!("target file not found: {}", args.target));
    }
    let sink = ReportSink::new(report_dir_for(&args));

    let (prompts, responder) = if args.prompt {
        let (channel, responder) = PromptChannel::pair(config.prompt_max_attempts);
        (Some(channel), Some(responder))
    } else {
        (None, None)
    };

    let cancel = CancelToken::new();
    register_cancel_signals(&cancel);

    let target = args.target.clone();
    let worker_config = config.clone();
    let has_status_column = loaded.has_status_column;
    let records = loaded.records.clone();
    let worker_cancel = cancel.clone();
    let worker = thread::Builder::new()
        .name("gradesync-engine".to_string())
        .spawn(move || {
            run_worker(
                target,
                worker_config,
                records,
                has_status_column,
                prompts,
                worker_cancel,
            )
        })
        .unwrap_or_else(|e| exit_with_error(format!("failed to start engine thread: {e}")));

    if let Some(responder) = responder {
        serve_prompts(responder);
    }
    let result = worker
        .join()
        .unwrap_or_else(|_| exit_with_error("engine thread panicked"));

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(WorkerError::Run(TargetMutationError::Mutation(EngineError::EmptyPlan { report }))) => {
            let path = append_report_or_exit(&sink, &report);
            if args.json {
                print_empty_plan_json(&args, &loaded.warnings, &report, &path);
                std::process::exit(1);
            }
            eprintln!(
                "error: no roster row could be matched to the target ({} unmatched); report: {}",
                report.in_source_not_target.len(),
                path.display()
            );
            std::process::exit(1);
        }
        Err(err) => exit_with_error(err),
    };

    let report_path = append_report_or_exit(&sink, &outcome.report);
    for warning in &outcome.contamination {
        eprintln!(
            "warning: record {} ({}) outside the plan changed: {} {} -> {}",
            warning.target_id,
            warning.name,
            warning.kind.as_str(),
            warning.before,
            warning.after.as_deref().unwrap_or("<gone>")
        );
    }

    if args.json {
        let payload = json!({
            "schema": 1,
            "rosterPath": args.roster,
            "targetPath": args.target,
            "reportPath": report_path.display().to_string(),
            "rosterWarnings": loaded.warnings,
            "summary": outcome.summary,
            "outcomes": outcome.outcomes,
            "corrections": outcome.corrections,
            "contamination": outcome.contamination,
            "report": outcome.report,
        });
        println!("{}", render_json_or_exit(&payload, "apply"));
    } else {
        print_summary(&outcome, &report_path);
    }

    let skipped = outcome
        .outcomes
        .iter()
        .filter(|o| o.error == Some(RecordFailure::Cancelled))
        .count();
    if skipped > 0 {
        exit_with_error(format!(
            "run cancelled; {skipped} record(s) were not attempted"
        ));
    }
}

fn print_empty_plan_json(
    args: &Args,
    warnings: &[RosterWarning],
    report: &MismatchReport,
    report_path: &Path,
) {
    let payload = json!({
        "schema": 1,
        "error": "empty-plan",
        "message": "no roster row could be matched to the target",
        "rosterPath": args.roster,
        "targetPath": args.target,
        "reportPath": report_path.display().to_string(),
        "rosterWarnings": warnings,
        "report": report,
    });
    println!("{}", render_json_or_exit(&payload, "apply"));
}
