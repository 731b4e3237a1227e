use serde_json::Value;
use std::ffi::OsStr;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

struct TempDirGuard {
    path: PathBuf,
}

impl TempDirGuard {
    fn new(prefix: &str) -> Self {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock should be after unix epoch")
            .as_nanos();
        let path = std::env::temp_dir().join(format!(
            "gradesync-cli-{prefix}-{}-{unique}",
            std::process::id()
        ));
        fs::create_dir_all(&path).expect("temp dir should be created");
        Self { path }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempDirGuard {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

fn gradesync_command() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_gradesync"));
    command
        .env("GRADESYNC_SETTLE_MS", "0")
        .env_remove("GRADESYNC_TOTAL_MARKS")
        .env_remove("GRADESYNC_STATUS_COLUMN")
        .env_remove("GRADESYNC_ROSTER_ID")
        .env_remove("GRADESYNC_LOG");
    command
}

fn run_gradesync<I, S>(args: I) -> Output
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    gradesync_command()
        .args(args)
        .output()
        .expect("gradesync command should execute")
}

fn run_gradesync_with_stdin<I, S>(args: I, stdin: &str) -> Output
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut child = gradesync_command()
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("gradesync command should spawn");
    child
        .stdin
        .take()
        .expect("stdin should be piped")
        .write_all(stdin.as_bytes())
        .expect("stdin should accept input");
    child
        .wait_with_output()
        .expect("gradesync command should finish")
}

fn assert_success(output: &Output) {
    if !output.status.success() {
        panic!(
            "command failed with status {:?}\nstdout:\n{}\nstderr:\n{}",
            output.status.code(),
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr),
        );
    }
}

fn assert_failure(output: &Output) {
    if output.status.success() {
        panic!(
            "command unexpectedly succeeded\nstdout:\n{}\nstderr:\n{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr),
        );
    }
}

fn stdout_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn parse_json_stdout(output: &Output) -> Value {
    serde_json::from_slice::<Value>(&output.stdout).unwrap_or_else(|e| {
        panic!(
            "stdout should be valid json: {e}\nstdout:\n{}",
            String::from_utf8_lossy(&output.stdout)
        )
    })
}

fn write_fixture(root: &Path) -> (PathBuf, PathBuf) {
    let roster = root.join("roster.jsonl");
    let target = root.join("target.json");
    fs::write(
        &roster,
        concat!(
            "{\"Sl #\": 1, \"ID #\": \"20101001\", \"Name\": \"Ada\", \"Total\": 17.5, \"Status\": \"absent\"}\n",
            "{\"Sl #\": 2, \"ID #\": \"20101002\", \"Name\": \"Bea\", \"Total\": 12}\n",
            "not json\n",
            "{\"Sl #\": 3, \"ID #\": \"20101404\", \"Name\": \"Ned\", \"Total\": 9}\n",
        ),
    )
    .expect("roster should write");
    fs::write(
        &target,
        r#"{
  "totalMarks": "",
  "rows": [
    { "student": "20101002-Bea", "marks": "", "status": "Present" },
    { "student": "20101001-Ada", "marks": "", "status": "Present" },
    { "student": "20109999-Zed", "marks": "", "status": "Present" }
  ]
}
"#,
    )
    .expect("target should write");
    (roster, target)
}

#[test]
fn init_writes_default_config_once() {
    let tmp = TempDirGuard::new("init");
    let root = tmp.path().join("course");

    let output = run_gradesync([OsStr::new("init"), root.as_os_str()]);
    assert_success(&output);
    assert!(stdout_text(&output).contains("wrote config: yes"));
    assert!(root.join("gradesync.toml").is_file());

    let output = run_gradesync([OsStr::new("init"), root.as_os_str()]);
    assert_success(&output);
    assert!(stdout_text(&output).contains("wrote config: no"));
}

#[test]
fn match_json_reports_matches_and_both_unmatched_sides() {
    let tmp = TempDirGuard::new("match");
    let (roster, target) = write_fixture(tmp.path());
    let before = fs::read_to_string(&target).expect("target should exist");

    let output = run_gradesync([
        OsStr::new("match"),
        OsStr::new("--roster"),
        roster.as_os_str(),
        OsStr::new("--target"),
        target.as_os_str(),
        OsStr::new("--json"),
    ]);
    assert_success(&output);
    let payload = parse_json_stdout(&output);
    assert_eq!(payload["schema"], 1);
    assert_eq!(payload["hasStatusColumn"], true);
    assert_eq!(payload["matches"].as_array().map(Vec::len), Some(2));
    assert_eq!(payload["unmatchedSource"].as_array().map(Vec::len), Some(1));
    assert_eq!(payload["unmatchedTarget"].as_array().map(Vec::len), Some(1));
    assert_eq!(payload["rosterWarnings"].as_array().map(Vec::len), Some(1));
    assert!(
        payload["snapshot"]
            .as_str()
            .is_some_and(|digest| digest.starts_with("snap1_"))
    );

    let after = fs::read_to_string(&target).expect("target should exist");
    assert_eq!(before, after, "match must not write the target");
}

#[test]
fn apply_writes_target_and_appends_mismatch_log() {
    let tmp = TempDirGuard::new("apply");
    let (roster, target) = write_fixture(tmp.path());
    let reports = tmp.path().join("reports");

    let output = run_gradesync([
        OsStr::new("apply"),
        OsStr::new("--roster"),
        roster.as_os_str(),
        OsStr::new("--target"),
        target.as_os_str(),
        OsStr::new("--config"),
        tmp.path().join("missing.toml").as_os_str(),
        OsStr::new("--roster-id"),
        OsStr::new("CSE 221/08"),
        OsStr::new("--total-marks"),
        OsStr::new("20"),
        OsStr::new("--report-dir"),
        reports.as_os_str(),
        OsStr::new("--json"),
    ]);
    assert_success(&output);
    let payload = parse_json_stdout(&output);
    assert_eq!(payload["summary"]["rosterId"], "CSE 221/08");
    assert_eq!(payload["summary"]["matched"], 2);
    assert_eq!(payload["summary"]["updated"], 2);
    assert_eq!(payload["summary"]["unmatchedSource"], 1);
    assert_eq!(payload["summary"]["unmatchedTarget"], 1);
    assert_eq!(payload["summary"]["statusWritten"], true);
    assert_eq!(payload["summary"]["totalMarksApplied"], true);
    assert_eq!(payload["summary"]["gradesVerified"], 2);
    assert_eq!(payload["summary"]["statusesVerified"], 2);

    let saved: Value = serde_json::from_str(
        &fs::read_to_string(&target).expect("target should exist"),
    )
    .expect("target should stay valid json");
    assert_eq!(saved["totalMarks"], "20");
    assert_eq!(saved["rows"][0]["marks"], "12.00");
    assert_eq!(saved["rows"][0]["status"], "Present");
    assert_eq!(saved["rows"][1]["marks"], "17.50");
    assert_eq!(saved["rows"][1]["status"], "Absent");
    assert_eq!(saved["rows"][2]["marks"], "");

    let log_path = reports.join("CSE_221_08_mismatch_log.txt");
    assert_eq!(
        payload["reportPath"].as_str(),
        Some(log_path.display().to_string().as_str())
    );
    let log = fs::read_to_string(&log_path).expect("mismatch log should exist");
    assert!(log.contains("==== CSE 221/08 | "));
    assert!(log.contains("id=20101404 name=Ned"));
    assert!(log.contains("id=20109999 name=Zed"));
}

#[test]
fn apply_twice_appends_two_report_blocks() {
    let tmp = TempDirGuard::new("append");
    let (roster, target) = write_fixture(tmp.path());

    for _ in 0..2 {
        let output = run_gradesync([
            OsStr::new("apply"),
            OsStr::new("--roster"),
            roster.as_os_str(),
            OsStr::new("--target"),
            target.as_os_str(),
            OsStr::new("--config"),
            tmp.path().join("missing.toml").as_os_str(),
        ]);
        assert_success(&output);
        assert!(stdout_text(&output).contains("matched: 2"));
    }

    let log = fs::read_to_string(tmp.path().join("unnamed-roster_mismatch_log.txt"))
        .expect("default log should sit next to the target");
    assert_eq!(log.matches("==== unnamed-roster | ").count(), 2);
}

#[test]
fn apply_prompts_for_total_marks_on_stdin() {
    let tmp = TempDirGuard::new("prompt");
    let (roster, target) = write_fixture(tmp.path());

    let output = run_gradesync_with_stdin(
        [
            OsStr::new("apply"),
            OsStr::new("--roster"),
            roster.as_os_str(),
            OsStr::new("--target"),
            target.as_os_str(),
            OsStr::new("--config"),
            tmp.path().join("missing.toml").as_os_str(),
            OsStr::new("--prompt"),
        ],
        "zero\n40\n",
    );
    assert_success(&output);
    assert!(stderr_text(&output).contains("invalid answer"));
    let saved: Value = serde_json::from_str(
        &fs::read_to_string(&target).expect("target should exist"),
    )
    .expect("target should stay valid json");
    assert_eq!(saved["totalMarks"], "40");
}

#[test]
fn apply_cancelled_at_prompt_writes_nothing() {
    let tmp = TempDirGuard::new("prompt-cancel");
    let (roster, target) = write_fixture(tmp.path());
    let before = fs::read_to_string(&target).expect("target should exist");

    let output = run_gradesync_with_stdin(
        [
            OsStr::new("apply"),
            OsStr::new("--roster"),
            roster.as_os_str(),
            OsStr::new("--target"),
            target.as_os_str(),
            OsStr::new("--config"),
            tmp.path().join("missing.toml").as_os_str(),
            OsStr::new("--prompt"),
        ],
        "\n",
    );
    assert_failure(&output);
    assert!(stderr_text(&output).contains("cancelled at prompt"));
    assert_eq!(
        before,
        fs::read_to_string(&target).expect("target should exist")
    );
}

#[test]
fn apply_with_no_matches_fails_but_still_logs() {
    let tmp = TempDirGuard::new("empty-plan");
    let roster = tmp.path().join("roster.jsonl");
    let target = tmp.path().join("target.json");
    fs::write(&roster, "{\"id\": \"1\", \"name\": \"Ada\", \"grade\": 5}\n")
        .expect("roster should write");
    fs::write(
        &target,
        "{\"rows\": [{\"student\": \"2-Bea\", \"marks\": \"\", \"status\": \"Present\"}]}\n",
    )
    .expect("target should write");
    let before = fs::read_to_string(&target).expect("target should exist");

    let output = run_gradesync([
        OsStr::new("apply"),
        OsStr::new("--roster"),
        roster.as_os_str(),
        OsStr::new("--target"),
        target.as_os_str(),
        OsStr::new("--config"),
        tmp.path().join("missing.toml").as_os_str(),
        OsStr::new("--roster-id"),
        OsStr::new("lab1"),
    ]);
    assert_failure(&output);
    assert!(stderr_text(&output).contains("no roster row could be matched"));
    assert_eq!(
        before,
        fs::read_to_string(&target).expect("target should exist")
    );
    let log = fs::read_to_string(tmp.path().join("lab1_mismatch_log.txt"))
        .expect("log should be written for an empty plan");
    assert!(log.contains("IN SOURCE BUT NOT IN TARGET (1)"));
}

#[test]
fn apply_json_with_no_matches_emits_error_payload() {
    let tmp = TempDirGuard::new("empty-plan-json");
    let roster = tmp.path().join("roster.jsonl");
    let target = tmp.path().join("target.json");
    fs::write(&roster, "{\"id\": \"1\", \"name\": \"Ada\", \"grade\": 5}\n")
        .expect("roster should write");
    fs::write(
        &target,
        "{\"rows\": [{\"student\": \"2-Bea\", \"marks\": \"\", \"status\": \"Present\"}]}\n",
    )
    .expect("target should write");

    let output = run_gradesync([
        OsStr::new("apply"),
        OsStr::new("--roster"),
        roster.as_os_str(),
        OsStr::new("--target"),
        target.as_os_str(),
        OsStr::new("--config"),
        tmp.path().join("missing.toml").as_os_str(),
        OsStr::new("--json"),
    ]);
    assert_failure(&output);
    let payload = parse_json_stdout(&output);
    assert_eq!(payload["schema"], 1);
    assert_eq!(payload["error"], "empty-plan");
    assert_eq!(payload["report"]["inSourceNotTarget"][0]["id"], "1");
    assert_eq!(payload["report"]["inTargetNotSource"][0]["id"], "2");
    assert!(
        payload["reportPath"]
            .as_str()
            .is_some_and(|path| path.ends_with("unnamed-roster_mismatch_log.txt"))
    );
}

#[cfg(unix)]
#[test]
fn sigint_at_prompt_cancels_before_any_write() {
    let tmp = TempDirGuard::new("sigint");
    let (roster, target) = write_fixture(tmp.path());
    let before = fs::read_to_string(&target).expect("target should exist");

    let mut child = gradesync_command()
        .args([
            OsStr::new("apply"),
            OsStr::new("--roster"),
            roster.as_os_str(),
            OsStr::new("--target"),
            target.as_os_str(),
            OsStr::new("--config"),
            tmp.path().join("missing.toml").as_os_str(),
            OsStr::new("--prompt"),
        ])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("gradesync command should spawn");
    let mut stderr = child.stderr.take().expect("stderr should be piped");
    let mut seen = String::new();
    let mut byte = [0u8; 1];
    while !seen.contains("[attempt 1]: ") {
        let read = stderr.read(&mut byte).expect("stderr should read");
        assert!(read > 0, "prompt never appeared; stderr:\n{seen}");
        seen.push(byte[0] as char);
    }

    let status = Command::new("kill")
        .args(["-INT", &child.id().to_string()])
        .status()
        .expect("kill should run");
    assert!(status.success());
    child
        .stdin
        .take()
        .expect("stdin should be piped")
        .write_all(b"40\n")
        .expect("stdin should accept input");
    stderr
        .read_to_string(&mut seen)
        .expect("stderr should read to end");
    let exit = child.wait().expect("gradesync command should finish");

    assert!(!exit.success(), "cancelled run must fail; stderr:\n{seen}");
    assert!(seen.contains("run cancelled"), "stderr:\n{seen}");
    assert_eq!(
        before,
        fs::read_to_string(&target).expect("target should exist")
    );
}

#[test]
fn missing_roster_is_reported() {
    let tmp = TempDirGuard::new("missing");
    let output = run_gradesync([
        OsStr::new("match"),
        OsStr::new("--roster"),
        tmp.path().join("nope.jsonl").as_os_str(),
        OsStr::new("--target"),
        tmp.path().join("target.json").as_os_str(),
    ]);
    assert_failure(&output);
    assert!(stderr_text(&output).contains("roster file not found"));
}

#[test]
fn invalid_total_marks_flag_is_rejected() {
    let tmp = TempDirGuard::new("bad-total");
    let (roster, target) = write_fixture(tmp.path());
    let output = run_gradesync([
        OsStr::new("apply"),
        OsStr::new("--roster"),
        roster.as_os_str(),
        OsStr::new("--target"),
        target.as_os_str(),
        OsStr::new("--config"),
        tmp.path().join("missing.toml").as_os_str(),
        OsStr::new("--total-marks"),
        OsStr::new("lots"),
    ]);
    assert_failure(&output);
    assert!(stderr_text(&output).contains("invalid --total-marks"));
}
