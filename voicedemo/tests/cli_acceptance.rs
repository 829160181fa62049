use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

struct CliTestEnv {
    _temp_dir: TempDir,
    home: PathBuf,
    xdg_config: PathBuf,
    xdg_state: PathBuf,
}

impl CliTestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let base = temp_dir.path().to_path_buf();
        let home = base.join("home");
        let xdg_config = base.join("xdg-config");
        let xdg_state = base.join("xdg-state");

        fs::create_dir_all(&home).expect("failed to create HOME");
        fs::create_dir_all(&xdg_config).expect("failed to create XDG_CONFIG_HOME");
        fs::create_dir_all(&xdg_state).expect("failed to create XDG_STATE_HOME");

        Self {
            _temp_dir: temp_dir,
            home,
            xdg_config,
            xdg_state,
        }
    }

    fn cooldown_path(&self) -> PathBuf {
        self.xdg_state.join("voicedemo/last-call-ended-at")
    }

    fn write_config(&self, content: &str) {
        let dir = self.xdg_config.join("voicedemo");
        fs::create_dir_all(&dir).expect("failed to create config dir");
        fs::write(dir.join("config.toml"), content).expect("failed to write config");
    }

    fn record_call_ended_minutes_ago(&self, minutes: i64) {
        let ended_at = chrono::Utc::now() - chrono::Duration::minutes(minutes);
        let path = self.cooldown_path();
        fs::create_dir_all(path.parent().expect("missing state parent"))
            .expect("failed to create state dir");
        fs::write(path, ended_at.timestamp_millis().to_string())
            .expect("failed to write cooldown slot");
    }
}

fn run_bin(env: &CliTestEnv, args: &[&str], envs: &[(&str, &str)]) -> Output {
    let bin_path = PathBuf::from(assert_cmd::cargo::cargo_bin!("voicedemo"));

    let mut command = Command::new(bin_path);

    command
        .args(args)
        .env("HOME", &env.home)
        .env("XDG_CONFIG_HOME", &env.xdg_config)
        .env("XDG_STATE_HOME", &env.xdg_state)
        .env_remove("VOICEDEMO_API_KEY")
        .env_remove("VOICEDEMO_ASSISTANT_ID")
        .env_remove("RUST_LOG");
    for (key, value) in envs {
        command.env(key, value);
    }

    command
        .output()
        .unwrap_or_else(|e| panic!("failed to execute voicedemo: {e}"))
}

fn assert_success(args: &[&str], output: &Output) {
    if output.status.success() {
        return;
    }

    let rendered_args = args
        .iter()
        .map(|arg| OsString::from(arg).to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    panic!(
        "voicedemo {rendered_args} failed\nstatus: {}\nstdout:\n{}\nstderr:\n{}",
        output.status, stdout, stderr
    );
}

const DEMO_KEY: (&str, &str) = ("VOICEDEMO_API_KEY", "pk_test_demo");

#[test]
fn status_reports_ready_with_fresh_state() {
    let env = CliTestEnv::new();

    let output = run_bin(&env, &["status"], &[]);
    assert_success(&["status"], &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Voice Demo Configuration"));
    assert!(stdout.contains("Call cap:           180s"));
    assert!(stdout.contains("Ready: a demo call can start now"));
}

#[test]
fn status_and_call_respect_cooldown() {
    let env = CliTestEnv::new();
    env.record_call_ended_minutes_ago(61);

    let status = run_bin(&env, &["status"], &[]);
    assert_success(&["status"], &status);
    let stdout = String::from_utf8_lossy(&status.stdout);
    assert!(
        stdout.contains("Next demo available in 59 minutes"),
        "expected cooldown text, got:\n{stdout}"
    );

    let args = ["call", "--assistant-id", "asst-demo"];
    let call = run_bin(&env, &args, &[DEMO_KEY]);
    assert!(!call.status.success(), "call should be refused");
    let stderr = String::from_utf8_lossy(&call.stderr);
    assert!(stderr.contains("Next demo available in"), "got:\n{stderr}");
}

#[test]
fn reset_cooldown_clears_slot() {
    let env = CliTestEnv::new();
    env.record_call_ended_minutes_ago(5);

    let output = run_bin(&env, &["reset-cooldown"], &[]);
    assert_success(&["reset-cooldown"], &output);
    assert!(!env.cooldown_path().exists());

    // Clearing an empty slot is fine too
    let again = run_bin(&env, &["reset-cooldown"], &[]);
    assert_success(&["reset-cooldown"], &again);

    let status = run_bin(&env, &["status"], &[]);
    let stdout = String::from_utf8_lossy(&status.stdout);
    assert!(stdout.contains("Ready: a demo call can start now"));
}

#[test]
fn call_requires_credentials() {
    let env = CliTestEnv::new();

    let args = ["call", "--assistant-id", "asst-demo"];
    let output = run_bin(&env, &args, &[]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("voice credentials are not configured"), "got:\n{stderr}");
}

#[test]
fn unreachable_token_endpoint_reports_retryable_failure() {
    let env = CliTestEnv::new();
    env.write_config(
        r#"
[credentials]
token_endpoint = "http://127.0.0.1:9/token"
max_attempts = 1
"#,
    );

    let args = ["call", "--assistant-id", "asst-demo"];
    let output = run_bin(&env, &args, &[]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Could not connect to the voice service"),
        "got:\n{stderr}"
    );
    assert!(stderr.contains("run the command again to retry"), "got:\n{stderr}");
    assert!(!env.cooldown_path().exists());
}

#[test]
fn denied_microphone_fails_without_cooldown() {
    let env = CliTestEnv::new();

    let args = ["call", "--assistant-id", "asst-demo", "--deny-microphone"];
    let output = run_bin(&env, &args, &[DEMO_KEY]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Microphone access was denied"), "got:\n{stderr}");
    assert!(!env.cooldown_path().exists());
}

#[test]
fn outdated_browser_is_unsupported() {
    let env = CliTestEnv::new();

    let ua = "Mozilla/5.0 (X11; Linux x86_64; rv:70.0) Gecko/20100101 Firefox/70.0";
    let args = ["call", "--assistant-id", "asst-demo", "--user-agent", ua];
    let output = run_bin(&env, &args, &[DEMO_KEY]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Firefox 88+ is required"), "got:\n{stderr}");
}

#[test]
fn short_call_runs_to_cap_and_starts_cooldown() {
    let env = CliTestEnv::new();
    env.write_config(
        r#"
[call]
assistant_id = "asst-from-config"
"#,
    );

    let args = ["call", "--max-duration", "2"];
    let output = run_bin(&env, &args, &[DEMO_KEY]);
    assert_success(&args, &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Calling assistant asst-from-config"));
    assert!(stdout.contains("[connected] 0:02 remaining"), "got:\n{stdout}");
    assert!(stdout.contains("Call ended: countdown_expired"), "got:\n{stdout}");
    assert!(stdout.contains("Next demo available in 2 hours"));
    assert!(env.cooldown_path().exists());

    let again = run_bin(&env, &["call"], &[DEMO_KEY]);
    assert!(!again.status.success(), "second call should hit the cooldown");
}
