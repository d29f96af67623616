use serde_json::Value;
use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

const API_KEY: &str = "oq0vdlg7yi";

struct CliTestEnv {
    _temp_dir: TempDir,
    home: PathBuf,
    xdg_data: PathBuf,
    xdg_config: PathBuf,
    xdg_state: PathBuf,
    api_key: Option<&'static str>,
}

impl CliTestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let base = temp_dir.path().to_path_buf();
        let home = base.join("home");
        let xdg_data = base.join("xdg-data");
        let xdg_config = base.join("xdg-config");
        let xdg_state = base.join("xdg-state");

        fs::create_dir_all(&home).expect("failed to create HOME");
        fs::create_dir_all(&xdg_data).expect("failed to create XDG_DATA_HOME");
        fs::create_dir_all(&xdg_config).expect("failed to create XDG_CONFIG_HOME");
        fs::create_dir_all(&xdg_state).expect("failed to create XDG_STATE_HOME");

        Self {
            _temp_dir: temp_dir,
            home,
            xdg_data,
            xdg_config,
            xdg_state,
            api_key: None,
        }
    }

    fn with_api_key() -> Self {
        Self {
            api_key: Some(API_KEY),
            ..Self::new()
        }
    }

    fn write_config(&self, contents: &str) {
        let dir = self.xdg_config.join("astronomer");
        fs::create_dir_all(&dir).expect("failed to create config dir");
        fs::write(dir.join("config.toml"), contents).expect("failed to write config");
    }

    fn write_file(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.home.join(name);
        fs::write(&path, contents).expect("failed to write file");
        path
    }

    fn db_path(&self) -> PathBuf {
        self.xdg_data.join("astronomer/data.db")
    }
}

fn run_bin(env: &CliTestEnv, args: &[&str]) -> Output {
    let bin_path = PathBuf::from(assert_cmd::cargo::cargo_bin!("astronomer"));
    let mut command = Command::new(bin_path);

    command
        .args(args)
        .env("HOME", &env.home)
        .env("XDG_DATA_HOME", &env.xdg_data)
        .env("XDG_CONFIG_HOME", &env.xdg_config)
        .env("XDG_STATE_HOME", &env.xdg_state)
        .env_remove("ASTRONOMER_API_KEY")
        .env_remove("RUST_LOG");

    if let Some(key) = env.api_key {
        command.env("ASTRONOMER_API_KEY", key);
    }

    command
        .output()
        .unwrap_or_else(|e| panic!("failed to execute astronomer: {e}"))
}

fn render_args(args: &[&str]) -> String {
    args.iter()
        .map(|arg| OsString::from(arg).to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

fn assert_success(args: &[&str], output: &Output) {
    if output.status.success() {
        return;
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    panic!(
        "astronomer {} failed\nstatus: {}\nstdout:\n{}\nstderr:\n{}",
        render_args(args),
        output.status,
        stdout,
        stderr
    );
}

fn assert_failure(args: &[&str], output: &Output) -> String {
    assert!(
        !output.status.success(),
        "astronomer {} unexpectedly succeeded\nstdout:\n{}",
        render_args(args),
        String::from_utf8_lossy(&output.stdout)
    );
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn dry_run(env: &CliTestEnv, args: &[&str]) -> Value {
    let output = run_bin(env, args);
    assert_success(args, &output);
    serde_json::from_slice(&output.stdout).unwrap_or_else(|e| {
        panic!(
            "expected JSON envelope from {}: {e}\n{}",
            render_args(args),
            String::from_utf8_lossy(&output.stdout)
        )
    })
}

#[test]
fn status_reports_missing_api_key() {
    let env = CliTestEnv::new();

    let output = run_bin(&env, &["status"]);
    assert_success(&["status"], &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Astronomer Configuration"));
    assert!(stdout.contains("Host:            api.astronomer.io"));
    assert!(stdout.contains("API Key:         <not set>"));
    assert!(stdout.contains("Status: Not ready"));
}

#[test]
fn status_reads_config_file() {
    let env = CliTestEnv::new();
    env.write_config(
        r#"
[integration]
api_key = "from-file"
host = "ingest.example.test"
timeout_secs = 7
"#,
    );

    let output = run_bin(&env, &["status"]);
    assert_success(&["status"], &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Host:            ingest.example.test"));
    assert!(stdout.contains("API Key:         <set>"));
    assert!(stdout.contains("Timeout:         7s"));
    assert!(stdout.contains("Status: Ready to send"));
}

#[test]
fn dry_run_track_prints_envelope() {
    let env = CliTestEnv::with_api_key();
    let args = [
        "--dry-run",
        "--user-agent",
        "acceptance-test",
        "--user-id",
        "user-1",
        "track",
        "Signed Up",
        "--properties",
        r#"{"plan":"pro"}"#,
        "--options",
        r#"{"locale":"en-US"}"#,
    ];

    let envelope = dry_run(&env, &args);
    assert_eq!(envelope["type"], "track");
    assert_eq!(envelope["event"], "Signed Up");
    assert_eq!(envelope["properties"]["plan"], "pro");
    assert_eq!(envelope["userId"], "user-1");
    assert_eq!(envelope["writeKey"], API_KEY);
    assert_eq!(envelope["context"]["userAgent"], "acceptance-test");
    assert_eq!(envelope["context"]["locale"], "en-US");
    assert_eq!(envelope["anonymousId"].as_str().unwrap().len(), 36);
    assert_eq!(envelope["messageId"].as_str().unwrap().len(), 36);

    assert!(env.db_path().exists(), "database should be created on first call");
}

#[test]
fn dry_run_alias_renames_ids() {
    let env = CliTestEnv::with_api_key();
    let args = ["--dry-run", "alias", "new-id", "old-id"];

    let envelope = dry_run(&env, &args);
    assert_eq!(envelope["type"], "alias");
    assert_eq!(envelope["userId"], "new-id");
    assert_eq!(envelope["previousId"], "old-id");
}

#[test]
fn dry_run_page_picks_up_campaign() {
    let env = CliTestEnv::with_api_key();
    let args = [
        "--dry-run",
        "--url",
        "https://www.example.com/landing?utm_source=news&utm_term=rust",
        "page",
        "--name",
        "Landing",
    ];

    let envelope = dry_run(&env, &args);
    assert_eq!(envelope["type"], "page");
    assert_eq!(envelope["name"], "Landing");
    assert_eq!(envelope["context"]["campaign"]["source"], "news");
    assert_eq!(envelope["context"]["campaign"]["term"], "rust");
}

#[test]
fn send_reads_raw_call_file() {
    let env = CliTestEnv::with_api_key();
    let path = env.write_file(
        "call.json",
        r#"{"type":"group","groupId":"acme","traits":{"seats":10}}"#,
    );
    let path = path.to_string_lossy().into_owned();
    let args = ["--dry-run", "send", path.as_str()];

    let envelope = dry_run(&env, &args);
    assert_eq!(envelope["type"], "group");
    assert_eq!(envelope["groupId"], "acme");
    assert_eq!(envelope["traits"]["seats"], 10);
}

#[test]
fn invalid_call_exits_with_error() {
    let env = CliTestEnv::with_api_key();
    let path = env.write_file("call.json", r#"{"type":"track","properties":{}}"#);
    let path = path.to_string_lossy().into_owned();
    let args = ["--dry-run", "send", path.as_str()];

    let output = run_bin(&env, &args);
    let stderr = assert_failure(&args, &output);
    assert!(
        stderr.contains("invalid call"),
        "expected invalid call error, got:\n{stderr}"
    );
}

#[test]
fn missing_api_key_exits_with_error() {
    let env = CliTestEnv::new();
    let args = ["--dry-run", "track", "Signed Up"];

    let output = run_bin(&env, &args);
    let stderr = assert_failure(&args, &output);
    assert!(stderr.contains("api_key"), "got:\n{stderr}");
}

#[test]
fn non_object_properties_rejected() {
    let env = CliTestEnv::with_api_key();
    let args = ["--dry-run", "track", "Signed Up", "--properties", "[1,2]"];

    let output = run_bin(&env, &args);
    let stderr = assert_failure(&args, &output);
    assert!(stderr.contains("--properties must be a JSON object"));
}

#[test]
fn referrer_is_persisted_and_cleared() {
    let env = CliTestEnv::with_api_key();

    let landing = [
        "--dry-run",
        "--url",
        "https://shop.example.com/?urid=abc123",
        "page",
    ];
    let envelope = dry_run(&env, &landing);
    assert_eq!(envelope["context"]["referrer"]["id"], "abc123");
    assert_eq!(envelope["context"]["referrer"]["type"], "millennial-media");

    let show = ["--url", "https://www.example.com/", "referrer"];
    let output = run_bin(&env, &show);
    assert_success(&show, &output);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("millennial-media"), "got:\n{stdout}");

    let clear = ["--url", "https://www.example.com/", "referrer", "--clear"];
    let output = run_bin(&env, &clear);
    assert_success(&clear, &output);

    let output = run_bin(&env, &show);
    assert_success(&show, &output);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("No referrer persisted"), "got:\n{stdout}");
}
