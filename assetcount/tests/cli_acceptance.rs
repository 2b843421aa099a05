use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

const RAW_KEY: &str = "rawData/cloud-guard-protected-assets-2022-September-08.json";
const REPORT_KEY: &str = "reports/cloud-guard-assets-2022-September-08.csv";

struct CliTestEnv {
    _temp_dir: TempDir,
    home: PathBuf,
    xdg_data: PathBuf,
    xdg_config: PathBuf,
    xdg_state: PathBuf,
    blobs: PathBuf,
}

impl CliTestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let base = temp_dir.path().to_path_buf();
        let home = base.join("home");
        let xdg_data = base.join("xdg-data");
        let xdg_config = base.join("xdg-config");
        let xdg_state = base.join("xdg-state");
        let blobs = base.join("blobs");

        fs::create_dir_all(&home).expect("failed to create HOME");
        fs::create_dir_all(&xdg_data).expect("failed to create XDG_DATA_HOME");
        fs::create_dir_all(&xdg_config).expect("failed to create XDG_CONFIG_HOME");
        fs::create_dir_all(&xdg_state).expect("failed to create XDG_STATE_HOME");

        write_config(&xdg_config, &blobs);

        Self {
            _temp_dir: temp_dir,
            home,
            xdg_data,
            xdg_config,
            xdg_state,
            blobs,
        }
    }

    fn seed_blob(&self, key: &str, contents: &str) {
        let path = self.blobs.join(key);
        fs::create_dir_all(path.parent().expect("missing blob parent"))
            .expect("failed to create blob directories");
        fs::write(path, contents).expect("failed to seed blob");
    }

    fn blob(&self, key: &str) -> PathBuf {
        self.blobs.join(key)
    }
}

fn write_config(xdg_config: &Path, blobs: &Path) {
    let dir = xdg_config.join("assetcount");
    fs::create_dir_all(&dir).expect("failed to create config dir");

    let config = format!(
        r#"
[search]
page_size = 2

[[directory.accounts]]
id = "111"
name = "Alpha"

[[directory.accounts]]
id = "222"
name = "Beta"

[store]
root = "{}"
"#,
        blobs.display()
    );
    fs::write(dir.join("config.toml"), config).expect("failed to write config");
}

fn raw_fixture() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../assetcount-core/tests/fixtures/raw-pages.json")
}

fn run_bin(env: &CliTestEnv, args: &[&str]) -> Output {
    let bin_path = PathBuf::from(assert_cmd::cargo::cargo_bin!("assetcount"));

    Command::new(bin_path)
        .args(args)
        .env("HOME", &env.home)
        .env("XDG_DATA_HOME", &env.xdg_data)
        .env("XDG_CONFIG_HOME", &env.xdg_config)
        .env("XDG_STATE_HOME", &env.xdg_state)
        .env_remove("ASSETCOUNT_API_KEY_ID")
        .env_remove("ASSETCOUNT_API_KEY_SECRET")
        .output()
        .unwrap_or_else(|e| panic!("failed to execute assetcount: {e}"))
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
        "assetcount {rendered_args} failed\nstatus: {}\nstdout:\n{}\nstderr:\n{}",
        output.status, stdout, stderr
    );
}

#[test]
fn transform_reads_raw_blob_and_writes_report() {
    let env = CliTestEnv::new();
    env.seed_blob(
        RAW_KEY,
        r#"[{"externalCloudAccountId":"111","type":"vm"},{"externalCloudAccountId":"111","type":"vm"}]
[{"externalCloudAccountId":"222","type":"db"},{"externalCloudAccountId":"111","type":"disk"}]
"#,
    );

    let args = ["transform", "--date", "2022-09-08"];
    let output = run_bin(&env, &args);
    assert_success(&args, &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("Report complete:"),
        "expected report summary in stdout, got:\n{stdout}"
    );
    assert!(stdout.contains("Records counted:  4"));

    let report = fs::read_to_string(env.blob(REPORT_KEY)).expect("report should exist");
    assert_eq!(
        report,
        "Date,Account ID,Type,Quantity,Account Name\n\
         9/8/2022,111,vm,2,Alpha\n\
         9/8/2022,222,db,1,Beta\n\
         9/8/2022,111,disk,1,Alpha\n"
    );
}

#[test]
fn transform_local_files_bypass_the_store() {
    let env = CliTestEnv::new();
    let out_dir = TempDir::new().expect("failed to create output dir");
    let out_path = out_dir.path().join("report.csv");
    let input = raw_fixture();

    let args = [
        "transform",
        "--report-date",
        "12/31/2022",
        "--input",
        input.to_str().expect("fixture path is not UTF-8"),
        "--output",
        out_path.to_str().expect("output path is not UTF-8"),
    ];
    let output = run_bin(&env, &args);
    assert_success(&args, &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("Report complete:") && stdout.contains("Run ID:"),
        "expected report summary in stdout, got:\n{stdout}"
    );
    assert!(stdout.contains(&out_path.display().to_string()));

    let report = fs::read_to_string(&out_path).expect("local report should exist");
    let mut lines = report.lines();
    assert_eq!(
        lines.next(),
        Some("Date,Account ID,Type,Quantity,Account Name")
    );
    let rows: Vec<&str> = lines.collect();
    assert!(!rows.is_empty());
    assert!(rows.iter().all(|row| row.starts_with("12/31/2022,")));
    assert!(!env.blobs.join("reports").exists());
}

#[test]
fn transform_with_unknown_account_fails_without_report() {
    let env = CliTestEnv::new();
    env.seed_blob(
        RAW_KEY,
        r#"[{"externalCloudAccountId":"111","type":"vm"},{"externalCloudAccountId":"999","type":"vm"}]"#,
    );

    let output = run_bin(&env, &["transform", "--date", "2022-09-08"]);
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("999"),
        "expected the unknown account in stderr, got:\n{stderr}"
    );
    assert!(!env.blob(REPORT_KEY).exists());
}

#[test]
fn transform_of_empty_raw_blob_writes_header_only_report() {
    let env = CliTestEnv::new();
    env.seed_blob(RAW_KEY, "[]\n");

    let args = ["transform", "--date", "2022-09-08"];
    let output = run_bin(&env, &args);
    assert_success(&args, &output);

    let report = fs::read_to_string(env.blob(REPORT_KEY)).expect("report should exist");
    assert_eq!(report, "Date,Account ID,Type,Quantity,Account Name\n");
}

#[test]
fn transform_without_raw_blob_fails() {
    let env = CliTestEnv::new();

    let output = run_bin(&env, &["transform", "--date", "2022-09-08"]);
    assert!(!output.status.success());
    assert!(!env.blob(REPORT_KEY).exists());
}

#[test]
fn fetch_without_search_endpoint_fails_before_writing() {
    let env = CliTestEnv::new();

    let output = run_bin(
        &env,
        &[
            "fetch",
            "--date",
            "2022-09-08",
            "--on-failure",
            "abort",
        ],
    );
    assert!(!output.status.success());
    assert!(!env.blob(RAW_KEY).exists());
}

#[test]
fn unknown_failure_policy_is_rejected() {
    let env = CliTestEnv::new();

    let output = run_bin(&env, &["fetch", "--on-failure", "retry"]);
    assert!(!output.status.success());
}

#[test]
fn status_shows_configuration() {
    let env = CliTestEnv::new();

    let output = run_bin(&env, &["status"]);
    assert_success(&["status"], &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("assetcount Configuration"));
    assert!(stdout.contains("inline (2 accounts)"));
    assert!(stdout.contains(&env.blobs.display().to_string()));
    assert!(stdout.contains("Status: transform only"));
}
