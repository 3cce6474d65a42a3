use std::{
    fs,
    path::{Path, PathBuf},
    process::{Command, Output},
};

fn write_valid_config(dir: &Path, file_name: &str) -> PathBuf {
    let data_dir = dir.join("data");
    fs::create_dir_all(&data_dir).expect("create data dir");

    let config_path = dir.join(file_name);
    fs::write(
        &config_path,
        format!(
            r#"
name = "liberatid-cli-test"
env = "dev"

[store]
nonce_skew_secs = 18000

[store.storage]
backend = "sqlite"

[store.storage.sqlite]
path = "{sqlite}"

[cleanup]
interval_secs = 3600

[observability.log]
output = "console"
"#,
            sqlite = data_dir.join("liberatid.db").display(),
        ),
    )
    .expect("write valid config");

    config_path
}

fn write_warning_only_config(dir: &Path, file_name: &str) -> PathBuf {
    let config_path = dir.join(file_name);
    fs::write(
        &config_path,
        r#"
name = "liberatid-cli-warning-test"
env = "prod"

[store.storage]
backend = "memory"
"#,
    )
    .expect("write warning-only config");

    config_path
}

fn write_validation_error_config(dir: &Path, file_name: &str) -> PathBuf {
    let config_path = dir.join(file_name);
    fs::write(
        &config_path,
        r#"
name = "liberatid-cli-validation-error-test"
env = "dev"

# Same blob name for associations and nonces is rejected.
[store]
associations_option = "liberatid_shared"
nonces_option = "liberatid_shared"

[store.storage]
backend = "memory"
"#,
    )
    .expect("write validation-error config");

    config_path
}

fn run_liberatid(args: &[&str], current_dir: Option<&Path>) -> Output {
    let mut cmd = Command::new(PathBuf::from(env!("CARGO_BIN_EXE_liberatid")));
    cmd.args(args);
    cmd.env_remove("RUST_LOG");
    if let Some(dir) = current_dir {
        cmd.current_dir(dir);
    }
    cmd.output().expect("run liberatid command")
}

#[test]
fn liberatid_test_command_accepts_explicit_valid_config() {
    let temp = tempfile::tempdir().expect("temp dir");
    let config_path = write_valid_config(temp.path(), "valid.toml");
    let output = run_liberatid(&["test", config_path.to_str().expect("utf8 path")], None);

    assert!(
        output.status.success(),
        "command should succeed, stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
fn liberatid_test_command_finds_default_config_in_current_directory() {
    let temp = tempfile::tempdir().expect("temp dir");
    write_valid_config(temp.path(), "config.toml");
    let output = run_liberatid(&["test"], Some(temp.path()));

    assert!(
        output.status.success(),
        "command should succeed, stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
fn liberatid_test_command_fails_for_missing_custom_config_path() {
    let temp = tempfile::tempdir().expect("temp dir");
    let missing_path = temp.path().join("missing.toml");
    let output = run_liberatid(&["test", missing_path.to_str().expect("utf8 path")], None);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success(), "command should fail");
    assert!(
        stderr.contains("Config file not found"),
        "unexpected stderr: {stderr}"
    );
}

#[test]
fn liberatid_test_command_fails_when_no_default_config_exists() {
    let temp = tempfile::tempdir().expect("temp dir");
    let output = run_liberatid(&["test"], Some(temp.path()));
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success(), "command should fail");
    assert!(
        stderr.contains("No configuration file found"),
        "unexpected stderr: {stderr}"
    );
}

#[test]
fn liberatid_test_command_fails_for_invalid_config_content() {
    let temp = tempfile::tempdir().expect("temp dir");
    let bad_path = temp.path().join("bad.toml");
    fs::write(&bad_path, "name = \"broken\"\n[store\n").expect("write invalid toml");

    let output = run_liberatid(&["test", bad_path.to_str().expect("utf8 path")], None);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success(), "command should fail");
    assert!(
        stderr.contains("配置解析失败"),
        "unexpected stderr: {stderr}"
    );
}

#[test]
fn liberatid_test_command_fails_for_validation_errors() {
    let temp = tempfile::tempdir().expect("temp dir");
    let config_path = write_validation_error_config(temp.path(), "validation-error.toml");
    let output = run_liberatid(&["test", config_path.to_str().expect("utf8 path")], None);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success(), "command should fail");
    assert!(
        stderr.contains("配置验证失败"),
        "unexpected stderr: {stderr}"
    );
}

#[test]
fn liberatid_test_command_succeeds_with_warning_only_config() {
    let temp = tempfile::tempdir().expect("temp dir");
    let config_path = write_warning_only_config(temp.path(), "warning.toml");
    let output = run_liberatid(&["test", config_path.to_str().expect("utf8 path")], None);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(
        output.status.success(),
        "warning-only config should succeed, stderr: {stderr}"
    );
}

#[test]
fn liberatid_run_mode_fails_when_no_default_config_exists() {
    let temp = tempfile::tempdir().expect("temp dir");
    let output = run_liberatid(&[], Some(temp.path()));
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success(), "run mode should fail");
    assert!(
        stderr.contains("No configuration file found"),
        "unexpected stderr: {stderr}"
    );
}

#[test]
fn liberatid_run_mode_fails_for_validation_errors() {
    let temp = tempfile::tempdir().expect("temp dir");
    let config_path = write_validation_error_config(temp.path(), "run-validation-error.toml");
    let output = run_liberatid(
        &["--config", config_path.to_str().expect("utf8 path"), "run"],
        None,
    );
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success(), "run mode should fail");
    assert!(
        stderr.contains("配置验证失败"),
        "unexpected stderr: {stderr}"
    );
}

#[test]
fn liberatid_stats_cleanup_and_reset_on_sqlite() {
    let temp = tempfile::tempdir().expect("temp dir");
    let config_path = write_valid_config(temp.path(), "config.toml");
    let config_arg = config_path.to_str().expect("utf8 path");

    let output = run_liberatid(&["--config", config_arg, "stats"], None);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        output.status.success(),
        "stats should succeed, stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(stdout.contains(r#""backend": "SQLite""#), "stdout: {stdout}");
    assert!(stdout.contains(r#""associations": 0"#), "stdout: {stdout}");
    assert!(stdout.contains(r#""nonces": 0"#), "stdout: {stdout}");
    assert!(temp.path().join("data").join("liberatid.db").exists());

    let output = run_liberatid(&["--config", config_arg, "cleanup"], None);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "cleanup should succeed");
    assert!(
        stdout.contains("Removed 0 expired nonces and 0 expired associations"),
        "stdout: {stdout}"
    );

    let output = run_liberatid(&["--config", config_arg, "reset"], None);
    assert!(output.status.success(), "reset should succeed");
    assert!(String::from_utf8_lossy(&output.stdout).contains("have been cleared"));
}
