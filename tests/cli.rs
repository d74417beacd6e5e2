use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn bridge_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("bridge");
    path
}

const CATALOG: &str = "\
FedRAMP High Baseline,,,,,,,,,,
Count,SortID,Family,ControlID,ControlName,ControlDescription,Baseline,Justification,Assignment,Requirements,Parameter
1,AC-01,ACCESS CONTROL,AC-1,Access Control Policy and Procedures,Develop and disseminate an access control policy.,x,,,,
2,AC-02,ACCESS CONTROL,AC-2,Account Management,Manage information system accounts.,x,,,,
,,,,,,,,,,
";

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(root.join("controls.csv"), CATALOG).unwrap();

    let config_content = format!(
        r#"[embedding]
provider = "hashing"
dims = 1024

[retrieval]
index_path = "{root}/data/controls.index"
contents_path = "{root}/data/controls.json"
top_k = 2

[rag]
data_dir = "{root}/data/uploads"
db_path = "{root}/data/vectors.sqlite"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("bridge.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_bridge(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = bridge_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("CISCO_CLIENT_ID")
        .env_remove("CISCO_CLIENT_SECRET")
        .env_remove("CISCO_APP_KEY")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run bridge binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_bridge(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/vectors.sqlite").exists());

    let (_, _, again) = run_bridge(&config_path, &["init"]);
    assert!(again, "second init failed (not idempotent)");
}

#[test]
fn test_index_build_then_retrieve() {
    let (tmp, config_path) = setup_test_env();
    let csv = tmp.path().join("controls.csv");

    let (stdout, stderr, success) =
        run_bridge(&config_path, &["index", "build", "--csv", csv.to_str().unwrap()]);
    assert!(success, "index build failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Indexed 2 controls"));

    let (stdout, stderr, success) =
        run_bridge(&config_path, &["retrieve", "access control policy", "--k", "1"]);
    assert!(success, "retrieve failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("1. [distance:"));
    assert!(stdout.contains("AC-1 - Access Control Policy and Procedures"));
    assert!(!stdout.contains("AC-2"));
}

#[test]
fn test_retrieve_without_index_fails() {
    let (_tmp, config_path) = setup_test_env();
    let (_, stderr, success) = run_bridge(&config_path, &["retrieve", "anything"]);
    assert!(!success);
    assert!(stderr.contains("controls.index"), "stderr={}", stderr);
}

#[test]
fn test_train_and_ask_need_documents() {
    let (tmp, config_path) = setup_test_env();
    fs::create_dir_all(tmp.path().join("data/uploads")).unwrap();

    let (_, stderr, success) = run_bridge(&config_path, &["train"]);
    assert!(!success);
    assert!(stderr.contains("No supported documents found."), "stderr={}", stderr);

    let (_, _, success) = run_bridge(&config_path, &["ask", "what is AC-1?"]);
    assert!(!success, "ask must fail without a trained store");
}

#[test]
fn test_chat_without_credentials_fails() {
    let (_tmp, config_path) = setup_test_env();
    let (_, stderr, success) = run_bridge(&config_path, &["chat", "hello"]);
    assert!(!success);
    assert!(stderr.contains("Missing credentials"), "stderr={}", stderr);
}

#[test]
fn test_poll_without_confluence_section_fails() {
    let (_tmp, config_path) = setup_test_env();
    let (_, stderr, success) = run_bridge(&config_path, &["poll"]);
    assert!(!success);
    assert!(stderr.contains("[confluence]"), "stderr={}", stderr);
}

#[test]
fn test_help_lists_commands() {
    let output = Command::new(bridge_binary()).arg("--help").output().unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    for command in ["init", "index", "retrieve", "chat", "fedramp", "session", "train", "ask", "poll", "serve"] {
        assert!(stdout.contains(command), "missing {} in help", command);
    }
}

#[test]
fn test_session_defaults_to_expert_system_prompt() {
    let output = Command::new(bridge_binary())
        .args(["session", "--help"])
        .output()
        .unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(
        stdout.contains("You are a FedRAMP certification expert"),
        "stdout={}",
        stdout
    );
}
