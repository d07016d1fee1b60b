//! Binary-level smoke tests
//! Run with: cargo test --test cli

use std::io::Write;
use std::process::{Command, Stdio};

fn bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_keel-bot"))
}

#[test]
fn version_prints_package_version() {
    let output = bin().arg("version").output().expect("run keel-bot");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), format!("keel-bot v{}", env!("CARGO_PKG_VERSION")));
}

#[test]
fn init_config_prints_loadable_yaml() {
    let output = bin().arg("init-config").output().expect("run keel-bot");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("queue-limit: 256"));
    assert!(stdout.contains("workers: 4"));
}

#[test]
fn plugins_lists_start_order() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.yaml");
    std::fs::write(&config, "plugins:\n  disabled: [greet]\n").unwrap();

    let output = bin()
        .arg("--config")
        .arg(&config)
        .arg("plugins")
        .output()
        .expect("run keel-bot");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    let position = |name: &str| lines.iter().position(|l| l.starts_with(name)).unwrap();
    assert!(position("conf ") < position("exec_prompt "));
    assert!(lines[position("greet ")].contains("stopped"));
    assert!(lines[position("jobs ")].contains("dedicated-thread"));
}

#[test]
fn console_session_answers_and_exits_on_eof() {
    let dir = tempfile::tempdir().unwrap();
    let mut child = bin()
        .arg("--config")
        .arg(dir.path().join("missing.yaml"))
        .arg("--logfile")
        .arg(dir.path().join("bot.log"))
        .arg("run")
        .env("BOT_DB_PATH", dir.path().join("bot.db"))
        .env("BOT_WORKERS", "1")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn keel-bot");

    child
        .stdin
        .take()
        .expect("stdin")
        .write_all(b"conf set motd hello\nconf list\nwhat is this\n")
        .expect("write input");
    let output = child.wait_with_output().expect("wait");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("reacted :ok:"));
    assert!(stdout.contains("motd = hello"));
    assert!(stdout.contains("cannot understand what you wrote"));
}
