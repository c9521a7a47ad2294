use procwarden::config::{GlobalConfig, ROOT_PASSWORD_ENV};
use procwarden::AppError;

fn sample_toml(workspace: &str) -> String {
    format!(
        r#"
name = "jarvis"
working_dir = '{workspace}'
data_dir = "fileio"
logs_dir = "logs"
log_retention_days = 14
volume = 70
title = "boss"

[server]
host = "127.0.0.1"
port = 5000
entry_asset = "static/index.html"

[ipc]
name = "jarvis-ctl"

[restart]
poll_seconds = 2

[hygiene]
cache_dir_name = "__pycache__"
exempt_extension = "cid"

[keywords]
ok = ["yes", "affirmative"]
restart = ["restart"]
shutdown = ["shutdown"]
sleep = ["sleep"]
sentry = ["sentry"]
kill = ["kill"]

[[background]]
name = "mirror"
command = ["python", "mirror.py"]

[[background]]
name = "telegram-bot"
command = ["node", "bot.js", "--quiet"]
"#
    )
}

fn minimal_toml(workspace: &str) -> String {
    format!("working_dir = '{workspace}'\n")
}

#[test]
fn parses_valid_config() {
    let temp = tempfile::tempdir().expect("tempdir");
    let toml = sample_toml(temp.path().to_str().expect("utf8 path"));

    let config = GlobalConfig::from_toml_str(&toml).expect("config parses");

    assert_eq!(config.name, "jarvis");
    assert_eq!(config.title, "boss");
    assert_eq!(config.volume, 70);
    assert_eq!(config.server.port, 5000);
    assert_eq!(config.ipc.name, "jarvis-ctl");
    assert_eq!(config.restart.poll_seconds, 2);
    assert_eq!(config.hygiene.cache_dir_name, "__pycache__");
    assert_eq!(config.keywords.ok, vec!["yes".to_owned(), "affirmative".to_owned()]);
    assert_eq!(config.background.len(), 2);
    assert_eq!(config.background[1].command, vec!["node", "bot.js", "--quiet"]);

    let root = temp.path().canonicalize().expect("canonical");
    assert_eq!(config.working_dir, root);
    assert_eq!(config.entry_asset(), root.join("static").join("index.html"));
    assert_eq!(config.db_path(), root.join("fileio").join("database.db"));
    assert_eq!(config.registry_path(), root.join("fileio").join("processes.json"));
    assert_eq!(config.container_id_path(), root.join("fileio").join("speech_synthesis.cid"));
    assert_eq!(config.ipc_token_path(), root.join("fileio").join("ipc.token"));
    assert_eq!(config.logs_dir(), root.join("logs"));
}

#[test]
fn minimal_config_uses_defaults() {
    let temp = tempfile::tempdir().expect("tempdir");
    let toml = minimal_toml(temp.path().to_str().expect("utf8 path"));

    let config = GlobalConfig::from_toml_str(&toml).expect("config parses");

    assert_eq!(config.name, "procwarden");
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.port, 4483);
    assert_eq!(config.ipc.name, "procwarden");
    assert_eq!(config.log_retention_days, 10);
    assert_eq!(config.restart.poll_seconds, 5);
    assert_eq!(config.hygiene.cache_dir_name, "__cache__");
    assert!(config.keywords.restart.contains(&"restart".to_owned()));
    assert!(config.background.is_empty());
}

#[test]
fn absolute_paths_are_not_rebased() {
    let temp = tempfile::tempdir().expect("tempdir");
    let elsewhere = tempfile::tempdir().expect("tempdir");
    let toml = format!(
        "working_dir = '{}'\nlogs_dir = '{}'\n",
        temp.path().display(),
        elsewhere.path().display()
    );

    let config = GlobalConfig::from_toml_str(&toml).expect("config parses");

    assert_eq!(config.logs_dir(), elsewhere.path());
}

#[test]
fn rejects_out_of_range_retention() {
    let temp = tempfile::tempdir().expect("tempdir");
    let toml = format!(
        "working_dir = '{}'\nlog_retention_days = 90\n",
        temp.path().display()
    );

    let result = GlobalConfig::from_toml_str(&toml);
    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
fn rejects_background_process_named_like_the_controller() {
    let temp = tempfile::tempdir().expect("tempdir");
    let toml = format!(
        "working_dir = '{}'\n\n[[background]]\nname = \"procwarden\"\ncommand = [\"true\"]\n",
        temp.path().display()
    );

    let result = GlobalConfig::from_toml_str(&toml);
    assert!(matches!(result, Err(AppError::Config(msg)) if msg.contains("controller name")));
}

#[test]
fn rejects_empty_background_command() {
    let temp = tempfile::tempdir().expect("tempdir");
    let toml = format!(
        "working_dir = '{}'\n\n[[background]]\nname = \"mirror\"\ncommand = []\n",
        temp.path().display()
    );

    assert!(matches!(
        GlobalConfig::from_toml_str(&toml),
        Err(AppError::Config(_))
    ));
}

#[test]
fn rejects_zero_poll_interval_and_loud_volume() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path().display();

    let zero_poll = format!("working_dir = '{root}'\n\n[restart]\npoll_seconds = 0\n");
    assert!(GlobalConfig::from_toml_str(&zero_poll).is_err());

    let loud = format!("working_dir = '{root}'\nvolume = 101\n");
    assert!(GlobalConfig::from_toml_str(&loud).is_err());
}

#[test]
fn rejects_missing_working_dir() {
    let temp = tempfile::tempdir().expect("tempdir");
    let toml = minimal_toml(temp.path().join("gone").to_str().expect("utf8 path"));

    let result = GlobalConfig::from_toml_str(&toml);
    assert!(matches!(result, Err(AppError::Config(msg)) if msg.contains("working_dir")));
}

#[test]
fn rejects_malformed_toml() {
    let result = GlobalConfig::from_toml_str("name = [");
    assert!(matches!(result, Err(AppError::Config(msg)) if msg.starts_with("invalid config")));
}

#[test]
fn load_from_missing_path_is_a_config_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let result = GlobalConfig::load_from_path(temp.path().join("missing.toml"));
    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
#[serial_test::serial]
fn root_password_comes_from_the_environment() {
    std::env::set_var(ROOT_PASSWORD_ENV, "hunter2");
    assert_eq!(GlobalConfig::root_password().as_deref(), Some("hunter2"));

    std::env::set_var(ROOT_PASSWORD_ENV, "");
    assert_eq!(GlobalConfig::root_password(), None);

    std::env::remove_var(ROOT_PASSWORD_ENV);
    assert_eq!(GlobalConfig::root_password(), None);
}
