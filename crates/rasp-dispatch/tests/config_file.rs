#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::io::Write;

use rasp_dispatch::{
    CheckContext, DispatchConfig, Dispatcher, Error, RequestQueueConfig, DEFAULT_CHECKPOINTS,
};
use serde_json::json;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn loads_dispatcher_from_yaml_file() {
    let file = write_config(
        r#"
checkpoints:
  - sql
  - command
  - graphql
max_pending_depth: 3
resolve_timeout_ms: 250
request_queue:
  pool_size: 2
"#,
    );

    let config = DispatchConfig::from_yaml_file(file.path()).unwrap();
    assert_eq!(config.checkpoints, vec!["sql", "command", "graphql"]);
    assert_eq!(config.max_pending_depth, 3);
    assert_eq!(
        config.resolve_timeout(),
        Some(std::time::Duration::from_millis(250))
    );
    assert_eq!(
        config.request_queue,
        RequestQueueConfig {
            pool_size: 2,
            queue_capacity: 100,
        }
    );

    let d = Dispatcher::from_config(&config).unwrap();
    assert!(d
        .check("graphql", &json!({}), &CheckContext::new())
        .unwrap()
        .is_empty());
    assert!(matches!(
        d.check("readFile", &json!({}), &CheckContext::new()),
        Err(Error::UnknownCheckpoint(_))
    ));
}

#[test]
fn empty_file_means_defaults() {
    let file = write_config("{}\n");
    let config = DispatchConfig::from_yaml_file(file.path()).unwrap();
    assert_eq!(config, DispatchConfig::default());
    assert_eq!(config.checkpoints.len(), DEFAULT_CHECKPOINTS.len());
}

#[test]
fn invalid_file_reports_every_problem() {
    let file = write_config(
        r#"
checkpoints: [sql, "", sql]
max_pending_depth: 0
request_queue:
  queue_capacity: 0
"#,
    );

    let err = DispatchConfig::from_yaml_file(file.path()).unwrap_err();
    let validation = match err {
        Error::ConfigValidation(validation) => validation,
        other => panic!("expected validation error, got {other:?}"),
    };
    let paths: Vec<&str> = validation.paths().collect();
    assert_eq!(
        paths,
        vec![
            "checkpoints[1]",
            "checkpoints[2]",
            "max_pending_depth",
            "request_queue.queue_capacity",
        ]
    );
    assert_eq!(validation.rejected_checkpoints(), vec![1, 2]);
}

#[test]
fn unknown_keys_are_rejected() {
    let file = write_config("checkpoints: [sql]\nfail_open: true\n");
    assert!(matches!(
        DispatchConfig::from_yaml_file(file.path()),
        Err(Error::Yaml(_))
    ));
}

#[test]
fn missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = DispatchConfig::from_yaml_file(dir.path().join("absent.yaml")).unwrap_err();
    assert!(matches!(err, Error::Io(_)));
}

#[test]
fn yaml_round_trip_preserves_config() {
    let config = DispatchConfig {
        resolve_timeout_ms: Some(10),
        ..DispatchConfig::default()
    };
    let yaml = config.to_yaml().unwrap();
    assert_eq!(DispatchConfig::from_yaml(&yaml).unwrap(), config);
}
