//! Configuration loading from files and the environment.

use std::io::Write;

use sluice::config::SluiceConfig;
use sluice::ratelimit::LeakyBucket;
use tempfile::NamedTempFile;

fn write_config(yaml: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".yaml")
        .tempfile()
        .expect("Failed to create temp config file");
    file.write_all(yaml.as_bytes()).expect("Failed to write config");
    file.flush().expect("Failed to flush config");
    file
}

// Environment variables are process-wide, so every case that reads them lives
// in this one test.
#[test]
fn test_file_then_environment_layering() {
    let file = write_config(
        r#"
limiter:
  max_rate: 120
  time_period_secs: 30
batch:
  max_in_flight: 8
"#,
    );

    let config = SluiceConfig::load(Some(file.path())).unwrap();
    assert_eq!(config.limiter.max_rate, 120.0);
    assert_eq!(config.limiter.time_period_secs, 30.0);
    assert_eq!(config.batch.max_in_flight, 8);
    assert_eq!(config.batch.max_retry_rounds, 5);

    std::env::set_var("SLUICE__LIMITER__MAX_RATE", "60");
    let config = SluiceConfig::load(Some(file.path())).unwrap();
    std::env::remove_var("SLUICE__LIMITER__MAX_RATE");
    assert_eq!(config.limiter.max_rate, 60.0);
    assert_eq!(config.limiter.time_period_secs, 30.0);

    let config = SluiceConfig::load(None).unwrap();
    assert_eq!(config.limiter.max_rate, 500.0);

    let limiter = LeakyBucket::from_config(&config.limiter).unwrap();
    assert_eq!(limiter.max_rate(), 500.0);
}

#[test]
fn test_from_file_rejects_invalid_limits() {
    let file = write_config(
        r#"
limiter:
  time_period_secs: 0
"#,
    );
    assert!(SluiceConfig::from_file(file.path()).is_err());
}
