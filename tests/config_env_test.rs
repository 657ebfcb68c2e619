use std::io::Write;
use std::time::Duration;
use telemetry_relay::Config;

#[test]
fn test_environment_overrides_file() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(b"[pool]\nmax_wait_ms = 100\n").unwrap();

    std::env::set_var("TELEMETRY_RELAY_POOL__MAX_WAIT_MS", "2500");
    std::env::set_var("TELEMETRY_RELAY_KAFKA__BROKERS", "a:9092,b:9092");
    let config = Config::from_file(file.path()).unwrap();
    std::env::remove_var("TELEMETRY_RELAY_POOL__MAX_WAIT_MS");
    std::env::remove_var("TELEMETRY_RELAY_KAFKA__BROKERS");

    assert_eq!(config.pool.max_wait(), Some(Duration::from_millis(2500)));
    assert_eq!(config.kafka.brokers, vec!["a:9092".to_string(), "b:9092".to_string()]);
}
