//! Tests for configuration

#[cfg(test)]
mod tests {
    use super::super::config::*;
    use crate::types::{MarginPolicy, Timing};
    use rust_decimal_macros::dec;
    use std::path::PathBuf;

    #[test]
    fn test_session_config_default() {
        let config = SessionConfig::default();
        assert_eq!(config.lot_size, 100);
        assert_eq!(config.initial_assets, dec!(10000000));
        assert_eq!(config.margin_policy, MarginPolicy::Forbidden);
        assert_eq!(config.history_capacity, 25);
        assert_eq!(config.list_limit, 10);
        assert_eq!(config.timings, vec![Timing::Close, Timing::NextOpen]);
    }

    #[test]
    fn test_data_config_default() {
        let config = DataConfig::default();
        assert_eq!(config.prices_dir, PathBuf::from("input/data/trv"));
        assert_eq!(config.output_dir, PathBuf::from("output"));
        assert_eq!(config.broker_dir, PathBuf::from("input"));
    }

    #[test]
    fn test_empty_toml_is_default() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.session.lot_size, 100);
        assert_eq!(config.data.output_dir, PathBuf::from("output"));
    }

    #[test]
    fn test_partial_session_section() {
        let toml_str = r#"
[session]
lot_size = 1
initial_assets = 3000000
margin_policy = "warning"
timings = ["next_open"]
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.session.lot_size, 1);
        assert_eq!(config.session.initial_assets, dec!(3000000));
        assert_eq!(config.session.margin_policy, MarginPolicy::Warning);
        assert_eq!(config.session.timings, vec![Timing::NextOpen]);
        assert_eq!(config.session.history_capacity, 25);
    }

    #[test]
    fn test_unknown_policy_rejected() {
        let toml_str = r#"
[session]
margin_policy = "yolo"
"#;
        assert!(toml::from_str::<Config>(toml_str).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("training.toml");
        std::fs::write(
            &path,
            r#"
[session]
list_limit = 30

[data]
output_dir = "/tmp/ledgers"
"#,
        )
        .unwrap();

        let config = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.session.list_limit, 30);
        assert_eq!(config.session.lot_size, 100);
        assert_eq!(config.data.output_dir, PathBuf::from("/tmp/ledgers"));
    }

    #[test]
    fn test_load_rejects_zero_lot_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[session]\nlot_size = 0\n").unwrap();
        assert!(Config::load(path.to_str().unwrap()).is_err());
    }
}
