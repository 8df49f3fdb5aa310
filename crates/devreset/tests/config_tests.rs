//! Integration tests for configuration parsing
//!
//! Tests reset configuration handling, including:
//! - Full and partial config files
//! - Defaults for omitted fields
//! - Invalid configuration handling
//! - Save/load round-trips through the filesystem

use devreset::config::ResetConfig;
use std::time::Duration;

const FULL_CONFIG: &str = r#"
[general]
log_level = "debug"

[reset]
max_open_attempts = 10
retry_interval_ms = 500
detach_kernel_drivers = false
"#;

mod parsing {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config = ResetConfig::from_toml(FULL_CONFIG).unwrap();

        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.reset.max_open_attempts, 10);
        assert_eq!(config.reset.retry_interval_ms, 500);
        assert!(!config.reset.detach_kernel_drivers);

        let policy = config.reset.retry_policy();
        assert_eq!(policy.max_attempts, 10);
        assert_eq!(policy.interval, Duration::from_millis(500));
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = ResetConfig::from_toml("").unwrap();

        assert_eq!(config.general.log_level, "warn");
        assert_eq!(config.reset.max_open_attempts, 5);
        assert_eq!(config.reset.retry_interval_ms, 1000);
        assert!(config.reset.detach_kernel_drivers);
    }

    #[test]
    fn test_partial_section_uses_defaults() {
        let config = ResetConfig::from_toml("[reset]\nmax_open_attempts = 2\n").unwrap();

        assert_eq!(config.reset.max_open_attempts, 2);
        assert_eq!(config.reset.retry_interval_ms, 1000);
        assert_eq!(config.general.log_level, "warn");
    }
}

mod invalid {
    use super::*;

    #[test]
    fn test_invalid_log_level() {
        assert!(ResetConfig::from_toml("[general]\nlog_level = \"loud\"\n").is_err());
    }

    #[test]
    fn test_zero_attempts() {
        assert!(ResetConfig::from_toml("[reset]\nmax_open_attempts = 0\n").is_err());
    }

    #[test]
    fn test_excessive_interval() {
        assert!(ResetConfig::from_toml("[reset]\nretry_interval_ms = 3600000\n").is_err());
    }

    #[test]
    fn test_wrong_type() {
        assert!(ResetConfig::from_toml("[reset]\nmax_open_attempts = \"five\"\n").is_err());
    }

    #[test]
    fn test_malformed_toml() {
        assert!(ResetConfig::from_toml("[reset\nmax_open_attempts = 5").is_err());
    }
}

mod filesystem {
    use super::*;

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = ResetConfig::default();
        config.reset.max_open_attempts = 3;
        config.save(&path).unwrap();

        let loaded = ResetConfig::load(Some(path)).unwrap();
        assert_eq!(loaded.reset.max_open_attempts, 3);
        assert_eq!(loaded.general.log_level, "warn");
    }

    #[test]
    fn test_load_from_string_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, FULL_CONFIG).unwrap();

        let loaded = ResetConfig::load_from(path.to_str().unwrap()).unwrap();
        assert_eq!(loaded.reset.max_open_attempts, 10);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ResetConfig::load(Some(dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn test_load_invalid_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[reset]\nmax_open_attempts = 0\n").unwrap();

        assert!(ResetConfig::load(Some(path)).is_err());
    }
}

mod search_order {
    use super::*;

    #[test]
    fn test_no_existing_candidate_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let candidates = vec![dir.path().join("a.toml"), dir.path().join("b.toml")];

        let config = ResetConfig::load_first_existing(&candidates).unwrap();
        assert_eq!(config.reset.max_open_attempts, 5);
        assert_eq!(config.general.log_level, "warn");
    }

    #[test]
    fn test_invalid_existing_candidate_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("config.toml");
        std::fs::write(&bad, "[reset]\nmax_open_attempts = 0\n").unwrap();

        let result = ResetConfig::load_first_existing(&[dir.path().join("absent.toml"), bad]);
        assert!(result.is_err());
    }

    #[test]
    fn test_malformed_existing_candidate_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("config.toml");
        std::fs::write(&bad, "[reset\n").unwrap();

        assert!(ResetConfig::load_first_existing(&[bad]).is_err());
    }

    #[test]
    fn test_first_existing_candidate_wins() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.toml");
        let second = dir.path().join("second.toml");
        std::fs::write(&first, FULL_CONFIG).unwrap();
        std::fs::write(&second, "[reset]\nmax_open_attempts = 0\n").unwrap();

        let config = ResetConfig::load_first_existing(&[first, second]).unwrap();
        assert_eq!(config.reset.max_open_attempts, 10);
    }
}
