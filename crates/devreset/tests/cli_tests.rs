//! Integration tests for the command-line surface
//!
//! Only argument and configuration handling is exercised here; every case
//! fails (or exits) before the USB subsystem is initialized.

use std::process::{Command, Output};

fn devreset(args: &[&str]) -> Output {
    command(args).output().expect("failed to run devreset")
}

fn command(args: &[&str]) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_devreset"));
    command.args(args).env("RUST_LOG", "off");
    command
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

mod usage {
    use super::*;

    #[test]
    fn test_no_arguments_prints_usage() {
        let output = devreset(&[]);
        assert_eq!(output.status.code(), Some(1));
        assert!(stderr(&output).contains("Usage"));
    }

    #[test]
    fn test_single_argument_prints_usage() {
        let output = devreset(&["0x000a"]);
        assert_eq!(output.status.code(), Some(1));
        assert!(stderr(&output).contains("Usage"));
    }

    #[test]
    fn test_list_devices_with_single_id_is_rejected() {
        let output = devreset(&["--list-devices", "0x000a"]);
        assert_eq!(output.status.code(), Some(1));
        assert!(stderr(&output).contains("VENDOR_ID"));
    }

    #[test]
    fn test_usage_names_both_ids() {
        let output = devreset(&[]);
        let err = stderr(&output);
        assert!(err.contains("devreset [OPTIONS] <PRODUCT_ID> <VENDOR_ID>"), "stderr: {}", err);
        assert!(err.contains("--list-devices [<PRODUCT_ID> <VENDOR_ID>]"), "stderr: {}", err);
    }

    #[test]
    fn test_unknown_flag_exits_one() {
        let output = devreset(&["--frobnicate", "1", "2"]);
        assert_eq!(output.status.code(), Some(1));
    }

    #[test]
    fn test_help_exits_zero() {
        let output = devreset(&["--help"]);
        assert_eq!(output.status.code(), Some(0));
        assert!(stdout(&output).contains("PRODUCT_ID"));
    }
}

mod id_validation {
    use super::*;

    fn assert_rejected(product: &str, vendor: &str) {
        let output = devreset(&[product, vendor]);
        assert_eq!(
            output.status.code(),
            Some(1),
            "expected {} {} to be rejected",
            product,
            vendor
        );
        let err = stderr(&output);
        assert!(err.contains("Invalid productID or vendorID"), "stderr: {}", err);
        // Nothing was searched for
        assert!(!stdout(&output).contains("Looking for"));
    }

    #[test]
    fn test_zero_ids_rejected() {
        assert_rejected("0", "0x04d8");
        assert_rejected("0x000a", "0");
    }

    #[test]
    fn test_out_of_range_ids_rejected() {
        assert_rejected("0x10000", "0x04d8");
        assert_rejected("0x000a", "65536");
    }

    #[test]
    fn test_negative_ids_rejected() {
        assert_rejected("-1", "0x04d8");
    }

    #[test]
    fn test_non_numeric_ids_rejected() {
        assert_rejected("pickit", "microchip");
    }
}

mod configuration {
    use super::*;

    #[test]
    fn test_missing_explicit_config_exits_one() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");

        let output = devreset(&["--config", path.to_str().unwrap(), "0x000a", "0x04d8"]);

        assert_eq!(output.status.code(), Some(1));
        assert!(stderr(&output).contains("Failed to load configuration"));
    }

    // dirs::config_dir honours XDG_CONFIG_HOME on Linux only
    #[cfg(target_os = "linux")]
    #[test]
    fn test_invalid_default_config_exits_one() {
        let dir = tempfile::tempdir().unwrap();
        let config_dir = dir.path().join("devreset");
        std::fs::create_dir_all(&config_dir).unwrap();
        std::fs::write(config_dir.join("config.toml"), "[reset]\nmax_open_attempts = 0\n")
            .unwrap();

        let output = command(&["0x000a", "0x04d8"])
            .env("XDG_CONFIG_HOME", dir.path())
            .output()
            .expect("failed to run devreset");

        assert_eq!(output.status.code(), Some(1));
        assert!(stderr(&output).contains("Failed to load configuration"));
        // The search target is announced before configuration is read
        assert!(stdout(&output).starts_with("Looking for productID=0x000a vendorID=0x04d8"));
    }
}
