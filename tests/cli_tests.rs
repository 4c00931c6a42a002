#[cfg(test)]
mod tests {
    use beatclockrs::cli::{format_port_list, Args};
    use clap::Parser;

    #[test]
    fn test_args_defaults() {
        let args = Args::parse_from(["test"]);
        assert!(args.rule_files.is_empty());
        assert!(!args.virtual_port);
        assert!(!args.list_ports);
        assert!(args.outputs.is_empty());
        assert_eq!(args.config, None);
        assert_eq!(args.bpm, None);
    }

    #[test]
    fn test_args_with_rule_files_and_outputs() {
        let args = Args::parse_from([
            "test",
            "live",
            "pads.json",
            "--output",
            "USB",
            "--output",
            "Through",
            "--bpm",
            "98.5",
        ]);
        assert_eq!(args.rule_files, vec!["live", "pads.json"]);
        assert_eq!(args.outputs, vec!["USB", "Through"]);
        assert_eq!(args.bpm, Some(98.5));
    }

    #[test]
    fn test_args_virtual_port_and_config() {
        let args = Args::parse_from([
            "test",
            "--vp-out",
            "Clock Out",
            "--config",
            "/tmp/beatclock.conf.json",
        ]);
        assert_eq!(args.vp_out.as_deref(), Some("Clock Out"));
        assert_eq!(args.config.as_deref(), Some("/tmp/beatclock.conf.json"));
        assert_eq!(
            args.virtual_port_name("beatclock_OUT").as_deref(),
            Some("Clock Out")
        );
    }

    #[test]
    fn test_invalid_bpm_is_rejected() {
        assert!(Args::try_parse_from(["test", "--bpm", "fast"]).is_err());
    }

    #[test]
    fn test_port_list_formatting() {
        let listing = format_port_list("MIDI outputs", &["A".to_string(), "B".to_string()]);
        assert_eq!(listing, "MIDI outputs:\n  0: A\n  1: B\n");
        assert_eq!(
            format_port_list("MIDI inputs", &[]),
            "MIDI inputs:\n  (none)\n"
        );
    }
}
