//! Kernel command-line parsing (§6, "CLI / command line").
//!
//! Limine hands the kernel a single UTF-8 string (≤512 B) of
//! space-separated `key=value` tokens. This module turns that into a typed
//! [`BootConfig`], falling back to documented defaults for anything absent
//! or malformed.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItestMode {
    Off,
    All,
    Basic,
    Memory,
    Control,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Summary,
    Verbose,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootConfig {
    pub itests: ItestMode,
    pub itests_verbosity: Verbosity,
    pub itests_timeout_ms: u32,
    pub itests_shutdown: bool,
}

impl Default for BootConfig {
    fn default() -> Self {
        BootConfig {
            itests: ItestMode::Off,
            itests_verbosity: Verbosity::Summary,
            itests_timeout_ms: 5_000,
            itests_shutdown: false,
        }
    }
}

/// Parse a Limine command line into a [`BootConfig`].
///
/// Unknown keys are ignored; malformed values keep the prior (default)
/// field rather than aborting the whole parse.
pub fn parse(cmdline: &str) -> BootConfig {
    let mut cfg = BootConfig::default();
    for token in cmdline.split_whitespace() {
        let Some((key, value)) = token.split_once('=') else {
            continue;
        };
        match key {
            "itests" => {
                if let Some(mode) = parse_itests(value) {
                    cfg.itests = mode;
                }
            }
            "itests.verbosity" => {
                if let Some(v) = parse_verbosity(value) {
                    cfg.itests_verbosity = v;
                }
            }
            "itests.timeout" => {
                if let Ok(ms) = value.parse::<u32>() {
                    cfg.itests_timeout_ms = ms;
                }
            }
            "itests.shutdown" => {
                cfg.itests_shutdown = value == "on";
            }
            _ => {}
        }
    }
    cfg
}

fn parse_itests(value: &str) -> Option<ItestMode> {
    Some(match value {
        "all" => ItestMode::All,
        "basic" => ItestMode::Basic,
        "memory" => ItestMode::Memory,
        "control" => ItestMode::Control,
        "off" => ItestMode::Off,
        _ => return None,
    })
}

fn parse_verbosity(value: &str) -> Option<Verbosity> {
    Some(match value {
        "quiet" => Verbosity::Quiet,
        "summary" => Verbosity::Summary,
        "verbose" => Verbosity::Verbose,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_cmdline_yields_defaults() {
        let cfg = parse("");
        assert_eq!(cfg, BootConfig::default());
    }

    #[test]
    fn parses_known_keys() {
        let cfg = parse("itests=all itests.verbosity=verbose itests.timeout=2000");
        assert_eq!(cfg.itests, ItestMode::All);
        assert_eq!(cfg.itests_verbosity, Verbosity::Verbose);
        assert_eq!(cfg.itests_timeout_ms, 2000);
        assert!(!cfg.itests_shutdown);
    }

    #[test]
    fn unknown_keys_and_garbage_are_ignored() {
        let cfg = parse("bogus=yes itests=nonsense itests.timeout=notanumber");
        assert_eq!(cfg, BootConfig::default());
    }

    #[test]
    fn shutdown_flag_parses_on() {
        let cfg = parse("itests.shutdown=on");
        assert!(cfg.itests_shutdown);
    }
}
