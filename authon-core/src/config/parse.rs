//! TOML-subset configuration loader
//!
//! Handles only what the SWI configuration needs. It does NOT support the
//! full TOML grammar.
//!
//! Supported:
//! - `key = value` pairs (string, integer, boolean)
//! - `[section]` and `[section.name]` headers
//! - Comments (`# ...`), inline or on their own line
//!
//! Each `[interface]` (or `[[interface]]`) header starts a new interface.
//! Poll budgets live in `[poll.nvm]`, `[poll.mac]`, `[poll.ecc]` and `[poll.lsc]`.
//!
//! ```toml
//! power_mode = "direct"
//! search_mode = "multi"
//!
//! [[interface]]
//! gpio = 15
//! tau_low_us = 10
//! tau_high_us = 30
//! tau_stop_us = 50
//!
//! [poll.nvm]
//! attempts = 50
//! interval_us = 1000
//! ```

use super::{InterfaceConfig, PowerMode, SwiConfig};
use crate::bus::PollBudget;
use crate::search::SearchMode;

/// Parse error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ParseError {
    /// Unknown or malformed section header
    InvalidSection,
    /// Value of the wrong type or out of range
    InvalidValue,
    /// Too many interfaces
    TooManyItems,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PollKind {
    Nvm,
    Mac,
    Ecc,
    Lsc,
}

/// Current parsing context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Root,
    Interface,
    Poll(PollKind),
    HostAuth,
}

/// Parse configuration text on top of the defaults
pub fn parse_config(input: &str) -> Result<SwiConfig, ParseError> {
    let mut config = SwiConfig::new();
    let mut section = Section::Root;
    let mut current_interface: Option<InterfaceConfig> = None;
    let mut interfaces_seen = false;

    for line in input.lines() {
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if line.starts_with('[') && line.ends_with(']') {
            save_interface(&mut config, &mut current_interface)?;

            let header = &line[1..line.len() - 1];
            // `[[interface]]` is the array-of-tables spelling of `[interface]`
            let header = header
                .strip_prefix('[')
                .and_then(|h| h.strip_suffix(']'))
                .unwrap_or(header);
            section = parse_section_header(header)?;
            if section == Section::Interface {
                // Explicit interfaces replace the default one
                if !interfaces_seen {
                    config.interfaces.clear();
                    interfaces_seen = true;
                }
                current_interface = Some(InterfaceConfig::default());
            }
            continue;
        }

        if let Some((key, value)) = parse_key_value(line) {
            apply_value(section, key, value, &mut config, &mut current_interface)?;
        }
    }

    save_interface(&mut config, &mut current_interface)?;
    Ok(config)
}

fn parse_section_header(header: &str) -> Result<Section, ParseError> {
    match header.trim() {
        "interface" => Ok(Section::Interface),
        "host_auth" => Ok(Section::HostAuth),
        "poll.nvm" => Ok(Section::Poll(PollKind::Nvm)),
        "poll.mac" => Ok(Section::Poll(PollKind::Mac)),
        "poll.ecc" => Ok(Section::Poll(PollKind::Ecc)),
        "poll.lsc" => Ok(Section::Poll(PollKind::Lsc)),
        _ => Err(ParseError::InvalidSection),
    }
}

/// Parse a "key = value" line
fn parse_key_value(line: &str) -> Option<(&str, &str)> {
    let eq_pos = line.find('=')?;
    let key = line[..eq_pos].trim();
    let value = line[eq_pos + 1..].trim();

    // Strip an inline comment unless the # sits inside a string
    let value = match value.find('#') {
        Some(hash_pos) if value[..hash_pos].matches('"').count() % 2 == 0 => {
            value[..hash_pos].trim()
        }
        _ => value,
    };

    if key.is_empty() || value.is_empty() {
        return None;
    }
    Some((key, value))
}

/// Strip surrounding quotes
fn parse_string(value: &str) -> &str {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

fn parse_int<T: core::str::FromStr>(value: &str) -> Result<T, ParseError> {
    value.parse().map_err(|_| ParseError::InvalidValue)
}

fn parse_power_mode(value: &str) -> Result<PowerMode, ParseError> {
    match parse_string(value) {
        "direct" => Ok(PowerMode::Direct),
        "indirect" => Ok(PowerMode::Indirect),
        _ => Err(ParseError::InvalidValue),
    }
}

fn parse_search_mode(value: &str) -> Result<SearchMode, ParseError> {
    match parse_string(value) {
        "single" => Ok(SearchMode::Single),
        "multi" => Ok(SearchMode::Multi),
        _ => Err(ParseError::InvalidValue),
    }
}

/// Parse a pin like `15`, `"gpio15"` or `gpio15`
fn parse_gpio(value: &str) -> Result<u8, ParseError> {
    let value = parse_string(value);
    let digits = value.strip_prefix("gpio").unwrap_or(value);
    parse_int(digits)
}

fn apply_value(
    section: Section,
    key: &str,
    value: &str,
    config: &mut SwiConfig,
    current_interface: &mut Option<InterfaceConfig>,
) -> Result<(), ParseError> {
    match section {
        Section::Root => match key {
            "active_interface" => config.active_interface = parse_int(value)?,
            "power_mode" => config.power_mode = parse_power_mode(value)?,
            "search_mode" => config.search_mode = parse_search_mode(value)?,
            "device_capacity" => config.device_capacity = parse_int(value)?,
            "init_retries" => config.init_retries = parse_int(value)?,
            "ecc_fixed_wait_us" => config.ecc_fixed_wait_us = parse_int(value)?,
            "interrupt_timeout_us" => config.interrupt_timeout_us = parse_int(value)?,
            _ => {}
        },
        Section::Interface => {
            let iface = current_interface
                .as_mut()
                .ok_or(ParseError::InvalidSection)?;
            match key {
                "gpio" | "pin" => iface.gpio = parse_gpio(value)?,
                "tau" | "tau_us" => {
                    iface.timing = super::TimingProfile::from_tau(parse_int(value)?)
                }
                "tau_low_us" => iface.timing.tau_low_us = parse_int(value)?,
                "tau_high_us" => iface.timing.tau_high_us = parse_int(value)?,
                "tau_stop_us" => iface.timing.tau_stop_us = parse_int(value)?,
                "response_timeout_us" => iface.response_timeout_us = parse_int(value)?,
                _ => {}
            }
        }
        Section::Poll(kind) => {
            let budget: &mut PollBudget = match kind {
                PollKind::Nvm => &mut config.nvm_poll,
                PollKind::Mac => &mut config.mac_poll,
                PollKind::Ecc => &mut config.ecc_poll,
                PollKind::Lsc => &mut config.lsc_poll,
            };
            match key {
                "attempts" => budget.attempts = parse_int(value)?,
                "interval_us" => budget.interval_us = parse_int(value)?,
                _ => {}
            }
        }
        Section::HostAuth => match key {
            "nonce_a_settle_us" => config.host_auth.nonce_a_settle_us = parse_int(value)?,
            "nonce_b_settle_us" => config.host_auth.nonce_b_settle_us = parse_int(value)?,
            "tag_a_settle_us" => config.host_auth.tag_a_settle_us = parse_int(value)?,
            "tag_b_settle_us" => config.host_auth.tag_b_settle_us = parse_int(value)?,
            _ => {}
        },
    }
    Ok(())
}

fn save_interface(
    config: &mut SwiConfig,
    current_interface: &mut Option<InterfaceConfig>,
) -> Result<(), ParseError> {
    if let Some(iface) = current_interface.take() {
        config
            .interfaces
            .push(iface)
            .map_err(|_| ParseError::TooManyItems)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_value() {
        assert_eq!(parse_key_value("gpio = 15"), Some(("gpio", "15")));
        assert_eq!(
            parse_key_value("mode = \"multi\" # trie search"),
            Some(("mode", "\"multi\""))
        );
        assert_eq!(parse_key_value("label = \"a#b\""), Some(("label", "\"a#b\"")));
        assert_eq!(parse_key_value("novalue ="), None);
    }

    #[test]
    fn test_parse_gpio() {
        assert_eq!(parse_gpio("15"), Ok(15));
        assert_eq!(parse_gpio("\"gpio4\""), Ok(4));
        assert_eq!(parse_gpio("gpioX"), Err(ParseError::InvalidValue));
    }

    #[test]
    fn test_parse_full_config() {
        let text = r#"
# Dual battery pack
active_interface = 1
power_mode = "indirect"
search_mode = "single"
device_capacity = 2
init_retries = 5

[interface]
gpio = "gpio15"
tau = 12

[[interface]]
gpio = 16
tau_low_us = 8
tau_high_us = 24
tau_stop_us = 40
response_timeout_us = 2000

[poll.nvm]
attempts = 10
interval_us = 500

[host_auth]
tag_a_settle_us = 750
"#;
        let config = parse_config(text).unwrap();
        assert_eq!(config.interfaces.len(), 2);
        assert_eq!(config.interfaces[0].gpio, 15);
        assert_eq!(config.interfaces[0].timing.tau_high_us, 36);
        assert_eq!(config.interfaces[1].timing.tau_stop_us, 40);
        assert_eq!(config.interfaces[1].response_timeout_us, 2000);
        assert_eq!(config.active().map(|i| i.gpio), Some(16));
        assert_eq!(config.power_mode, PowerMode::Indirect);
        assert_eq!(config.search_mode, SearchMode::Single);
        assert_eq!(config.device_capacity, 2);
        assert_eq!(config.init_retries, 5);
        assert_eq!(config.nvm_poll, PollBudget::new(10, 500));
        assert_eq!(config.mac_poll, SwiConfig::new().mac_poll);
        assert_eq!(config.host_auth.tag_a_settle_us, 750);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_input_gives_defaults() {
        assert_eq!(parse_config(""), Ok(SwiConfig::new()));
    }

    #[test]
    fn test_errors() {
        assert_eq!(parse_config("[motor]"), Err(ParseError::InvalidSection));
        assert_eq!(
            parse_config("power_mode = \"battery\""),
            Err(ParseError::InvalidValue)
        );
        assert_eq!(
            parse_config("[interface]\n[interface]\n[interface]\n"),
            Err(ParseError::TooManyItems)
        );
    }
}
