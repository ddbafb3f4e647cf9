//! Build script for authon-firmware
//!
//! - Sets up linker search paths for memory.x
//! - Validates authon.toml at compile time

use std::env;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Highest GPIO number on the RP2040
const MAX_GPIO: i64 = 29;

/// Pulse widths above these make devices drop the word
const TAU_LIMITS_US: [(&str, i64); 3] = [
    ("tau_low_us", 153),
    ("tau_high_us", 459),
    ("tau_stop_us", 765),
];

fn main() {
    setup_linker();
    validate_config();
}

/// Set up linker search paths for memory.x
fn setup_linker() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());

    let memory_x = include_bytes!("memory.x");
    let mut f = File::create(out_dir.join("memory.x")).unwrap();
    f.write_all(memory_x).unwrap();

    println!("cargo:rustc-link-search={}", out_dir.display());
    println!("cargo:rerun-if-changed=memory.x");
    println!("cargo:rerun-if-changed=build.rs");
}

/// Validate authon.toml at compile time
fn validate_config() {
    println!("cargo:rerun-if-changed=authon.toml");

    let config_path = Path::new("authon.toml");
    if !config_path.exists() {
        panic!(
            "\n\
            ╔══════════════════════════════════════════════════════════════════╗\n\
            ║  ERROR: authon.toml not found!                                   ║\n\
            ║                                                                  ║\n\
            ║  The firmware embeds authon.toml as its SWI configuration.       ║\n\
            ║  Please create one in the authon-firmware directory.             ║\n\
            ╚══════════════════════════════════════════════════════════════════╝\n"
        );
    }

    let content = match fs::read_to_string(config_path) {
        Ok(content) => content,
        Err(e) => panic!("\nERROR: Failed to read authon.toml: {}\n", e),
    };

    let config: toml::Value = match toml::from_str(&content) {
        Ok(value) => value,
        Err(e) => {
            panic!(
                "\n\
                ╔══════════════════════════════════════════════════════════════════╗\n\
                ║  ERROR: Invalid TOML syntax in authon.toml                       ║\n\
                ╠══════════════════════════════════════════════════════════════════╣\n\
                {}\n\
                ╚══════════════════════════════════════════════════════════════════╝\n",
                format_lines(&e.to_string().lines().map(String::from).collect::<Vec<_>>())
            );
        }
    };

    let mut errors = Vec::new();
    validate_root(&config, &mut errors);
    validate_interfaces(&config, &mut errors);
    validate_polls(&config, &mut errors);

    if !errors.is_empty() {
        panic!(
            "\n\
            ╔══════════════════════════════════════════════════════════════════╗\n\
            ║  ERROR: Invalid SWI configuration in authon.toml                 ║\n\
            ╠══════════════════════════════════════════════════════════════════╣\n\
            {}\n\
            ╚══════════════════════════════════════════════════════════════════╝\n",
            format_lines(&errors)
        );
    }

    println!("cargo:warning=authon.toml validated successfully");
}

/// Format lines with box drawing
fn format_lines(lines: &[String]) -> String {
    lines
        .iter()
        .map(|line| {
            let truncated = if line.len() > 62 {
                format!("{}...", &line[..59])
            } else {
                line.clone()
            };
            format!("║  • {:<62} ║", truncated)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn validate_root(config: &toml::Value, errors: &mut Vec<String>) {
    let allowed = [
        ("power_mode", &["direct", "indirect"][..]),
        ("search_mode", &["single", "multi"][..]),
    ];
    for (key, values) in allowed {
        match config.get(key) {
            Some(toml::Value::String(s)) if values.contains(&s.as_str()) => {}
            Some(_) => errors.push(format!("{} must be one of {:?}", key, values)),
            None => {}
        }
    }

    if let Some(toml::Value::Integer(n)) = config.get("device_capacity") {
        if !(1..=8).contains(n) {
            errors.push("device_capacity must be 1-8".to_string());
        }
    }
}

fn validate_interfaces(config: &toml::Value, errors: &mut Vec<String>) {
    let interfaces = match config.get("interface") {
        Some(toml::Value::Array(list)) => list.clone(),
        Some(toml::Value::Table(t)) => vec![toml::Value::Table(t.clone())],
        Some(_) => {
            errors.push("[[interface]] must be a table".to_string());
            return;
        }
        None => {
            errors.push("Missing [[interface]] section".to_string());
            return;
        }
    };

    if interfaces.len() > 2 {
        errors.push("at most two [[interface]] sections".to_string());
    }

    let active = config
        .get("active_interface")
        .and_then(|v| v.as_integer())
        .unwrap_or(0);
    if active < 0 || active as usize >= interfaces.len() {
        errors.push(format!("active_interface {} out of range", active));
    }

    for (i, iface) in interfaces.iter().enumerate() {
        match iface.get("gpio").and_then(|v| v.as_integer()) {
            Some(gpio) if (0..=MAX_GPIO).contains(&gpio) => {}
            Some(_) => errors.push(format!("interface {} gpio must be 0-{}", i, MAX_GPIO)),
            None => errors.push(format!("interface {} missing integer 'gpio'", i)),
        }

        let widths: Vec<i64> = TAU_LIMITS_US
            .iter()
            .filter_map(|(key, _)| iface.get(*key).and_then(|v| v.as_integer()))
            .collect();
        if widths.len() == TAU_LIMITS_US.len() && !(widths[0] < widths[1] && widths[1] < widths[2])
        {
            errors.push(format!("interface {} pulse widths must increase", i));
        }

        for (key, limit) in TAU_LIMITS_US {
            if let Some(width) = iface.get(key).and_then(|v| v.as_integer()) {
                if width <= 0 {
                    errors.push(format!("interface {} {} must be positive", i, key));
                } else if width > limit {
                    println!(
                        "cargo:warning=interface {} {} = {} exceeds {} us",
                        i, key, width, limit
                    );
                }
            }
        }
    }
}

fn validate_polls(config: &toml::Value, errors: &mut Vec<String>) {
    let Some(toml::Value::Table(polls)) = config.get("poll") else {
        return;
    };

    for (name, budget) in polls {
        if !["nvm", "mac", "ecc", "lsc"].contains(&name.as_str()) {
            errors.push(format!("unknown [poll.{}]", name));
            continue;
        }
        if let Some(attempts) = budget.get("attempts").and_then(|v| v.as_integer()) {
            if attempts <= 0 || attempts > u16::MAX as i64 {
                errors.push(format!("[poll.{}] attempts must be 1-65535", name));
            }
        }
    }
}
