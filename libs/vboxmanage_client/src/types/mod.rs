use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::error::VBoxParseError;

pub mod pfrule;
pub mod sfolder;
pub mod vm;

pub trait FromCliOutput: Sized {
    fn from_cli_output(output: &str) -> Result<Self, VBoxParseError>;
}

// unquoted keys never contain ':' so `Name:   a=b` stays a colon line
static RE_EQ_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^(?:"([^"]*)"|([^=":]+))=(.*)$"#).unwrap());
static RE_COLON_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^:]+):\s+(.*)$").unwrap());
static RE_VM_NAME_UUID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^"(.+)" \{([0-9a-fA-F-]+)\}$"#).unwrap());

/// A single `key=value` pair read from one output line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Property<'a> {
    pub key: &'a str,
    pub value: &'a str,
}

/// Splits one line of `--machinereadable` output into key and value.
///
/// Accepts `key=value` with optional double quotes around either side, and the
/// `key: value` form. Returns `None` for blank lines and anything else that is
/// not a property.
pub fn parse_property_line(line: &str) -> Option<Property<'_>> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return None;
    }

    if let Some(caps) = RE_EQ_LINE.captures(line) {
        let key = caps.get(1).or_else(|| caps.get(2))?.as_str();
        let value = caps.get(3).map_or("", |m| m.as_str());
        return Some(Property {
            key: key.trim(),
            value: unquote(value),
        });
    }

    let caps = RE_COLON_LINE.captures(line)?;
    Some(Property {
        key: caps.get(1)?.as_str().trim(),
        value: unquote(caps.get(2).map_or("", |m| m.as_str()).trim_end()),
    })
}

/// Iterates over all property lines of an output blob, skipping everything else.
pub fn properties(output: &str) -> impl Iterator<Item = Property<'_>> {
    output.lines().filter_map(parse_property_line)
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

/// A registered machine as printed by `VBoxManage list vms`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VmRef {
    pub name: String,
    pub uuid: String,
}

impl FromCliOutput for Vec<VmRef> {
    fn from_cli_output(output: &str) -> Result<Vec<VmRef>, VBoxParseError> {
        let mut vms = vec![];

        for line in output.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let caps = RE_VM_NAME_UUID
                .captures(line)
                .ok_or_else(|| VBoxParseError::malformed("vm", line, "expected \"name\" {uuid}"))?;
            vms.push(VmRef {
                name: caps[1].to_string(),
                uuid: caps[2].to_string(),
            });
        }

        Ok(vms)
    }
}
