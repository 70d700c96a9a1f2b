use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::VBoxParseError;

use super::pfrule::{PortForwardingRule, PortForwardingTable};
use super::sfolder::{SharedFolder, SharedFolderTable};
use super::{properties, FromCliOutput};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MachineState {
    Poweroff,
    Running,
    Paused,
    Saved,
    Aborted,
    Starting,
    Stopping,
    #[default]
    Unknown,
    #[serde(untagged)]
    Other(String),
}

impl MachineState {
    /// whether settings changes must go through `modifyvm` rather than `controlvm`
    pub fn is_stopped(&self) -> bool {
        matches!(self, MachineState::Poweroff | MachineState::Aborted)
    }
}

impl FromStr for MachineState {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "poweroff" => MachineState::Poweroff,
            "running" => MachineState::Running,
            "paused" => MachineState::Paused,
            "saved" => MachineState::Saved,
            "aborted" => MachineState::Aborted,
            "starting" => MachineState::Starting,
            "stopping" => MachineState::Stopping,
            "" => MachineState::Unknown,
            other => MachineState::Other(other.to_string()),
        })
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MachineState::Poweroff => f.write_str("poweroff"),
            MachineState::Running => f.write_str("running"),
            MachineState::Paused => f.write_str("paused"),
            MachineState::Saved => f.write_str("saved"),
            MachineState::Aborted => f.write_str("aborted"),
            MachineState::Starting => f.write_str("starting"),
            MachineState::Stopping => f.write_str("stopping"),
            MachineState::Unknown => f.write_str("unknown"),
            MachineState::Other(s) => f.write_str(s),
        }
    }
}

/// What to do with a malformed forwarding or shared folder line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParsePolicy {
    /// log the line and keep going
    #[default]
    SkipMalformed,
    /// fail on the first malformed line
    Strict,
}

/// A machine as described by `VBoxManage showvminfo <vm> --machinereadable`.
#[derive(Debug, Clone, Default)]
pub struct Machine {
    pub name: String,
    pub uuid: String,
    pub state: MachineState,
    pub os_type: String,
    pub cpus: u32,
    pub memory_mb: u32,
    pub forwarding: PortForwardingTable,
    pub shared_folders: SharedFolderTable,
}

impl Machine {
    pub fn parse(output: &str, policy: ParsePolicy) -> Result<Machine, VBoxParseError> {
        let mut vm = Machine::default();

        for prop in properties(output) {
            let (key, value) = (prop.key, prop.value);

            let accepted = vm
                .forwarding
                .accept(key, value)
                .and_then(|_| vm.shared_folders.accept(key, value));
            if let Err(e) = accepted {
                match policy {
                    ParsePolicy::Strict => return Err(e),
                    ParsePolicy::SkipMalformed => {
                        tracing::warn!("Skipping malformed line: {}", e);
                        continue;
                    }
                }
            }

            match key {
                "name" | "Name" => vm.name = value.to_string(),
                "UUID" => vm.uuid = value.to_string(),
                "VMState" => vm.state = MachineState::from_str(value).unwrap_or_default(),
                "ostype" => vm.os_type = value.to_string(),
                "cpus" => vm.cpus = parse_number(key, value, policy)?.unwrap_or(vm.cpus),
                "memory" => vm.memory_mb = parse_number(key, value, policy)?.unwrap_or(vm.memory_mb),
                _ => {}
            }
        }

        Ok(vm)
    }

    pub fn pf_rule(&self, name: &str, guest_port: u16) -> Option<&PortForwardingRule> {
        self.forwarding.lookup(name, guest_port)
    }

    pub fn list_shared_folders(&self) -> Vec<SharedFolder> {
        self.shared_folders.list()
    }
}

fn parse_number(key: &str, value: &str, policy: ParsePolicy) -> Result<Option<u32>, VBoxParseError> {
    match u32::from_str(value) {
        Ok(n) => Ok(Some(n)),
        Err(e) => {
            let err = VBoxParseError::malformed(key, value, e.to_string());
            match policy {
                ParsePolicy::Strict => Err(err),
                ParsePolicy::SkipMalformed => {
                    tracing::warn!("Skipping malformed line: {}", err);
                    Ok(None)
                }
            }
        }
    }
}

impl FromCliOutput for Machine {
    /// create a new Machine from `showvminfo --machinereadable` stdout, skipping bad lines
    fn from_cli_output(output: &str) -> Result<Machine, VBoxParseError> {
        Machine::parse(output, ParsePolicy::SkipMalformed)
    }
}

/// Serializable snapshot of a [`Machine`], tables flattened into plain lists.
#[derive(Debug, Clone, Serialize)]
pub struct MachineSummary {
    pub name: String,
    pub uuid: String,
    pub state: MachineState,
    pub os_type: String,
    pub cpus: u32,
    pub memory_mb: u32,
    pub forwarding: Vec<NamedRule>,
    pub shared_folders: Vec<SharedFolder>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NamedRule {
    pub name: String,
    #[serde(flatten)]
    pub rule: PortForwardingRule,
}

impl From<&Machine> for MachineSummary {
    fn from(vm: &Machine) -> Self {
        let mut forwarding: Vec<NamedRule> = vm
            .forwarding
            .iter()
            .map(|(name, rule)| NamedRule {
                name: name.to_string(),
                rule: rule.clone(),
            })
            .collect();
        forwarding.sort_by(|a, b| a.name.cmp(&b.name));

        let mut shared_folders = vm.shared_folders.list();
        shared_folders.sort_by(|a, b| a.name.cmp(&b.name));

        MachineSummary {
            name: vm.name.clone(),
            uuid: vm.uuid.clone(),
            state: vm.state.clone(),
            os_type: vm.os_type.clone(),
            cpus: vm.cpus,
            memory_mb: vm.memory_mb,
            forwarding,
            shared_folders,
        }
    }
}
