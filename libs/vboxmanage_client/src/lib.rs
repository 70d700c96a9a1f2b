//! Drives the VirtualBox `VBoxManage` tool and parses its machine-readable output.

pub mod client;
pub mod error;
pub mod runner;
pub mod types;

pub use client::{FolderMode, VBoxManageClient};
pub use error::{VBoxCliError, VBoxParseError};
pub use runner::{CommandOutput, CommandRunner, RunnerConfig, VBoxManageRunner};
pub use types::pfrule::{PfProto, PortForwardingRule, PortForwardingTable};
pub use types::sfolder::{SharedFolder, SharedFolderTable};
pub use types::vm::{Machine, MachineState, MachineSummary, ParsePolicy};
pub use types::{parse_property_line, FromCliOutput, Property, VmRef};
