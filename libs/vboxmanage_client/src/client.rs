use tracing::debug;

use crate::error::VBoxCliError;
use crate::runner::{CommandRunner, RunnerConfig, VBoxManageRunner};
use crate::types::pfrule::PortForwardingRule;
use crate::types::vm::{Machine, ParsePolicy};
use crate::types::{FromCliOutput, VmRef};

/// Where a shared folder lives: with the machine definition, or only for the
/// running session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderMode {
    Machine,
    Transient,
}

pub struct VBoxManageClient<R: CommandRunner = VBoxManageRunner> {
    runner: R,
}

impl VBoxManageClient<VBoxManageRunner> {
    pub fn from_config(config: RunnerConfig) -> Self {
        VBoxManageClient::new(VBoxManageRunner::new(config))
    }
}

impl<R: CommandRunner> VBoxManageClient<R> {
    pub fn new(runner: R) -> Self {
        VBoxManageClient { runner }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// runs an arbitrary command and returns its stdout
    pub async fn dynamic_command(&self, args: Vec<&str>) -> Result<String, VBoxCliError> {
        let args: Vec<String> = args.into_iter().map(String::from).collect();
        self.runner.run(&args).await.into_result()
    }

    pub async fn version(&self) -> Result<String, VBoxCliError> {
        Ok(self.dynamic_command(vec!["--version"]).await?.trim().to_string())
    }

    pub async fn list_vms(&self) -> Result<Vec<VmRef>, VBoxCliError> {
        let stdout = self.dynamic_command(vec!["list", "vms"]).await?;
        Ok(Vec::<VmRef>::from_cli_output(&stdout)?)
    }

    /// `showvminfo --machinereadable`, skipping malformed forwarding/shared folder lines
    pub async fn get_machine(&self, vm: &str) -> Result<Machine, VBoxCliError> {
        self.get_machine_with_policy(vm, ParsePolicy::SkipMalformed)
            .await
    }

    pub async fn get_machine_with_policy(
        &self,
        vm: &str,
        policy: ParsePolicy,
    ) -> Result<Machine, VBoxCliError> {
        let stdout = self
            .dynamic_command(vec!["showvminfo", vm, "--machinereadable"])
            .await?;
        let machine = Machine::parse(&stdout, policy)?;
        debug!(
            "Machine {} has {} forwarding rules",
            machine.name,
            machine.forwarding.len()
        );
        Ok(machine)
    }

    /// adds a NAT rule on adapter `nic`, live if the machine is running
    pub async fn add_pf_rule(
        &self,
        vm: &Machine,
        nic: u8,
        name: &str,
        rule: &PortForwardingRule,
    ) -> Result<(), VBoxCliError> {
        let value = rule.format(name);
        let args = natpf_args(vm, nic, vec![value.as_str()]);
        self.dynamic_command(args.iter().map(String::as_str).collect())
            .await?;
        Ok(())
    }

    pub async fn delete_pf_rule(&self, vm: &Machine, nic: u8, name: &str) -> Result<(), VBoxCliError> {
        let args = natpf_args(vm, nic, vec!["delete", name]);
        self.dynamic_command(args.iter().map(String::as_str).collect())
            .await?;
        Ok(())
    }

    pub async fn shared_folder_add_with_mode(
        &self,
        vm: &Machine,
        name: &str,
        path: &str,
        mode: FolderMode,
    ) -> Result<(), VBoxCliError> {
        let mut args = vec!["sharedfolder", "add", vm.name.as_str(), "--name", name, "--hostpath", path];
        if mode == FolderMode::Transient {
            args.push("--transient");
        }
        self.dynamic_command(args).await?;
        Ok(())
    }

    /// persistent for a stopped machine, transient for a running one
    pub async fn shared_folder_add(&self, vm: &Machine, name: &str, path: &str) -> Result<(), VBoxCliError> {
        self.shared_folder_add_with_mode(vm, name, path, folder_mode(vm))
            .await
    }

    pub async fn shared_folder_remove(&self, vm: &Machine, name: &str) -> Result<(), VBoxCliError> {
        let mut args = vec!["sharedfolder", "remove", vm.name.as_str(), "--name", name];
        if folder_mode(vm) == FolderMode::Transient {
            args.push("--transient");
        }
        self.dynamic_command(args).await?;
        Ok(())
    }
}

fn folder_mode(vm: &Machine) -> FolderMode {
    match vm.state.is_stopped() {
        true => FolderMode::Machine,
        false => FolderMode::Transient,
    }
}

fn natpf_args(vm: &Machine, nic: u8, rest: Vec<&str>) -> Vec<String> {
    let mut args = match vm.state.is_stopped() {
        true => vec![
            "modifyvm".to_string(),
            vm.name.clone(),
            format!("--natpf{}", nic),
        ],
        false => vec![
            "controlvm".to_string(),
            vm.name.clone(),
            format!("natpf{}", nic),
        ],
    };
    args.extend(rest.into_iter().map(String::from));
    args
}
