use std::net::IpAddr;

use clap::Parser;
use vboxmanage_client::PfProto;

#[derive(Parser)]
#[command(version, about, long_about)]
pub struct VBoxCtlCli {
    /// Sets a custom config file
    #[clap(short, long)]
    pub config: Option<String>,
    #[clap(subcommand)]
    pub subcmd: SubCommand,
}

#[derive(Parser)]
pub enum SubCommand {
    #[clap(name = "list", about = "Lists registered machines")]
    List,
    #[clap(name = "info", about = "Shows forwarding rules and shared folders of a machine")]
    Info(InfoSubCommand),
    #[clap(name = "pf", about = "Manages NAT port forwarding rules")]
    Pf(PfCommand),
    #[clap(name = "sf", about = "Manages shared folders")]
    Sf(SfCommand),
}

#[derive(Parser)]
pub struct PfCommand {
    #[clap(subcommand)]
    pub action: PfSubCommand,
}

#[derive(Parser)]
pub struct SfCommand {
    #[clap(subcommand)]
    pub action: SfSubCommand,
}

#[derive(Parser)]
pub struct InfoSubCommand {
    pub vm: String,
    /// Print as json
    #[clap(long)]
    pub json: bool,
    /// Fail on malformed lines instead of skipping them
    #[clap(long)]
    pub strict: bool,
}

#[derive(Parser)]
pub enum PfSubCommand {
    #[clap(name = "get", about = "Finds a rule by name, or by guest port")]
    Get(PfGetSubCommand),
    #[clap(name = "add", about = "Adds a rule")]
    Add(PfAddSubCommand),
    #[clap(name = "delete", about = "Deletes a rule")]
    Delete(PfDeleteSubCommand),
}

#[derive(Parser)]
pub struct PfGetSubCommand {
    pub vm: String,
    #[clap(short, long, default_value = "")]
    pub name: String,
    #[clap(short, long, default_value_t = 0)]
    pub port: u16,
}

#[derive(Parser)]
pub struct PfAddSubCommand {
    pub vm: String,
    #[clap(short, long)]
    pub name: String,
    #[clap(long, default_value_t = 1)]
    pub nic: u8,
    #[clap(long, default_value = "tcp", value_parser = parse_proto)]
    pub proto: PfProto,
    #[clap(long)]
    pub host_ip: Option<IpAddr>,
    #[clap(long)]
    pub host_port: u16,
    #[clap(long)]
    pub guest_ip: Option<IpAddr>,
    #[clap(long)]
    pub guest_port: u16,
}

#[derive(Parser)]
pub struct PfDeleteSubCommand {
    pub vm: String,
    #[clap(short, long)]
    pub name: String,
    #[clap(long, default_value_t = 1)]
    pub nic: u8,
}

#[derive(Parser)]
pub enum SfSubCommand {
    #[clap(name = "list", about = "Lists shared folders")]
    List(SfListSubCommand),
    #[clap(name = "add", about = "Adds a shared folder")]
    Add(SfAddSubCommand),
    #[clap(name = "remove", about = "Removes a shared folder")]
    Remove(SfRemoveSubCommand),
}

#[derive(Parser)]
pub struct SfListSubCommand {
    pub vm: String,
}

#[derive(Parser)]
pub struct SfAddSubCommand {
    pub vm: String,
    #[clap(short, long)]
    pub name: String,
    /// Path on the host
    #[clap(long)]
    pub path: String,
}

#[derive(Parser)]
pub struct SfRemoveSubCommand {
    pub vm: String,
    #[clap(short, long)]
    pub name: String,
}

fn parse_proto(s: &str) -> Result<PfProto, String> {
    s.parse()
}
