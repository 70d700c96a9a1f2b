const BANNER: &str = r#"
__   _____ _____  __     _   _
\ \ / / _ ) _ \ \/ /__  | |_| |
 \ V /| _ \ (_) >  </ _| |  _| |
  \_/ |___/\___/_/\_\__|  \__|_|
  "#;

mod cli;
mod config;

use crate::{
    cli::{PfSubCommand, SfSubCommand, SubCommand},
    config::AppConfig,
};
use clap::Parser;
use colored::Colorize;
use tracing::{debug, Level};
use vboxmanage_client::{
    Machine, MachineSummary, ParsePolicy, PortForwardingRule, VBoxManageClient,
};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    // initialize colored eyre for better-looking errors
    color_eyre::install()?;

    // parse cli args
    let cli = cli::VBoxCtlCli::parse();
    // load default config, then override/merge using the config file and env
    let config = AppConfig::load(cli.config.as_deref())?;

    // initialize tracing/logging; logs go to stderr so stdout stays parseable
    let log_level = match config.general.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_max_level(log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let runner_config = config.runner_config();
    debug!("Using {}", runner_config.vboxmanage.display());
    let client = VBoxManageClient::from_config(runner_config);

    match cli.subcmd {
        SubCommand::List => {
            for vm in client.list_vms().await? {
                println!("{} {}", vm.name.bold(), vm.uuid.dimmed());
            }
        }
        SubCommand::Info(info) => {
            let policy = match info.strict {
                true => ParsePolicy::Strict,
                false => ParsePolicy::SkipMalformed,
            };
            let vm = client.get_machine_with_policy(&info.vm, policy).await?;
            let summary = MachineSummary::from(&vm);
            if info.json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("{}", BANNER.cyan());
                print_summary(&summary);
            }
        }
        SubCommand::Pf(pf) => match pf.action {
            PfSubCommand::Get(get) => {
                let vm = client.get_machine(&get.vm).await?;
                match vm.pf_rule(&get.name, get.port) {
                    Some(rule) => println!("{}", rule),
                    None => eyre::bail!("No matching forwarding rule on {}", get.vm),
                }
            }
            PfSubCommand::Add(add) => {
                let vm = client.get_machine(&add.vm).await?;
                let rule = PortForwardingRule {
                    proto: add.proto,
                    host_ip: add.host_ip,
                    host_port: add.host_port,
                    guest_ip: add.guest_ip,
                    guest_port: add.guest_port,
                };
                client.add_pf_rule(&vm, add.nic, &add.name, &rule).await?;
                println!("{} {} {}", "Added".green(), add.name, rule);
            }
            PfSubCommand::Delete(delete) => {
                let vm = client.get_machine(&delete.vm).await?;
                client.delete_pf_rule(&vm, delete.nic, &delete.name).await?;
                println!("{} {}", "Deleted".green(), delete.name);
            }
        },
        SubCommand::Sf(sf) => match sf.action {
            SfSubCommand::List(list) => {
                let vm = client.get_machine(&list.vm).await?;
                print_folders(&vm);
            }
            SfSubCommand::Add(add) => {
                let vm = client.get_machine(&add.vm).await?;
                client.shared_folder_add(&vm, &add.name, &add.path).await?;
                println!("{} {} -> {}", "Added".green(), add.name, add.path);
            }
            SfSubCommand::Remove(remove) => {
                let vm = client.get_machine(&remove.vm).await?;
                client.shared_folder_remove(&vm, &remove.name).await?;
                println!("{} {}", "Removed".green(), remove.name);
            }
        },
    }

    Ok(())
}

fn print_summary(summary: &MachineSummary) {
    println!("{} {}", summary.name.bold(), summary.uuid.dimmed());
    println!(
        "  state: {}  os: {}  cpus: {}  memory: {} MB",
        summary.state, summary.os_type, summary.cpus, summary.memory_mb
    );
    println!("{}", "Port forwarding:".cyan());
    for named in &summary.forwarding {
        println!("  {:<16} {}", named.name, named.rule);
    }
    println!("{}", "Shared folders:".cyan());
    for folder in &summary.shared_folders {
        println!("  {:<16} {}", folder.name, folder.path);
    }
}

fn print_folders(vm: &Machine) {
    let mut folders = vm.list_shared_folders();
    folders.sort_by(|a, b| a.name.cmp(&b.name));
    for folder in folders {
        println!("{:<16} {}", folder.name, folder.path);
    }
}
