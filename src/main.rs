#![allow(clippy::result_large_err)]

use anyhow::{anyhow, Context};
use meshgraph::app::{GraphRequest, MeshGraphService};
use meshgraph::config::MeshGraphConfig;
use meshgraph::mesh::ConfigKind;
use meshgraph::telemetry;
use std::fs;
use std::time::Duration;

enum CliCommand {
    Graph {
        options: CommonOptions,
        namespaces: Vec<String>,
        duration: Option<Duration>,
        output: Option<String>,
    },
    List {
        options: CommonOptions,
        kind: ConfigKind,
        namespace: String,
    },
    Get {
        options: CommonOptions,
        kind: ConfigKind,
        namespace: String,
        name: String,
    },
    Help,
}

#[derive(Default)]
struct CommonOptions {
    config_path: Option<String>,
    source_path: Option<String>,
}

impl CommonOptions {
    fn load(&self) -> anyhow::Result<MeshGraphConfig> {
        let mut config = match self.config_path.as_deref() {
            Some(path) => MeshGraphConfig::load_from(path),
            None => MeshGraphConfig::load(),
        }
        .context("failed to load configuration")?;
        if let Some(path) = &self.source_path {
            config.source.path = Some(path.clone());
        }
        Ok(config)
    }

    /// Consumes a shared option; returns false when `arg` is not one.
    fn accept<I>(&mut self, arg: &str, args: &mut I) -> anyhow::Result<bool>
    where
        I: Iterator<Item = String>,
    {
        let slot = match arg {
            "-c" | "--config" => &mut self.config_path,
            "-s" | "--source" => &mut self.source_path,
            _ => return Ok(false),
        };
        if slot.is_some() {
            anyhow::bail!("{arg} specified multiple times");
        }
        *slot = Some(next_value(arg, args)?);
        Ok(true)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing().context("failed to initialise telemetry")?;

    match parse_cli_args(std::env::args().skip(1))? {
        CliCommand::Graph {
            options,
            namespaces,
            duration,
            output,
        } => {
            let config = options.load()?;
            let service =
                MeshGraphService::initialise(&config).context("failed to construct service")?;
            let request = GraphRequest {
                namespaces,
                query_time: None,
                duration,
            };
            let response = service
                .build_graph(request)
                .await
                .context("failed to build graph")?;
            let rendered = serde_json::to_string_pretty(&response.to_json())?;
            match output {
                Some(path) => {
                    fs::write(&path, rendered).with_context(|| format!("failed to write {path}"))?
                }
                None => println!("{rendered}"),
            }
            Ok(())
        }
        CliCommand::List {
            options,
            kind,
            namespace,
        } => {
            let service = MeshGraphService::initialise(&options.load()?)
                .context("failed to construct service")?;
            let fetcher = service.fetcher();
            let objects = match kind {
                ConfigKind::VirtualService => fetcher.list_virtual_services(&namespace, "").await,
                ConfigKind::DestinationRule => {
                    fetcher.list_destination_rules(&namespace, "").await
                }
                ConfigKind::Gateway => fetcher.list_gateways(&namespace).await,
                ConfigKind::ServiceEntry => fetcher.list_service_entries(&namespace).await,
                ConfigKind::QuotaSpec => fetcher.list_quota_specs(&namespace).await,
                ConfigKind::QuotaSpecBinding => fetcher.list_quota_spec_bindings(&namespace).await,
            }
            .with_context(|| format!("failed to list {kind} in {namespace}"))?;
            let manifests: Vec<_> = objects.iter().map(|object| object.to_manifest()).collect();
            println!("{}", serde_yaml::to_string(&manifests)?);
            Ok(())
        }
        CliCommand::Get {
            options,
            kind,
            namespace,
            name,
        } => {
            let service = MeshGraphService::initialise(&options.load()?)
                .context("failed to construct service")?;
            let object = service
                .fetcher()
                .get(kind, &namespace, &name)
                .await
                .with_context(|| format!("failed to get {kind} {namespace}/{name}"))?;
            println!("{}", serde_yaml::to_string(&object.to_manifest())?);
            Ok(())
        }
        CliCommand::Help => {
            print_help();
            Ok(())
        }
    }
}

fn parse_cli_args<I>(args: I) -> anyhow::Result<CliCommand>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let Some(command) = args.next() else {
        return Ok(CliCommand::Help);
    };

    match command.as_str() {
        "graph" => parse_graph_args(args),
        "list" | "get" => parse_object_args(&command, args),
        "help" | "-h" | "--help" => Ok(CliCommand::Help),
        other => Err(anyhow!("unrecognised command `{other}`")),
    }
}

fn parse_graph_args<I>(mut args: I) -> anyhow::Result<CliCommand>
where
    I: Iterator<Item = String>,
{
    let mut options = CommonOptions::default();
    let mut namespaces = Vec::new();
    let mut duration = None;
    let mut output = None;

    while let Some(arg) = args.next() {
        if options.accept(&arg, &mut args)? {
            continue;
        }
        match arg.as_str() {
            "-n" | "--namespace" => {
                let value = next_value(&arg, &mut args)?;
                namespaces.extend(
                    value
                        .split(',')
                        .map(str::trim)
                        .filter(|ns| !ns.is_empty())
                        .map(str::to_string),
                );
            }
            "-d" | "--duration" => {
                let value = next_value(&arg, &mut args)?;
                duration = Some(
                    humantime::parse_duration(&value)
                        .with_context(|| format!("invalid duration `{value}`"))?,
                );
            }
            "-o" | "--output" => output = Some(next_value(&arg, &mut args)?),
            "-h" | "--help" => return Ok(CliCommand::Help),
            other => anyhow::bail!("unrecognised argument `{other}`"),
        }
    }

    if namespaces.is_empty() {
        anyhow::bail!("meshgraph graph requires at least one --namespace");
    }

    Ok(CliCommand::Graph {
        options,
        namespaces,
        duration,
        output,
    })
}

fn parse_object_args<I>(command: &str, mut args: I) -> anyhow::Result<CliCommand>
where
    I: Iterator<Item = String>,
{
    let mut options = CommonOptions::default();
    let mut positional = Vec::new();

    while let Some(arg) = args.next() {
        if options.accept(&arg, &mut args)? {
            continue;
        }
        match arg.as_str() {
            "-h" | "--help" => return Ok(CliCommand::Help),
            _ => positional.push(arg),
        }
    }

    let mut positional = positional.into_iter();
    let kind: ConfigKind = positional
        .next()
        .ok_or_else(|| anyhow!("meshgraph {command} requires a kind"))?
        .parse()?;
    let namespace = positional
        .next()
        .ok_or_else(|| anyhow!("meshgraph {command} requires a namespace"))?;

    let parsed = if command == "get" {
        let name = positional
            .next()
            .ok_or_else(|| anyhow!("meshgraph get requires an object name"))?;
        CliCommand::Get {
            options,
            kind,
            namespace,
            name,
        }
    } else {
        CliCommand::List {
            options,
            kind,
            namespace,
        }
    };

    if let Some(extra) = positional.next() {
        anyhow::bail!("unexpected argument `{extra}`");
    }
    Ok(parsed)
}

fn next_value<I>(flag: &str, args: &mut I) -> anyhow::Result<String>
where
    I: Iterator<Item = String>,
{
    args.next()
        .ok_or_else(|| anyhow!("expected value after {flag}"))
}

fn print_help() {
    println!(
        "\
Usage: meshgraph graph --namespace <NS>[,<NS>...] [OPTIONS]
       meshgraph list <KIND> <NAMESPACE> [OPTIONS]
       meshgraph get <KIND> <NAMESPACE> <NAME> [OPTIONS]

Options:
  -c, --config <PATH>      Config file (default: config/local)
  -s, --source <PATH>      YAML stream of routing config objects
  -h, --help               Print this help message

Graph:
  -n, --namespace <NS>     Namespace to draw; repeatable or comma separated
  -d, --duration <DUR>     Rate window, e.g. 10m (default: graph.duration)
  -o, --output <PATH>      Write the JSON graph to a file instead of stdout

Kinds: VirtualService, DestinationRule, Gateway, ServiceEntry, QuotaSpec, QuotaSpecBinding
"
    );
}
