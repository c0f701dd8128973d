//! beamlink CLI
//!
//! Talks to Erlang nodes over the distribution protocol.

mod config;

use anyhow::Context;
use beamlink_core::node::{ChannelDelivery, LocalEvent, Node, NodeEvent, wait_for_event};
use beamlink_core::{DistConfig, NodeId, Recipient, term};
use beamlink_crypto::Cookie;
use beamlink_transport::{EpmdResolver, TcpConnector};
use clap::{Parser, Subcommand};
use eetf::{Atom, Binary, Pid, Reference, Term};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use config::Config;

/// beamlink - Erlang distribution client
#[derive(Parser)]
#[command(name = "beamlink")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Local node name (`name@host`)
    #[arg(short, long)]
    name: Option<String>,

    /// Cookie value (overrides the cookie file)
    #[arg(long)]
    cookie: Option<String>,

    /// Cookie file path
    #[arg(long)]
    cookie_file: Option<PathBuf>,

    /// Log every frame sent and received
    #[arg(long)]
    trace_traffic: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that a node is reachable and accepts our cookie
    Ping {
        /// Remote node (`name@host`)
        node: String,

        /// Seconds to wait for the answer
        #[arg(short, long, default_value = "10")]
        timeout: u64,
    },

    /// Send a binary message to a registered process
    Send {
        /// Remote node (`name@host`)
        node: String,

        /// Registered process name
        name: String,

        /// Message text, sent as a binary
        text: String,

        /// Seconds to wait for the connection
        #[arg(short, long, default_value = "10")]
        timeout: u64,
    },

    /// Show where the cookie is read from
    Cookie,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load_or_default(cli.config.as_deref())?;
    if let Some(name) = &cli.name {
        config.node.name.clone_from(name);
    }
    if cli.trace_traffic {
        config.logging.trace_traffic = true;
    }
    config.validate()?;

    init_logging(&config, cli.verbose);

    match &cli.command {
        Commands::Ping { node, timeout } => {
            let node: NodeId = node.parse()?;
            let local = start_node(&config, &cli)?;
            ping(local, node, Duration::from_secs(*timeout)).await
        }
        Commands::Send {
            node,
            name,
            text,
            timeout,
        } => {
            let node: NodeId = node.parse()?;
            let local = start_node(&config, &cli)?;
            send(local, node, name, text.clone(), Duration::from_secs(*timeout)).await
        }
        Commands::Cookie => show_cookie(&config, &cli),
    }
}

fn init_logging(config: &Config, verbose: bool) {
    let level = if verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    if config.logging.trace_traffic {
        if let Ok(directive) = "beamlink::wire=trace".parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn cookie_file<'a>(config: &'a Config, cli: &'a Cli) -> Option<&'a std::path::Path> {
    cli.cookie_file
        .as_deref()
        .or(config.node.cookie_file.as_deref())
}

/// Running local node plus the one process the CLI acts as
struct Session {
    node: Node,
    pid: Pid,
    inbox: mpsc::UnboundedReceiver<LocalEvent>,
}

fn start_node(config: &Config, cli: &Cli) -> anyhow::Result<Session> {
    let cookie = Cookie::resolve(cli.cookie.as_deref(), cookie_file(config, cli))
        .context("failed to load cookie")?;
    let dist = DistConfig::new(config.node_id()?, cookie)
        .with_handshake_timeout(config.handshake_timeout())
        .with_trace_traffic(config.logging.trace_traffic);

    let connector = TcpConnector::with_timeout(config.connect_timeout());
    let resolver = EpmdResolver::with_port(config.network.epmd_port).with_connector(connector.clone());

    let (delivery, inbox) = ChannelDelivery::new();
    let node = Node::start(dist, Arc::new(connector), Arc::new(resolver), delivery);
    let pid = node.make_pid();
    Ok(Session { node, pid, inbox })
}

/// `{'$gen_call', {From, Ref}, {is_auth, OwnNode}}` for `net_kernel`
fn is_auth_request(from: &Pid, reference: &Reference, own: &NodeId) -> Term {
    term::tuple(vec![
        term::atom("$gen_call"),
        term::tuple(vec![Term::from(from.clone()), Term::from(reference.clone())]),
        term::tuple(vec![term::atom("is_auth"), Term::from(own.to_atom())]),
    ])
}

/// Whether `message` is the `{Ref, yes}` answer to `reference`
fn is_auth_reply(message: &Term, reference: &Reference) -> bool {
    match term::as_tuple(message) {
        Some([tag, answer]) => {
            *tag == Term::from(reference.clone()) && term::as_atom(answer).is_some_and(|a| a.name == "yes")
        }
        _ => false,
    }
}

async fn ping(session: Session, node: NodeId, timeout: Duration) -> anyhow::Result<()> {
    let Session {
        node: local,
        pid,
        mut inbox,
    } = session;
    let mut events = local.subscribe();
    let reference = local.make_ref();
    let request = is_auth_request(&pid, &reference, local.name());
    local.reg_send(node.clone(), pid.clone(), Atom::from("net_kernel"), request)?;

    let outcome = tokio::time::timeout(timeout, async {
        loop {
            tokio::select! {
                event = inbox.recv() => match event {
                    Some(LocalEvent::Message { to: Recipient::Pid(to), message })
                        if to == pid && is_auth_reply(&message, &reference) => {
                        return Ok::<(), anyhow::Error>(());
                    }
                    Some(other) => tracing::debug!(?other, "Ignoring local event"),
                    None => anyhow::bail!("node runtime stopped"),
                },
                event = events.recv() => match event {
                    Ok(NodeEvent::Down { node: down, reason }) if down == node => {
                        return Err(anyhow::Error::new(reason));
                    }
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => {
                        anyhow::bail!("node runtime stopped");
                    }
                },
            }
        }
    })
    .await;

    let result = match outcome {
        Ok(Ok(())) => {
            println!("pong");
            Ok(())
        }
        Ok(Err(err)) => {
            println!("pang");
            Err(err.context(format!("ping {node} failed")))
        }
        Err(_) => {
            println!("pang");
            Err(anyhow::anyhow!("no answer from {node} within {timeout:?}"))
        }
    };
    local.shutdown().await?;
    result
}

async fn send(
    session: Session,
    node: NodeId,
    name: &str,
    text: String,
    timeout: Duration,
) -> anyhow::Result<()> {
    let Session { node: local, pid, .. } = session;
    let mut events = local.subscribe();
    let message = Term::from(Binary::from(text.into_bytes()));
    local.reg_send(node.clone(), pid, Atom::from(name), message)?;

    let event = wait_for_event(&mut events, timeout, |event| match event {
        NodeEvent::Up { node: up, .. } => *up == node,
        NodeEvent::Down { node: down, .. } => *down == node,
    })
    .await;
    local.shutdown().await?;

    match event {
        Some(NodeEvent::Up { .. }) => {
            println!("Sent to {name} on {node}");
            Ok(())
        }
        Some(NodeEvent::Down { reason, .. }) => {
            Err(anyhow::Error::new(reason).context(format!("send to {node} failed")))
        }
        None => anyhow::bail!("no connection to {node} within {timeout:?}"),
    }
}

fn show_cookie(config: &Config, cli: &Cli) -> anyhow::Result<()> {
    if cli.cookie.is_some() {
        println!("Cookie: given on the command line");
        return Ok(());
    }
    let path = match cookie_file(config, cli) {
        Some(path) => path.to_path_buf(),
        None => Cookie::default_path()?,
    };
    match Cookie::load_from(&path) {
        Ok(_) => println!("Cookie file: {} (readable)", path.display()),
        Err(err) => println!("Cookie file: {} ({err})", path.display()),
    }
    Ok(())
}
