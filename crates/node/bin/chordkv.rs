use std::sync::Arc;

use chordkv_core::dht::Routing;
use chordkv_core::storage::SledStorage;
use chordkv_core::swarm::Swarm;
use chordkv_core::swarm::SwarmBuilder;
use chordkv_core::transport::RequestHandler;
use chordkv_node::error::Error;
use chordkv_node::logging::init_logging;
use chordkv_node::logging::LogLevel;
use chordkv_node::native::config;
use chordkv_node::native::transport;
use chordkv_node::native::transport::TcpTransport;
use chordkv_node::util::build_version;
use chordkv_node::util::expand_home;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(about, version, author)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(long, default_value_t = LogLevel::Info, value_enum, env)]
    log_level: LogLevel,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Command {
    #[command(about = "Writes a default configuration file.")]
    Init(InitCommand),
    #[command(about = "Starts a long-running ring node.")]
    Run(RunCommand),
}

#[derive(Args, Debug)]
struct ConfigArgs {
    #[arg(
        long,
        short = 'c',
        env,
        default_value = "~/.chordkv/config.yaml",
        help = "Config file location"
    )]
    pub config: String,
}

#[derive(Args, Debug)]
struct InitCommand {
    #[arg(
        long,
        default_value = "~/.chordkv/config.yaml",
        help = "The location of config file"
    )]
    pub location: String,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum RoutingArg {
    Full,
    Finger,
}

impl From<RoutingArg> for Routing {
    fn from(r: RoutingArg) -> Self {
        match r {
            RoutingArg::Full => Routing::Full,
            RoutingArg::Finger => Routing::Finger,
        }
    }
}

#[derive(Args, Debug)]
struct RunCommand {
    #[arg(
        long,
        short = 'b',
        help = "Listen address. If not provided, use bind_addr in config file",
        env
    )]
    pub bind_addr: Option<String>,

    #[arg(
        long,
        help = "Address announced to other nodes. If not provided, use advertise_addr in config file or the bind address",
        env
    )]
    pub advertise_addr: Option<String>,

    #[arg(
        long,
        help = "Address of any node already in the ring. Without one this node starts a new ring",
        env
    )]
    pub bootstrap: Option<String>,

    #[arg(long, help = "Pinned ring id. If not provided, hash the advertised address", env)]
    pub node_id: Option<u64>,

    #[arg(long, value_enum, help = "Successor lookup strategy", env)]
    pub routing: Option<RoutingArg>,

    #[arg(
        long,
        help = "Seconds between stabilization ticks. If not provided, use stabilize_interval in config file or 3",
        env
    )]
    pub stabilize_interval: Option<u64>,

    #[arg(
        long,
        help = "Storage files location. If not provided, use data_storage.path in config file",
        env
    )]
    pub storage_path: Option<String>,

    #[command(flatten)]
    config_args: ConfigArgs,
}

fn get_value<V>(value: Option<V>, default_value: V) -> V {
    value.unwrap_or(default_value)
}

/// Config file values overridden by command line flags.
fn load_config(args: &RunCommand) -> anyhow::Result<config::Config> {
    let mut c = config::Config::read_fs(args.config_args.config.as_str())?;
    c.bind_addr = get_value(args.bind_addr.clone(), c.bind_addr);
    c.advertise_addr = args.advertise_addr.clone().or(c.advertise_addr);
    c.bootstrap = args.bootstrap.clone().or(c.bootstrap);
    c.node_id = args.node_id.or(c.node_id);
    c.routing = get_value(args.routing.map(Routing::from), c.routing);
    c.stabilize_interval = get_value(args.stabilize_interval, c.stabilize_interval);
    if let Some(path) = &args.storage_path {
        c.data_storage.path = path.clone();
    }
    c.validate()?;
    Ok(c)
}

async fn build_swarm(c: &config::Config) -> anyhow::Result<Arc<Swarm>> {
    let path = expand_home(&c.data_storage.path)?;
    let storage = SledStorage::new_with_cap_and_path(c.data_storage.capacity, path)
        .await
        .map_err(Error::StorageError)?;

    let mut builder = SwarmBuilder::new(c.address(), Box::new(storage), Arc::new(TcpTransport::new()))
        .space(c.space()?)
        .quorum(c.quorum()?)
        .rpc_timeout(c.rpc_timeout())
        .routing(c.routing)
        .join_retries(c.join_retries);
    if let Some(id) = c.node_id()? {
        builder = builder.id(id);
    }
    Ok(builder.build()?)
}

async fn daemon_run(args: RunCommand) -> anyhow::Result<()> {
    let c = load_config(&args)?;
    tracing::info!("chordkv {} starting at {}", build_version(), c.address());

    let swarm = build_swarm(&c).await?;
    println!("Node id: {}", swarm.id());

    let cancel = CancellationToken::new();
    let listener = transport::bind(&c.bind_addr).await?;
    let handler: Arc<dyn RequestHandler> = swarm.clone();
    let listening = tokio::spawn(transport::serve(listener, handler, cancel.clone()));

    swarm
        .join(c.bootstrap.as_deref())
        .await
        .map_err(Error::JoinError)?;

    let stabilizing = tokio::spawn(
        swarm
            .stabilizer()
            .wait(c.stabilize_interval(), cancel.clone()),
    );
    let inspecting = tokio::spawn(inspect_loop(
        swarm.clone(),
        c.stabilize_interval(),
        cancel.clone(),
    ));

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    cancel.cancel();
    let _ = futures::join!(listening, stabilizing, inspecting);
    Ok(())
}

/// Dump the ring view at debug level once per stabilization interval.
async fn inspect_loop(swarm: Arc<Swarm>, interval: std::time::Duration, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {
                match swarm.ring_snapshot().and_then(|s| Ok(serde_json::to_string(&s)?)) {
                    Ok(json) => tracing::debug!("ring snapshot: {}", json),
                    Err(e) => tracing::warn!("failed to inspect ring: {}", e),
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level);

    match cli.command {
        Command::Run(args) => daemon_run(args).await,
        Command::Init(args) => {
            let config = config::Config::default();
            let p = config.write_fs(args.location.as_str())?;
            println!("Your config file has saved to: {}", p);
            Ok(())
        }
    }
}
