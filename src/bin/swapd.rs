use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context as _, Result};
use bitcoin::Network;
use clap::Parser as _;
use subswapd::chain::MempoolClient;
use subswapd::lightning::node::GrpcLightningNode;
use subswapd::proto::subswap::v1::submarine_swapper_server::SubmarineSwapperServer;
use subswapd::swap::engine::{SwapEngine, SwapEngineConfig};
use subswapd::swap::service::SwapService;
use subswapd::swap::store::SwapStore;
use tonic::transport::Server;

#[derive(Debug, clap::Parser)]
struct Args {
    #[arg(long, env = "LISTEN_ADDRESS", default_value = "127.0.0.1:50051")]
    listen_address: String,

    /// Path of the sqlite swap store.
    #[arg(long, env = "DATABASE_URL", default_value = "swapd.sqlite3")]
    database_url: PathBuf,

    /// Chain provider REST endpoint.
    #[arg(long, env = "BASE_URL", default_value = subswapd::chain::DEFAULT_BASE_URL)]
    base_url: String,

    /// Lightning node gRPC endpoint.
    #[arg(long, env = "ADDRESS")]
    lnnode_address: String,

    /// PEM CA certificate for the Lightning node channel; plaintext when absent.
    #[arg(long, env = "CERT")]
    lnnode_cert: Option<String>,

    /// Bearer token callers must present.
    #[arg(long, env = "TOKEN")]
    token: String,

    #[arg(long, env = "NETWORK", default_value = "mainnet")]
    network: String,

    #[arg(long, env = "MAX_SWAP_AMOUNT_SAT", default_value_t = 4_000_000)]
    max_swap_amount_sat: u64,

    #[arg(long, env = "LOCK_HEIGHT", default_value_t = subswapd::swap::script::DEFAULT_LOCK_HEIGHT)]
    lock_height: u16,

    #[arg(long, env = "FEE_PER_KWEIGHT_FLOOR", default_value_t = 253)]
    fee_per_kweight_floor: u64,
}

fn parse_network(name: &str) -> Result<Network> {
    match name {
        "mainnet" | "bitcoin" => Ok(Network::Bitcoin),
        "testnet" => Ok(Network::Testnet),
        "signet" => Ok(Network::Signet),
        "regtest" => Ok(Network::Regtest),
        other => anyhow::bail!("unknown network: {other}"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    subswapd::logging::init().ok();

    let args = Args::parse();
    let listen_addr: SocketAddr = args.listen_address.parse().context("parse listen_address")?;
    let network = parse_network(&args.network)?;

    let store = SwapStore::open(args.database_url).context("open swap store")?;
    tracing::info!(store_path = %store.path().display(), "swap store ready");

    let chain = MempoolClient::new(&args.base_url).context("create chain client")?;
    let ln = GrpcLightningNode::connect(args.lnnode_address.clone(), args.lnnode_cert)
        .await
        .context("connect lightning node")?;
    tracing::info!(lnnode = %args.lnnode_address, "lightning node connected");

    let cfg = SwapEngineConfig {
        network,
        default_lock_height: args.lock_height,
        fee_per_kweight_floor: args.fee_per_kweight_floor,
        max_swap_amount_sat: args.max_swap_amount_sat,
    };
    let engine = SwapEngine::new(
        cfg,
        Arc::new(chain),
        Arc::new(ln),
        Arc::new(Mutex::new(store)),
    );
    let svc = SwapService::new(engine, args.token);

    tracing::info!(%listen_addr, network = %args.network, "starting submarine swap gRPC server");

    Server::builder()
        .add_service(SubmarineSwapperServer::new(svc))
        .serve(listen_addr)
        .await
        .context("serve gRPC")?;

    Ok(())
}
