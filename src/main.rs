use axum::{
    Router,
    extract::Extension,
    routing::{get, post},
};
use format_cluster::cluster::context::DistributedFormatContext;
use format_cluster::cluster::handlers::{
    handle_convert, handle_format, handle_get_rule, handle_recommend, handle_set_rule,
    handle_wait_rule,
};
use format_cluster::cluster::synchronizer::{ClusterConfig, RuleSynchronizer};
use format_cluster::consensus::handlers::{
    handle_append_entries, handle_forward_propose, handle_request_vote,
};
use format_cluster::consensus::manager::FormatConsensus;
use format_cluster::consensus::protocol::{
    ENDPOINT_APPEND_ENTRIES, ENDPOINT_FORWARD_PROPOSE, ENDPOINT_REQUEST_VOTE,
};
use format_cluster::consensus::transport::HttpRaftTransport;
use format_cluster::consensus::types::NodeId;
use std::net::SocketAddr;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 5 {
        eprintln!(
            "Usage: {} --node-id <id> --bind <addr:port> [--peer <id>=<addr:port>]...",
            args[0]
        );
        eprintln!("Example: {} --node-id 1 --bind 127.0.0.1:6001", args[0]);
        eprintln!(
            "Example: {} --node-id 2 --bind 127.0.0.1:6002 --peer 1=127.0.0.1:6001 --peer 3=127.0.0.1:6003",
            args[0]
        );

        std::process::exit(1);
    }

    let mut node_id: Option<NodeId> = None;
    let mut bind_addr: Option<SocketAddr> = None;
    let mut peers: Vec<(NodeId, SocketAddr)> = vec![];

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--node-id" => {
                node_id = Some(args[i + 1].parse()?);
                i += 2;
            }
            "--bind" => {
                bind_addr = Some(args[i + 1].parse()?);
                i += 2;
            }
            "--peer" => {
                let (id, addr) = args[i + 1]
                    .split_once('=')
                    .ok_or_else(|| anyhow::anyhow!("--peer expects <id>=<addr:port>"))?;
                peers.push((id.parse()?, addr.parse()?));
                i += 2;
            }
            _ => {
                i += 1;
            }
        }
    }

    let node_id = node_id.ok_or_else(|| anyhow::anyhow!("--node-id is required"))?;
    let bind_addr = bind_addr.ok_or_else(|| anyhow::anyhow!("--bind is required"))?;

    let mut nodes = peers.clone();
    nodes.push((node_id, bind_addr));
    let config = ClusterConfig {
        local_id: node_id,
        nodes,
    };

    tracing::info!(
        "Starting format node {} on {} ({} node cluster)",
        node_id,
        bind_addr,
        config.nodes.len()
    );

    // 1. Consensus manager over HTTP transport:
    let transport = HttpRaftTransport::new(config.addresses());
    let consensus = FormatConsensus::new(node_id, config.peer_ids(), transport);

    // 2. Synchronizer and the application-facing context:
    let synchronizer = RuleSynchronizer::new(consensus.clone());
    synchronizer.start().await;
    let context = DistributedFormatContext::new(synchronizer, None);

    // 3. HTTP Router (public API plus internal consensus RPCs):
    let app = Router::new()
        .route("/rule", post(handle_set_rule).get(handle_get_rule))
        .route("/rule/wait/:version", get(handle_wait_rule))
        .route("/format", post(handle_format))
        .route("/recommend", post(handle_recommend))
        .route("/convert", post(handle_convert))
        .route(ENDPOINT_REQUEST_VOTE, post(handle_request_vote))
        .route(ENDPOINT_APPEND_ENTRIES, post(handle_append_entries))
        .route(ENDPOINT_FORWARD_PROPOSE, post(handle_forward_propose))
        .layer(Extension(consensus.clone()))
        .layer(Extension(context));

    // 4. Spawn stats reporter:
    let stats_node = consensus.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(5));

        loop {
            interval.tick().await;
            let rule = stats_node.current_rule().await;
            tracing::info!(
                "Node stats: role={:?} term={} rule_version={} leader={:?}",
                stats_node.role().await,
                stats_node.current_term().await,
                rule.version,
                stats_node.leader_hint().await,
            );
        }
    });

    // 5. Start HTTP server:
    tracing::info!("HTTP server listening on {}", bind_addr);
    tracing::info!("Press Ctrl+C to shutdown");

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
