use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use clap::Parser;
use clap_derive::Parser;
use lwcomm::config::lwcomm_config::LwCommConfig;
use lwcomm::config::node::Node;
use lwcomm::config::route::{DeliveryMode, RetransmitPattern, Route};
use lwcomm::lwcomm::{LwComm, MessageListener, SendOptions};
use lwcomm::message::message::Message;
use tokio::select;
use tracing::{info, warn, Level};

/// Runs one of two LwComm nodes on localhost that ping each other. Start it twice, once with
///  `--node one` and once with `--node two`.
#[derive(Parser)]
struct Args {
    #[clap(long, default_value = "one")]
    node: String,

    #[clap(long, default_value_t = 17001)]
    port_one: u16,

    #[clap(long, default_value_t = 17002)]
    port_two: u16,

    /// offsets in milliseconds, comma separated
    #[clap(long, default_value = "200,500,1000")]
    retransmit_pattern: String,

    #[clap(long, default_value_t = 2000)]
    ping_interval_millis: u64,

    #[clap(short, long, default_value_t = false)]
    verbose: bool,

    #[clap(long, default_value_t = false)]
    very_verbose: bool,
}

struct PingListener;

#[async_trait]
impl MessageListener for PingListener {
    async fn on_message(&self, message: &Message) -> anyhow::Result<()> {
        info!("received {:?} from {:?}", message.payload, message.from);
        Ok(())
    }
}

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match (args.verbose, args.very_verbose) {
        (_, true) => Level::TRACE,
        (true, _) => Level::DEBUG,
        (false, false) => Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .try_init()
        .ok();

    let one = Node::new("one", "127.0.0.1", args.port_one);
    let two = Node::new("two", "127.0.0.1", args.port_two);
    let pattern: RetransmitPattern = args.retransmit_pattern.parse()?;

    let routes = vec![
        Route::new("to-two", vec![one.clone()], vec![two.clone()], DeliveryMode::Failover, pattern.clone())
            .with_default_queue("pings"),
        Route::new("to-one", vec![two.clone()], vec![one.clone()], DeliveryMode::Failover, pattern)
            .with_default_queue("pings"),
    ];
    let ping_route = if args.node == "one" { "to-two" } else { "to-one" };

    let config = LwCommConfig::new(args.node, vec![one, two], routes);
    let lwcomm = LwComm::bind_udp(config).await?;
    lwcomm.register_listener("pings", Arc::new(PingListener)).await;

    select! {
        result = lwcomm.run() => { result }
        _ = ping_loop(lwcomm.clone(), ping_route, Duration::from_millis(args.ping_interval_millis)) => { Ok(()) }
    }
}

async fn ping_loop(lwcomm: Arc<LwComm>, route: &str, interval: Duration) {
    let mut counter = 0u64;
    loop {
        tokio::time::sleep(interval).await;
        counter += 1;

        let handle = match lwcomm.send(route, format!("ping #{}", counter), SendOptions::default()).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!("error sending ping: {}", e);
                continue;
            }
        };

        let result = handle.result().await;
        info!("ping #{}: {:?}", counter, result);
        info!("stats: {:?}", lwcomm.stats());
    }
}
