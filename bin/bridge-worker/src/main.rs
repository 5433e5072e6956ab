use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sidecore_bridge::{BridgeWorker, BridgeWorkerConfig, SourceChainClient};
use sidecore_engine::event::NoopEventSink;
use sidecore_store::{BridgeJob, Store};

#[derive(Parser, Debug)]
#[command(name = "bridge-worker", about = "Drains withdrawal/deposit jobs against the source chain")]
struct Opt {
    #[arg(long, env = "STEEM_BRIDGE_ACCOUNT")]
    steem_bridge_account: String,

    #[arg(long, env = "STEEM_BRIDGE_ACTIVE_KEY")]
    steem_bridge_active_key: String,

    #[arg(long, env = "BRIDGE_IDLE_DELAY_MS", default_value_t = 800)]
    idle_delay_ms: u64,

    #[arg(long, env = "BRIDGE_BUSY_DELAY_MS", default_value_t = 200)]
    busy_delay_ms: u64,

    #[arg(long, env = "BRIDGE_STALENESS_MS", default_value_t = 60_000)]
    staleness_ms: i64,

    #[arg(long, env = "VERBOSE", default_value_t = false)]
    verbose: bool,
}

impl Opt {
    fn init_logger(&self) -> Result<()> {
        let env_directive = if self.verbose { "bridge_worker=debug,sidecore_bridge=debug,info".parse()? } else { tracing::Level::INFO.into() };
        tracing_subscriber::registry()
            .with(fmt::Layer::default().log_internal_errors(true).and_then(EnvFilter::from_default_env().add_directive(env_directive)))
            .init();
        Ok(())
    }
}

/// Broadcasts bridge jobs as Steem custom-json operations signed by the
/// bridge account's active key.
///
/// TODO: wire up a real Steem condenser/JSON-RPC client (broadcast_transaction
/// against an actual node) in place of this placeholder — nothing in this
/// workspace currently depends on a Steem RPC crate, so inventing a fake one
/// here would fabricate a dependency this binary doesn't really have.
struct SteemCustomJsonClient {
    bridge_account: String,
}

#[async_trait]
impl SourceChainClient for SteemCustomJsonClient {
    async fn broadcast_withdrawal(&self, job: &BridgeJob) -> anyhow::Result<String> {
        tracing::info!(job_id = %job.job_id, to = %job.to, symbol = %job.symbol, amount = %job.amount.to_string(), account = %self.bridge_account, "would broadcast steem withdrawal custom_json");
        Ok(format!("unsigned-{}", job.job_id))
    }

    async fn broadcast_deposit_mint(&self, job: &BridgeJob) -> anyhow::Result<String> {
        tracing::info!(job_id = %job.job_id, to = %job.to, symbol = %job.symbol, amount = %job.amount.to_string(), account = %self.bridge_account, "would broadcast steem token_mint custom_json");
        Ok(format!("unsigned-{}", job.job_id))
    }
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let opt = Opt::parse();
    opt.init_logger()?;

    tokio::runtime::Builder::new_multi_thread().enable_all().build().context("failed to build tokio runtime")?.block_on(async move {
        let store = Arc::new(Store::new());
        let sink = Arc::new(NoopEventSink);
        let client = Arc::new(SteemCustomJsonClient { bridge_account: opt.steem_bridge_account.clone() });
        let config = BridgeWorkerConfig { idle_delay_ms: opt.idle_delay_ms, busy_delay_ms: opt.busy_delay_ms, staleness_ms: opt.staleness_ms };
        let worker = Arc::new(BridgeWorker::new(store, sink, client, config));

        tracing::info!("bridge worker starting for account {}", opt.steem_bridge_account);

        tokio::select! {
            _ = worker.run_forever() => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown signal received");
            }
        }

        Ok(())
    })
}
