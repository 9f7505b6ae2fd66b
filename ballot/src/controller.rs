use std::{sync::Arc, time::Duration};

use ballot_common::{Signal, internal, logging};
use ballot_delivery::{BoundTransport, DeliveryProcessor, Producer};
use ballot_rpc::{AckHandler, DeliverHandler, RemoteDestination, RpcClient, RpcServer};
use ballot_spool::SpoolConfig;
use ballot_tracing::traced;
use futures_util::future::join_all;
use serde::Deserialize;
use tokio::{io::BufReader, sync::broadcast};

use crate::{
    collector::{Tally, TallyHandler},
    feed,
};

const fn default_rpc_timeout() -> u64 {
    5000
}

/// A voting machine: spools votes and delivers them to the collector
#[derive(Debug, Deserialize)]
pub struct ProducerConfig {
    /// Name recorded on every vote cast here
    pub machine: String,

    /// Address the ack server binds to
    pub listen: String,

    /// Address the collector should send acks to, if it differs from
    /// `listen` (e.g. when binding to 0.0.0.0)
    #[serde(default)]
    pub advertise: Option<String>,

    /// Address of the collector
    pub destination: String,

    #[serde(default)]
    pub spool: SpoolConfig,

    #[serde(default)]
    pub delivery: DeliveryProcessor,

    /// Timeout for a single RPC exchange (in milliseconds)
    ///
    /// Default: 5000
    #[serde(default = "default_rpc_timeout")]
    pub rpc_timeout_ms: u64,

    /// Read votes from stdin
    ///
    /// Default: true
    #[serde(default = "default_read_stdin")]
    pub read_stdin: bool,
}

const fn default_read_stdin() -> bool {
    true
}

/// The collector: counts votes delivered by every producer
#[derive(Debug, Deserialize)]
pub struct CollectorConfig {
    /// Addresses to accept deliveries on
    #[serde(alias = "listener")]
    pub listen: Vec<String>,

    /// Timeout for each ack sent back to a producer (in milliseconds)
    ///
    /// Default: 5000
    #[serde(default = "default_rpc_timeout")]
    pub rpc_timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
pub enum Role {
    Producer(ProducerConfig),
    Collector(CollectorConfig),
}

/// Top-level process configuration
#[derive(Debug, Deserialize)]
pub struct Ballot {
    pub role: Role,
}

#[traced(instrument(level = tracing::Level::TRACE))]
async fn wait_for_signal() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!("CTRL+C entered, shutting down");
        }
        _ = terminate.recv() => {
            internal!("Terminate Signal received, shutting down");
        }
    };

    Ok(())
}

impl Ballot {
    /// Run this process in its configured role until shutdown
    ///
    /// # Errors
    ///
    /// This function will return an error if the spool or any server fails
    /// to initialise.
    #[traced(instrument(level = tracing::Level::TRACE, skip_all, err), timing(precision = "s"))]
    pub async fn run(self) -> anyhow::Result<()> {
        logging::init();
        internal!("Controller running");

        let (shutdown, _receiver) = broadcast::channel(64);

        let role = self.role.run(&shutdown);
        tokio::pin!(role);

        let ret = tokio::select! {
            r = &mut role => r,
            r = wait_for_signal() => {
                r?;
                shutdown
                    .send(Signal::Shutdown)
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::Interrupted, e.to_string()))?;
                role.await
            }
        };

        internal!("Shutting down...");

        ret
    }
}

impl Role {
    /// # Errors
    /// If the role fails to start
    pub async fn run(self, shutdown: &broadcast::Sender<Signal>) -> anyhow::Result<()> {
        match self {
            Self::Producer(config) => config.run(shutdown).await,
            Self::Collector(config) => config.run(shutdown).await,
        }
    }
}

impl ProducerConfig {
    /// Recover the spool, bind the ack server, and deliver until shutdown
    ///
    /// # Errors
    /// If the spool, the worker, or the ack server cannot be initialised
    #[traced(instrument(level = tracing::Level::TRACE, skip_all, fields(machine = %self.machine)))]
    pub async fn run(self, shutdown: &broadcast::Sender<Signal>) -> anyhow::Result<()> {
        let Self {
            machine,
            listen,
            advertise,
            destination,
            spool,
            delivery,
            rpc_timeout_ms,
            read_stdin,
        } = self;

        let store = spool.into_backing_store()?;
        let producer = Producer::start(store, Arc::new(BoundTransport::new()), delivery).await?;

        let ack_server = RpcServer::bind(
            &listen,
            Arc::new(AckHandler::new(Arc::new(producer.ack_receiver().clone()))),
        )
        .await?;

        let reply_to = match advertise {
            Some(address) => address,
            None => ack_server.local_addr()?.to_string(),
        };

        internal!(
            level = INFO,
            "Producer {machine} delivering to {destination}, acks to {reply_to}"
        );

        producer.bind_destination(Arc::new(RemoteDestination::new(
            RpcClient::new(destination).with_timeout(Duration::from_millis(rpc_timeout_ms)),
            reply_to,
        )));

        let votes = async {
            if read_stdin {
                feed::feed_votes(
                    BufReader::new(tokio::io::stdin()),
                    &producer,
                    &machine,
                    shutdown.subscribe(),
                )
                .await
            } else {
                0
            }
        };

        let (acks, worker, submitted) = tokio::join!(
            ack_server.serve(shutdown.subscribe()),
            producer.serve(shutdown.subscribe()),
            votes
        );

        internal!(
            level = INFO,
            "Producer stopped after submitting {submitted} votes, {} pending and {} awaiting ack",
            producer.spool().len(),
            producer.in_flight().len()
        );

        acks?;
        worker?;
        Ok(())
    }
}

impl CollectorConfig {
    /// Accept deliveries on every configured address until shutdown
    ///
    /// # Errors
    /// If any address cannot be bound, or no address is configured
    #[traced(instrument(level = tracing::Level::TRACE, skip_all))]
    pub async fn run(self, shutdown: &broadcast::Sender<Signal>) -> anyhow::Result<()> {
        if self.listen.is_empty() {
            anyhow::bail!("Collector has no listen addresses configured");
        }

        let tally = Arc::new(Tally::new());
        let handler = Arc::new(
            DeliverHandler::new(Arc::new(TallyHandler::new(tally.clone())))
                .with_ack_timeout(Duration::from_millis(self.rpc_timeout_ms)),
        );

        let mut servers = Vec::with_capacity(self.listen.len());
        for address in &self.listen {
            servers.push(RpcServer::bind(address, handler.clone()).await?);
        }

        let result = join_all(servers.iter().map(|server| server.serve(shutdown.subscribe())))
            .await
            .into_iter()
            .try_for_each(|r| r);

        tally.log_summary();

        result?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Ballot {
        ron::from_str(&format!("#![enable(unwrap_variant_newtypes)]\n{source}")).expect("parse")
    }

    #[test]
    fn test_producer_config() {
        let ballot = parse(
            r#"(
                role: Producer(
                    machine: "booth-1",
                    listen: "127.0.0.1:7101",
                    destination: "127.0.0.1:7100",
                    spool: Memory,
                    delivery: (poll_interval_ms: 250),
                ),
            )"#,
        );

        let Role::Producer(producer) = ballot.role else {
            panic!("expected producer role");
        };
        assert_eq!(producer.machine, "booth-1");
        assert_eq!(producer.listen, "127.0.0.1:7101");
        assert_eq!(producer.destination, "127.0.0.1:7100");
        assert!(producer.advertise.is_none());
        assert!(producer.spool.path().is_none());
        assert_eq!(producer.delivery.poll_interval_ms, 250);
        assert_eq!(producer.delivery.push_timeout_ms, 5000);
        assert_eq!(producer.rpc_timeout_ms, 5000);
        assert!(producer.read_stdin);
    }

    #[test]
    fn test_producer_defaults_to_file_spool() {
        let ballot = parse(
            r#"(
                role: Producer(
                    machine: "booth-2",
                    listen: "0.0.0.0:7101",
                    advertise: Some("10.0.0.2:7101"),
                    destination: "10.0.0.1:7100",
                ),
            )"#,
        );

        let Role::Producer(producer) = ballot.role else {
            panic!("expected producer role");
        };
        assert_eq!(
            producer.spool.path(),
            Some(std::path::Path::new("/var/spool/ballot"))
        );
        assert_eq!(producer.advertise.as_deref(), Some("10.0.0.2:7101"));
    }

    #[test]
    fn test_collector_config() {
        let ballot = parse(
            r#"(
                role: Collector(
                    listen: ["127.0.0.1:7100", "[::1]:7100"],
                ),
            )"#,
        );

        let Role::Collector(collector) = ballot.role else {
            panic!("expected collector role");
        };
        assert_eq!(collector.listen.len(), 2);
        assert_eq!(collector.rpc_timeout_ms, 5000);
    }

    #[tokio::test]
    async fn test_collector_without_addresses_fails() {
        let (shutdown, _rx) = broadcast::channel(1);
        let collector = CollectorConfig {
            listen: Vec::new(),
            rpc_timeout_ms: default_rpc_timeout(),
        };

        assert!(collector.run(&shutdown).await.is_err());
    }
}
