//! Run a router on an ephemeral port for end-to-end tests.

use std::net::SocketAddr;

use relaycore::{
    Result,
    frame::FrameConfig,
    router::{RouterClient, RouterConfig, serve},
};
use rstest::fixture;
use tokio::{net::TcpListener, task::JoinHandle};
use tokio_util::sync::CancellationToken;

/// A router serving on `127.0.0.1` with an OS-assigned port.
#[derive(Debug)]
pub struct RouterHarness {
    addr: SocketAddr,
    frame: FrameConfig,
    shutdown: CancellationToken,
    task: JoinHandle<Result<()>>,
}

impl RouterHarness {
    /// Start a router with `config`; its listen address is ignored.
    ///
    /// # Panics
    ///
    /// Panics if no local port can be bound.
    pub async fn start(config: RouterConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind ephemeral port");
        let addr = listener.local_addr().expect("local addr");
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(serve(listener, config, shutdown.clone()));
        Self {
            addr,
            frame: config.frame,
            shutdown,
            task,
        }
    }

    /// Address the router accepts on.
    #[must_use]
    pub fn addr(&self) -> SocketAddr { self.addr }

    /// Connect a client using the router's frame limits.
    ///
    /// # Panics
    ///
    /// Panics if the connection fails.
    pub async fn client(&self) -> RouterClient {
        RouterClient::connect(self.addr, self.frame)
            .await
            .expect("connect to router")
    }

    /// Cancel the accept loop and wait for open connections to drain.
    ///
    /// # Panics
    ///
    /// Panics if the router task failed or panicked.
    pub async fn stop(self) {
        self.shutdown.cancel();
        self.task
            .await
            .expect("router task")
            .expect("router stopped cleanly");
    }
}

/// Router with default configuration.
#[fixture]
pub async fn router() -> RouterHarness { RouterHarness::start(RouterConfig::default()).await }
