//! LanChat application wiring
//!
//! Binds the receiving endpoint, builds the broadcaster and owns the event
//! channel the terminal interface reads from.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use lanchat_core::{
    BroadcastHandle, Broadcaster, ChannelSink, ChatConfig, EventReceiver, EventSink, HttpDelivery,
    InboundListener, Message, Notice,
};

use crate::error::{CliError, Result};

/// Running LanChat instance
pub struct ChatApp {
    config: ChatConfig,
    sink: ChannelSink,
    event_receiver: Option<EventReceiver>,
    broadcaster: Broadcaster,
    listen_addr: SocketAddr,
    shutdown: CancellationToken,
    listener_task: JoinHandle<()>,
}

impl ChatApp {
    /// Bind the receiving endpoint and prepare broadcasting
    ///
    /// Fails if the endpoint cannot be bound; the caller should exit.
    pub async fn start(config: ChatConfig) -> Result<Self> {
        config.validate()?;

        let (sink, event_receiver) = ChannelSink::new();
        let shared_sink: Arc<dyn EventSink> = Arc::new(sink.clone());

        let listener = InboundListener::bind(
            config.network.listen_addr(),
            &config.network.receive_path,
            Arc::clone(&shared_sink),
        )
        .await?;
        let listen_addr = listener.local_addr();

        let shutdown = CancellationToken::new();
        let listener_task = {
            let shutdown = shutdown.clone();
            let sink = sink.clone();
            tokio::spawn(async move {
                if let Err(e) = listener.serve_with_shutdown(shutdown).await {
                    error!("Receiving endpoint stopped: {}", e);
                    sink.notice(Notice::error(format!("Receiving endpoint stopped: {}", e)));
                }
            })
        };

        let delivery = HttpDelivery::new(
            config.network.receive_path.clone(),
            config.network.request_timeout(),
        )
        .map_err(|e| CliError::Core(e.into()))?;
        let broadcaster = Broadcaster::new(
            config.directory.build(config.network.port),
            Arc::new(delivery),
            shared_sink,
        );

        info!("LanChat started, listening on {}", listen_addr);

        Ok(Self {
            config,
            sink,
            event_receiver: Some(event_receiver),
            broadcaster,
            listen_addr,
            shutdown,
            listener_task,
        })
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    /// Event stream for the interface; available once
    pub fn take_event_receiver(&mut self) -> Option<EventReceiver> {
        self.event_receiver.take()
    }

    /// Echo a composed message locally and broadcast it to all peers
    ///
    /// Returns as soon as the broadcast is launched.
    pub fn send_message(&self, text: impl Into<String>) -> BroadcastHandle {
        let message = Message::local(text);
        self.sink.deliver(message.clone());
        debug!(len = message.content().len(), "Broadcasting local message");
        self.broadcaster.broadcast(&message)
    }

    /// Stop the receiving endpoint
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.listener_task.await {
            debug!("Listener task ended abnormally: {}", e);
        }
        info!("LanChat stopped");
    }
}
