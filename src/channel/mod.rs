mod protocol;


pub use protocol::{InboundEvent, OutboundEvent};

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::ChannelConfig;
use crate::effect::{DetectionBatch, SensitivityConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
}

/// Latest-wins slot between the channel reader and the animation loop.
///
/// The reader publishes every detection batch it receives; the animation
/// loop takes at most one per tick. Only the newest batch matters, so an
/// unread batch is silently replaced rather than queued.
pub struct BatchMailbox {
    slot: Mutex<MailboxSlot>,
}

#[derive(Default)]
struct MailboxSlot {
    batch: Option<DetectionBatch>,
    high_water: u64,
}

impl BatchMailbox {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(MailboxSlot::default()),
        }
    }

    /// Publish a batch. Batches whose frame counter regresses below the
    /// highest one seen on this connection are stale reordered deliveries
    /// and are dropped.
    pub fn publish(&self, batch: DetectionBatch) {
        let mut slot = self.slot.lock();
        if batch.frame_count < slot.high_water {
            debug!(
                frame_count = batch.frame_count,
                high_water = slot.high_water,
                "Dropping stale detection batch"
            );
            return;
        }
        slot.high_water = batch.frame_count;
        slot.batch = Some(batch);
    }

    /// Take the newest unconsumed batch, leaving the slot empty.
    pub fn take(&self) -> Option<DetectionBatch> {
        self.slot.lock().batch.take()
    }

    /// Forget the frame-counter high-water mark. Called on reconnect since
    /// a restarted service starts counting from zero again.
    fn reset_high_water(&self) {
        self.slot.lock().high_water = 0;
    }
}

impl Default for BatchMailbox {
    fn default() -> Self {
        Self::new()
    }
}

/// Cheap-to-clone sending side of the channel. Events sent while the
/// connection is down are either buffered (config) or dropped (frames) by
/// the connection task.
#[derive(Clone)]
pub struct ChannelHandle {
    outbound: mpsc::UnboundedSender<OutboundEvent>,
    status: watch::Receiver<ConnectionStatus>,
}

impl ChannelHandle {
    pub fn send(&self, event: OutboundEvent) {
        trace!(event = event.event_name(), "Queueing outbound event");
        let _ = self.outbound.send(event);
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }
}

/// Bidirectional event channel to the analysis service.
///
/// Owns a background task that keeps a WebSocket connection alive,
/// reconnecting with a fixed delay whenever it drops. Outbound events are
/// fed through an unbounded queue; inbound detection batches land in the
/// [`BatchMailbox`].
pub struct EventChannel {
    config: ChannelConfig,
    outbound_tx: mpsc::UnboundedSender<OutboundEvent>,
    outbound_rx: Mutex<Option<mpsc::UnboundedReceiver<OutboundEvent>>>,
    status_tx: watch::Sender<ConnectionStatus>,
    status_rx: watch::Receiver<ConnectionStatus>,
    mailbox: Arc<BatchMailbox>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl EventChannel {
    pub fn new(config: ChannelConfig) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            config,
            outbound_tx,
            outbound_rx: Mutex::new(Some(outbound_rx)),
            status_tx,
            status_rx,
            mailbox: Arc::new(BatchMailbox::new()),
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    pub fn handle(&self) -> ChannelHandle {
        ChannelHandle {
            outbound: self.outbound_tx.clone(),
            status: self.status_rx.clone(),
        }
    }

    pub fn mailbox(&self) -> Arc<BatchMailbox> {
        Arc::clone(&self.mailbox)
    }

    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_rx.clone()
    }

    /// Spawn the connection task. Subsequent calls are no-ops.
    pub fn connect(&self) {
        let outbound_rx = match self.outbound_rx.lock().take() {
            Some(rx) => rx,
            None => {
                warn!("Channel already connected");
                return;
            }
        };
        let url = self.config.url.clone();
        let delay = std::time::Duration::from_millis(self.config.reconnect_delay_ms);
        let status_tx = self.status_tx.clone();
        let mailbox = Arc::clone(&self.mailbox);
        let cancel = self.cancel.clone();
        let handle = tokio::spawn(async move {
            run(url, delay, outbound_rx, status_tx, mailbox, cancel).await;
        });
        *self.task.lock() = Some(handle);
    }

    /// Stop the connection task and wait for it to finish.
    pub async fn close(&self) {
        self.cancel.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("Channel task ended abnormally: {}", e);
            }
        }
        let _ = self.status_tx.send(ConnectionStatus::Disconnected);
    }
}

/// Connection loop: connect, replay the newest config snapshot, then pump
/// events both ways until the socket drops, and start over after a delay.
async fn run(
    url: String,
    reconnect_delay: std::time::Duration,
    mut outbound_rx: mpsc::UnboundedReceiver<OutboundEvent>,
    status_tx: watch::Sender<ConnectionStatus>,
    mailbox: Arc<BatchMailbox>,
    cancel: CancellationToken,
) {
    // The newest sensitivity snapshot seen, replayed on every reconnect so
    // the service never runs on stale settings.
    let mut last_config: Option<SensitivityConfig> = None;

    loop {
        if cancel.is_cancelled() {
            return;
        }
        let _ = status_tx.send(ConnectionStatus::Connecting);

        let stream = tokio::select! {
            _ = cancel.cancelled() => return,
            result = connect_async(url.as_str()) => result,
        };

        match stream {
            Ok((stream, _)) => {
                info!("Connected to analysis service at {}", url);
                let _ = status_tx.send(ConnectionStatus::Connected);
                mailbox.reset_high_water();
                let (mut sink, mut source) = stream.split();

                if let Some(config) = &last_config {
                    match OutboundEvent::ConfigUpdate(config.clone()).to_json() {
                        Ok(text) => {
                            if let Err(e) = sink.send(Message::Text(text)).await {
                                warn!("Failed to replay config snapshot: {}", e);
                            }
                        }
                        Err(e) => warn!("Failed to encode config snapshot: {}", e),
                    }
                }

                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            let _ = sink.send(Message::Close(None)).await;
                            return;
                        }
                        outbound = outbound_rx.recv() => {
                            let event = match outbound {
                                Some(event) => event,
                                // All handles dropped; nothing left to send.
                                None => return,
                            };
                            if let OutboundEvent::ConfigUpdate(config) = &event {
                                last_config = Some(config.clone());
                            }
                            match event.to_json() {
                                Ok(text) => {
                                    if let Err(e) = sink.send(Message::Text(text)).await {
                                        warn!("Channel send failed: {}", e);
                                        break;
                                    }
                                }
                                Err(e) => warn!("Failed to encode outbound event: {}", e),
                            }
                        }
                        inbound = source.next() => {
                            match inbound {
                                Some(Ok(Message::Text(text))) => match protocol::parse_inbound(&text) {
                                    Ok(InboundEvent::PopboxData(batch)) => mailbox.publish(batch),
                                    Ok(InboundEvent::Status { msg }) => {
                                        info!("Service status: {}", msg)
                                    }
                                    Ok(InboundEvent::ConfigApplied { status }) => {
                                        debug!("Config applied: {}", status)
                                    }
                                    Err(e) => warn!("Ignoring inbound event: {}", e),
                                },
                                Some(Ok(Message::Close(_))) | None => {
                                    warn!("Analysis service closed the connection");
                                    break;
                                }
                                Some(Ok(_)) => {}
                                Some(Err(e)) => {
                                    warn!("Channel read error: {}", e);
                                    break;
                                }
                            }
                        }
                    }
                }
            }
            Err(e) => warn!("Failed to connect to {}: {}", url, e),
        }

        let _ = status_tx.send(ConnectionStatus::Disconnected);

        // Backoff before the next attempt. Keep draining the outbound queue
        // so sampled frames don't pile up while the service is down; config
        // updates are remembered for replay instead.
        let backoff = tokio::time::sleep(reconnect_delay);
        tokio::pin!(backoff);
        loop {
            tokio::select! {
                _ = &mut backoff => break,
                _ = cancel.cancelled() => return,
                outbound = outbound_rx.recv() => match outbound {
                    Some(OutboundEvent::ConfigUpdate(config)) => last_config = Some(config),
                    Some(event) => trace!(
                        event = event.event_name(),
                        "Dropping outbound event while disconnected"
                    ),
                    None => return,
                },
            }
        }
    }
}
