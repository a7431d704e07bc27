//! Single dispatch loop feeding a fixed worker pool.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::DispatchConfig;
use crate::gateway::{AdapterOptions, GatewayEvent, RawDispatch, normalize};

#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    async fn handle(&self, event: GatewayEvent);
}

#[derive(Clone, Debug)]
pub struct Dispatcher {
    tx: mpsc::Sender<GatewayEvent>,
    options: Arc<AdapterOptions>,
}

impl Dispatcher {
    pub fn spawn(
        config: &DispatchConfig,
        options: AdapterOptions,
        handler: Arc<dyn EventHandler>,
    ) -> (Self, Vec<JoinHandle<()>>) {
        let (tx, rx) = mpsc::channel::<GatewayEvent>(config.queue_capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));

        let workers = (0..config.workers.max(1))
            .map(|worker| {
                let rx = Arc::clone(&rx);
                let handler = Arc::clone(&handler);
                tokio::spawn(async move {
                    loop {
                        let next = rx.lock().await.recv().await;
                        let Some(event) = next else {
                            break;
                        };
                        debug!(worker, event = event.name(), "dispatching event");
                        handler.handle(event).await;
                    }
                    debug!(worker, "dispatch worker stopped");
                })
            })
            .collect();

        (
            Self {
                tx,
                options: Arc::new(options),
            },
            workers,
        )
    }

    /// Normalize and queue a raw dispatch.
    ///
    /// Malformed payloads are logged and dropped. Returns whether an event was
    /// queued.
    pub async fn submit_raw(&self, raw: &RawDispatch) -> bool {
        match normalize(raw, &self.options) {
            Ok(Some(event)) => self.submit(event).await,
            Ok(None) => false,
            Err(err) => {
                warn!(event_type = %raw.event_type, error = %err, "dropping malformed gateway event");
                false
            }
        }
    }

    /// Waits for queue space instead of dropping.
    pub async fn submit(&self, event: GatewayEvent) -> bool {
        if self.tx.send(event).await.is_err() {
            warn!("dispatch workers are gone; event dropped");
            return false;
        }
        true
    }
}
