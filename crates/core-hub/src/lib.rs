//! core-hub: the typed message fabric between input, filtering, rendering
//! and paging.
//!
//! Four dedicated channels carry typed payloads. A send is asynchronous by
//! default; inside a [`Hub::batch`] block every send attaches a pooled
//! done-signal and blocks until the consumer finishes with the payload, so
//! the observable effects of batched sends occur in send order. Dropping a
//! payload signals too, so a panicking consumer cannot wedge the sender.

use std::sync::Arc;
use std::time::Duration;

use core_model::{Pool, Poolable};
use tokio::sync::{mpsc, Mutex, Notify};
use tracing::trace;

/// Default per-channel buffering.
pub const HUB_CHANNEL_CAP: usize = 8;

/// Redraw request flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrawOptions {
    pub prompt_only: bool,
    pub purge_cache: bool,
    pub running_query: bool,
    pub disable_cache: bool,
    pub force_sync: bool,
}

impl DrawOptions {
    pub fn prompt_only() -> Self {
        Self {
            prompt_only: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMsg {
    pub message: String,
    /// Auto-clear delay; `None` leaves the message up until replaced.
    pub clear_after: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagingRequest {
    LineAbove,
    LineBelow,
    PageUp,
    PageDown,
    ScrollLeft,
    ScrollRight,
    JumpToLineInPage(usize),
    FirstItem,
    LastItem,
}

/// Signals completion back to a blocked batch sender when dropped.
#[derive(Debug)]
pub struct DoneHandle {
    notify: Arc<Notify>,
}

impl Drop for DoneHandle {
    fn drop(&mut self) {
        self.notify.notify_one();
    }
}

/// A message plus its optional batch done-signal. Consumers call
/// [`Payload::done`] once the message is fully processed; merely dropping
/// the payload has the same effect.
#[derive(Debug)]
pub struct Payload<T> {
    data: T,
    done: Option<DoneHandle>,
}

impl<T> Payload<T> {
    pub fn data(&self) -> &T {
        &self.data
    }

    pub fn is_batched(&self) -> bool {
        self.done.is_some()
    }

    /// Consume the payload, releasing the batch sender (if any).
    pub fn done(self) -> T {
        self.data
    }
}

#[derive(Debug, Default)]
struct DoneSlot(Arc<Notify>);

impl Poolable for DoneSlot {
    fn reset(&mut self) {}
}

/// Producer half of the hub.
#[derive(Clone)]
pub struct Hub {
    query_tx: mpsc::Sender<Payload<String>>,
    draw_tx: mpsc::Sender<Payload<DrawOptions>>,
    status_tx: mpsc::Sender<Payload<StatusMsg>>,
    paging_tx: mpsc::Sender<Payload<PagingRequest>>,
    batch_lock: Arc<Mutex<()>>,
    done_pool: Arc<Pool<DoneSlot>>,
}

/// Consumer half, owned by the event loop.
pub struct HubReceivers {
    pub query: mpsc::Receiver<Payload<String>>,
    pub draw: mpsc::Receiver<Payload<DrawOptions>>,
    pub status: mpsc::Receiver<Payload<StatusMsg>>,
    pub paging: mpsc::Receiver<Payload<PagingRequest>>,
}

pub fn channel(cap: usize) -> (Hub, HubReceivers) {
    let (query_tx, query) = mpsc::channel(cap);
    let (draw_tx, draw) = mpsc::channel(cap);
    let (status_tx, status) = mpsc::channel(cap);
    let (paging_tx, paging) = mpsc::channel(cap);
    (
        Hub {
            query_tx,
            draw_tx,
            status_tx,
            paging_tx,
            batch_lock: Arc::new(Mutex::new(())),
            done_pool: Arc::new(Pool::new(16)),
        },
        HubReceivers {
            query,
            draw,
            status,
            paging,
        },
    )
}

impl Hub {
    pub async fn send_query(&self, query: String) {
        self.dispatch(&self.query_tx, query, false).await;
    }

    pub async fn send_draw(&self, options: DrawOptions) {
        self.dispatch(&self.draw_tx, options, false).await;
    }

    pub async fn send_status(&self, message: impl Into<String>, clear_after: Option<Duration>) {
        self.dispatch(
            &self.status_tx,
            StatusMsg {
                message: message.into(),
                clear_after,
            },
            false,
        )
        .await;
    }

    pub async fn send_paging(&self, request: PagingRequest) {
        self.dispatch(&self.paging_tx, request, false).await;
    }

    /// Run `f` with a batching sender. With `should_lock`, the hub-wide
    /// mutex is held for the duration; a panic inside `f` propagates to
    /// the caller and still releases the lock on unwind.
    pub async fn batch<'a, F, Fut, R>(&'a self, should_lock: bool, f: F) -> R
    where
        F: FnOnce(BatchHub<'a>) -> Fut,
        Fut: std::future::Future<Output = R>,
    {
        let _guard = if should_lock {
            Some(self.batch_lock.lock().await)
        } else {
            None
        };
        f(BatchHub { hub: self }).await
    }

    async fn dispatch<T: Send>(&self, tx: &mpsc::Sender<Payload<T>>, data: T, batch: bool) {
        if !batch {
            let _ = tx.send(Payload { data, done: None }).await;
            return;
        }
        let slot = self.done_pool.acquire();
        let notify = slot.0.clone();
        let payload = Payload {
            data,
            done: Some(DoneHandle {
                notify: notify.clone(),
            }),
        };
        match tx.send(payload).await {
            Ok(()) => {
                notify.notified().await;
                self.done_pool.release(slot);
            }
            Err(_) => {
                // The dropped payload already left a permit on this
                // notify; retire the slot instead of recycling it.
                trace!(target: "hub", "batched send to closed channel");
            }
        }
    }
}

/// Hub handle whose sends carry batch semantics.
pub struct BatchHub<'a> {
    hub: &'a Hub,
}

impl BatchHub<'_> {
    pub async fn send_query(&self, query: String) {
        self.hub.dispatch(&self.hub.query_tx, query, true).await;
    }

    pub async fn send_draw(&self, options: DrawOptions) {
        self.hub.dispatch(&self.hub.draw_tx, options, true).await;
    }

    pub async fn send_status(&self, message: impl Into<String>, clear_after: Option<Duration>) {
        self.hub
            .dispatch(
                &self.hub.status_tx,
                StatusMsg {
                    message: message.into(),
                    clear_after,
                },
                true,
            )
            .await;
    }

    pub async fn send_paging(&self, request: PagingRequest) {
        self.hub.dispatch(&self.hub.paging_tx, request, true).await;
    }
}
