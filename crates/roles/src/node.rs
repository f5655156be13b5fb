//! Ledger event dispatch.

use std::{future::Future, num::NonZeroUsize, sync::Arc};

use hashlink::LruCache;
use parking_lot::Mutex;
use tether_ledger::{EventPayload, LedgerEvent};
use tether_primitives::EventId;
use tether_storer::StorageRegistry;
use tokio::{
    sync::broadcast::{self, error::RecvError},
    task::{JoinError, JoinSet},
};
use tracing::{debug, error, info, trace, warn};

use crate::{Attester, Hoster, NodeEvent, ProtocolResult, RoleContext};

/// A peer acting as hoster and attester at once.
///
/// Every ledger event is handed to both roles; each role ignores events not
/// addressed to this node. Events are processed at most once per id.
#[derive(Debug)]
pub struct Node {
    ctx: Arc<RoleContext>,
    hoster: Hoster,
    attester: Attester,
    seen: Mutex<LruCache<EventId, ()>>,
}

impl Node {
    pub fn new(ctx: RoleContext, registry: Arc<StorageRegistry>) -> Self {
        let capacity = NonZeroUsize::new(ctx.config.dedup_capacity).map_or(1, NonZeroUsize::get);
        let ctx = Arc::new(ctx);
        Self {
            hoster: Hoster::new(ctx.clone(), registry),
            attester: Attester::new(ctx.clone()),
            seen: Mutex::new(LruCache::new(capacity)),
            ctx,
        }
    }

    pub fn context(&self) -> &Arc<RoleContext> {
        &self.ctx
    }

    pub fn hoster(&self) -> &Hoster {
        &self.hoster
    }

    pub fn attester(&self) -> &Attester {
        &self.attester
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        self.ctx.events.subscribe()
    }

    /// Reopens the feeds this node hosted before a restart.
    pub async fn start(&self) -> ProtocolResult<()> {
        let restored = self.hoster.restore().await?;
        info!(
            noise = %self.ctx.identity.noise_key().short(),
            address = %self.ctx.identity.address(),
            restored,
            "node started"
        );
        Ok(())
    }

    /// Handles one ledger event. A re-delivered event is skipped.
    ///
    /// Both roles run to completion; the first error is returned.
    pub async fn handle_event(&self, event: LedgerEvent) -> ProtocolResult<()> {
        if self.seen.lock().insert(event.id, ()).is_some() {
            debug!(id = %event.id, method = event.payload.method(), "duplicate event skipped");
            return Ok(());
        }
        trace!(id = %event.id, method = event.payload.method(), "handling event");

        match event.payload {
            EventPayload::NewAmendment { amendment } => {
                let (hosted, attested) = tokio::join!(
                    self.hoster.on_new_amendment(amendment),
                    self.attester.on_new_amendment(amendment),
                );
                hosted.and(attested)
            }
            EventPayload::NewStorageChallenge { challenge } => {
                let (proved, checked) = tokio::join!(
                    self.hoster.on_storage_challenge(challenge),
                    self.attester.on_storage_challenge(challenge),
                );
                proved.and(checked)
            }
            EventPayload::NewPerformanceChallenge { challenge } => {
                let (served, timed) = tokio::join!(
                    self.hoster.on_performance_challenge(challenge),
                    self.attester.on_performance_challenge(challenge),
                );
                served.and(timed)
            }
            EventPayload::DropHosting { feed, hoster } => {
                self.hoster.on_drop_hosting(feed, hoster).await
            }
            EventPayload::UnpublishPlan { plan } => {
                self.attester.on_unpublish_plan(plan);
                Ok(())
            }
            EventPayload::HostingStarted { amendment } => {
                info!(%amendment, "hosting started on ledger");
                Ok(())
            }
            EventPayload::RegisteredForHosting { user } => self.hoster.on_registered(user).await,
        }
    }

    /// Consumes ledger events until `shutdown` resolves or the ledger closes
    /// the stream, then drains in-flight sessions.
    ///
    /// Events are handled concurrently. A handler that fails is logged and
    /// published as [`NodeEvent::EventFailed`].
    pub async fn run(
        self: Arc<Self>,
        mut events: broadcast::Receiver<LedgerEvent>,
        shutdown: impl Future<Output = ()>,
    ) {
        let mut tasks = JoinSet::new();
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested");
                    break;
                }
                event = events.recv() => match event {
                    Ok(event) => {
                        let node = self.clone();
                        tasks.spawn(async move {
                            let (id, method) = (event.id, event.payload.method());
                            (id, method, node.handle_event(event).await)
                        });
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "ledger event stream lagged, events lost");
                    }
                    Err(RecvError::Closed) => {
                        info!("ledger event stream closed");
                        break;
                    }
                },
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => self.settled(joined),
            }
        }
        self.ctx.sessions.close().await;
        while let Some(joined) = tasks.join_next().await {
            self.settled(joined);
        }
        self.close_storage();
    }

    fn settled(&self, joined: Result<(EventId, &'static str, ProtocolResult<()>), JoinError>) {
        match joined {
            Ok((_, _, Ok(()))) => {}
            Ok((event, method, Err(e))) => {
                error!(id = %event, method, error = %e, "event handler failed");
                self.ctx.events.emit(NodeEvent::EventFailed { event, method, reason: e.to_string() });
            }
            Err(e) => error!(error = %e, "event handler task aborted"),
        }
    }

    /// Tears down every live session, then closes feed storage.
    pub async fn close(&self) {
        self.ctx.sessions.close().await;
        self.close_storage();
    }

    fn close_storage(&self) {
        self.hoster.close();
        info!("node closed");
    }
}
