// ABOUTME: Ref-counted multicast of one upstream log stream with replay for late subscribers
// ABOUTME: MulticastHub shares one Multicaster per parameter tuple across consumers

//! Shared log streams
//!
//! A [`Multicaster`] wraps the (single-use) upstream stream for one tuple:
//! - The first `subscribe()` opens the upstream; later ones reuse it while it is
//!   open or has ended. A failed upstream is replaced by a fresh connection on
//!   the next `subscribe()`; existing subscribers keep the failure they were sent
//! - Each subscription first replays every line seen since the connection opened,
//!   then receives live lines, in upstream order
//! - When the last subscription drops, the upstream is cancelled and the replay
//!   buffer discarded; the next `subscribe()` opens a fresh connection
//!
//! Replay and registration happen under the same lock the pump delivers under,
//! so no line can fall between a subscriber's replay and its live feed.
//!
//! ```text
//!   LogSource ──open──▶ pump task ──lock──▶ history ─┬─▶ Subscription A
//!                                                     ├─▶ Subscription B
//!                                                     └─▶ (late) replay + live
//! ```

use crate::models::{LogLine, ParameterTuple};
use crate::source::{LogSource, LogStream, SourceError};
use futures_util::{Stream, StreamExt};
use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// What a subscription observes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionEvent {
    Line(LogLine),
    /// The upstream finished normally
    Ended,
    /// The upstream failed; nothing follows
    Failed(SourceError),
}

impl SubscriptionEvent {
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Ended | Self::Failed(_))
    }
}

struct Connection {
    generation: u64,
    history: VecDeque<LogLine>,
    evicted: u64,
    outcome: Option<SubscriptionEvent>,
    pump: JoinHandle<()>,
}

#[derive(Default)]
struct State {
    next_subscriber: u64,
    subscribers: HashMap<u64, mpsc::UnboundedSender<SubscriptionEvent>>,
    connection: Option<Connection>,
    generation: u64,
}

struct Shared {
    source: Arc<dyn LogSource>,
    tuple: ParameterTuple,
    replay_capacity: Option<usize>,
    state: Mutex<State>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open the upstream. Caller holds the lock and has checked there is no connection.
    fn connect(self: &Arc<Self>, state: &mut State) {
        state.generation += 1;
        let generation = state.generation;

        info!(
            tuple = %self.tuple,
            generation,
            "Opening shared upstream connection"
        );

        let upstream = self.source.open_log_stream(&self.tuple);
        let pump = tokio::spawn(pump(Arc::clone(self), generation, upstream));

        state.connection = Some(Connection {
            generation,
            history: VecDeque::new(),
            evicted: 0,
            outcome: None,
            pump,
        });
    }

    /// Record and fan out one upstream event.
    ///
    /// Returns false when the event belongs to a connection that has been torn
    /// down; such residual events are dropped.
    fn deliver(&self, generation: u64, event: SubscriptionEvent) -> bool {
        let mut state = self.lock();
        let state = &mut *state;

        let Some(connection) = state
            .connection
            .as_mut()
            .filter(|connection| connection.generation == generation)
        else {
            debug!(
                tuple = %self.tuple,
                generation,
                "Discarding residual event from a closed connection"
            );
            return false;
        };

        match &event {
            SubscriptionEvent::Line(line) => {
                connection.history.push_back(line.clone());
                if let Some(capacity) = self.replay_capacity {
                    while connection.history.len() > capacity {
                        connection.history.pop_front();
                        connection.evicted += 1;
                    }
                }
            }
            SubscriptionEvent::Ended | SubscriptionEvent::Failed(_) => {
                connection.outcome = Some(event.clone());
            }
        }

        for sender in state.subscribers.values() {
            // A closed receiver is an in-flight unsubscribe; it removes itself
            let _ = sender.send(event.clone());
        }
        true
    }

    fn unsubscribe(&self, id: u64) {
        let mut state = self.lock();
        if state.subscribers.remove(&id).is_none() {
            return;
        }
        debug!(
            tuple = %self.tuple,
            subscriber = id,
            remaining = state.subscribers.len(),
            "Subscriber detached"
        );

        if state.subscribers.is_empty() {
            if let Some(connection) = state.connection.take() {
                info!(
                    tuple = %self.tuple,
                    generation = connection.generation,
                    buffered = connection.history.len(),
                    "Last subscriber left, closing upstream connection"
                );
                connection.pump.abort();
            }
        }
    }
}

async fn pump(shared: Arc<Shared>, generation: u64, mut upstream: LogStream) {
    while let Some(item) = upstream.next().await {
        let event = match item {
            Ok(line) => SubscriptionEvent::Line(line),
            Err(e) => {
                warn!(tuple = %shared.tuple, error = %e, "Upstream log stream failed");
                SubscriptionEvent::Failed(e)
            }
        };
        let terminal = event.is_terminal();
        if !shared.deliver(generation, event) || terminal {
            return;
        }
    }
    debug!(tuple = %shared.tuple, generation, "Upstream log stream ended");
    shared.deliver(generation, SubscriptionEvent::Ended);
}

/// One shared upstream for a parameter tuple
#[derive(Clone)]
pub struct Multicaster {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Multicaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("Multicaster")
            .field("tuple", &self.shared.tuple)
            .field("subscribers", &state.subscribers.len())
            .field("connected", &state.connection.is_some())
            .finish()
    }
}

impl Multicaster {
    /// `replay_capacity` bounds the replay buffer; `None` keeps the whole connection's history
    pub fn new(
        source: Arc<dyn LogSource>,
        tuple: ParameterTuple,
        replay_capacity: Option<usize>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                source,
                tuple,
                replay_capacity,
                state: Mutex::new(State::default()),
            }),
        }
    }

    pub fn tuple(&self) -> &ParameterTuple {
        &self.shared.tuple
    }

    /// Attach a consumer, opening the upstream if this is the first one.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn subscribe(&self) -> Subscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut state = self.shared.lock();

        let failed = state
            .connection
            .as_ref()
            .is_some_and(|connection| {
                matches!(connection.outcome, Some(SubscriptionEvent::Failed(_)))
            });
        if failed {
            if let Some(connection) = state.connection.take() {
                info!(
                    tuple = %self.shared.tuple,
                    generation = connection.generation,
                    "Replacing failed upstream connection"
                );
                connection.pump.abort();
            }
        }
        if state.connection.is_none() {
            self.shared.connect(&mut state);
        }

        let mut replayed = 0;
        if let Some(connection) = &state.connection {
            for line in &connection.history {
                let _ = sender.send(SubscriptionEvent::Line(line.clone()));
            }
            replayed = connection.history.len();
            if let Some(outcome) = &connection.outcome {
                let _ = sender.send(outcome.clone());
            }
            if replayed > 0 {
                debug!(
                    tuple = %self.shared.tuple,
                    replayed,
                    evicted = connection.evicted,
                    "Replaying buffered lines to late subscriber"
                );
            }
        }

        let id = state.next_subscriber;
        state.next_subscriber += 1;
        state.subscribers.insert(id, sender);

        Subscription {
            shared: Arc::clone(&self.shared),
            id,
            receiver,
            replayed,
            finished: false,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.lock().subscribers.len()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.lock().connection.is_some()
    }

    /// Number of upstream connections opened over this multicaster's lifetime
    pub fn connections_opened(&self) -> u64 {
        self.shared.lock().generation
    }

    /// Lines currently held for replay
    pub fn buffered(&self) -> usize {
        self.shared
            .lock()
            .connection
            .as_ref()
            .map_or(0, |connection| connection.history.len())
    }
}

/// A consumer's handle into a shared stream. Dropping it detaches.
pub struct Subscription {
    shared: Arc<Shared>,
    id: u64,
    receiver: mpsc::UnboundedReceiver<SubscriptionEvent>,
    replayed: usize,
    finished: bool,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("tuple", &self.shared.tuple)
            .field("id", &self.id)
            .field("replayed", &self.replayed)
            .field("finished", &self.finished)
            .finish()
    }
}

impl Subscription {
    /// Next event; `None` after a terminal event has been returned.
    ///
    /// Cancel-safe.
    pub async fn recv(&mut self) -> Option<SubscriptionEvent> {
        self.next().await
    }

    /// Lines delivered from the replay buffer on attach
    pub const fn replayed(&self) -> usize {
        self.replayed
    }

    pub fn tuple(&self) -> &ParameterTuple {
        &self.shared.tuple
    }

    /// Detach explicitly; equivalent to dropping
    pub fn unsubscribe(self) {}
}

impl Stream for Subscription {
    type Item = SubscriptionEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }
        match this.receiver.poll_recv(cx) {
            Poll::Ready(Some(event)) => {
                this.finished = event.is_terminal();
                Poll::Ready(Some(event))
            }
            Poll::Ready(None) => {
                this.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.shared.unsubscribe(self.id);
    }
}

/// Registry of multicasters keyed by tuple, so every consumer of the same
/// tuple shares one upstream connection
#[derive(Clone)]
pub struct MulticastHub {
    source: Arc<dyn LogSource>,
    replay_capacity: Option<usize>,
    casters: Arc<Mutex<HashMap<ParameterTuple, Multicaster>>>,
}

impl std::fmt::Debug for MulticastHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MulticastHub")
            .field("replay_capacity", &self.replay_capacity)
            .field("tuples", &self.lock().len())
            .finish()
    }
}

impl MulticastHub {
    pub fn new(source: Arc<dyn LogSource>, replay_capacity: Option<usize>) -> Self {
        Self {
            source,
            replay_capacity,
            casters: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Subscribe to the shared stream for `tuple`
    pub fn subscribe(&self, tuple: &ParameterTuple) -> Subscription {
        let mut casters = self.lock();
        Self::prune(&mut casters, tuple);
        casters
            .entry(tuple.clone())
            .or_insert_with(|| {
                Multicaster::new(Arc::clone(&self.source), tuple.clone(), self.replay_capacity)
            })
            .subscribe()
    }

    /// The multicaster currently registered for `tuple`, if any
    pub fn get(&self, tuple: &ParameterTuple) -> Option<Multicaster> {
        self.lock().get(tuple).cloned()
    }

    /// Number of tuples with a registered multicaster
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn prune(casters: &mut HashMap<ParameterTuple, Multicaster>, keep: &ParameterTuple) {
        casters.retain(|tuple, caster| tuple == keep || caster.subscriber_count() > 0);
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ParameterTuple, Multicaster>> {
        self.casters.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
