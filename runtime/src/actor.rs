//! The actor contract and the per-activation execution context.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use crate::system::{Mail, Runtime};

/// An entity with a stable identity whose state is only ever touched by one
/// operation at a time.
///
/// Implementations define a mailbox message type (`Op`, typically an enum
/// whose variants carry [`Reply`](crate::Reply) senders for their results)
/// and a `handle` method that consumes one message. The runtime guarantees
/// `handle` invocations on a single activation never overlap.
#[async_trait]
pub trait Actor: Sized + Send + 'static {
    /// Short label used in log output.
    const KIND: &'static str;

    /// Mailbox message type delivered to [`Actor::handle`].
    type Op: Send + 'static;

    /// Builds the in-memory instance backing a handle. Called lazily on the
    /// first delivery after the actor was idle.
    fn activate(ctx: &mut Context<Self>) -> Self;

    /// Processes a single mailbox message.
    async fn handle(&mut self, op: Self::Op, ctx: &mut Context<Self>);
}

/// Identifies a timer scheduled on one activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

/// Per-activation state handed to every [`Actor::handle`] call: the actor's
/// key, a seeded random source, the timer table and the deactivation switch.
pub struct Context<A: Actor> {
    runtime: Runtime,
    key: String,
    rng: StdRng,
    mailbox: mpsc::UnboundedSender<Mail<A>>,
    timers: HashMap<TimerId, AbortHandle>,
    next_timer: u64,
    retire: bool,
}

impl<A: Actor> Context<A> {
    pub(crate) fn new(
        runtime: Runtime,
        key: String,
        mailbox: mpsc::UnboundedSender<Mail<A>>,
        seed: u64,
    ) -> Self {
        Context {
            runtime,
            key,
            rng: StdRng::seed_from_u64(seed),
            mailbox,
            timers: HashMap::new(),
            next_timer: 0,
            retire: false,
        }
    }

    /// The key this activation was resolved under.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The owning runtime, for building further handles (e.g. a reference to
    /// this very actor).
    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Random source seeded from the runtime's master seed.
    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// Asks the runtime to retire this activation. Honored only once the
    /// mailbox is verifiably empty; until then the request stays pending.
    pub fn deactivate_when_idle(&mut self) {
        self.retire = true;
    }

    /// Withdraws a pending [`Context::deactivate_when_idle`] request, used
    /// when new work arrives for an actor that previously went idle.
    pub fn cancel_deactivation(&mut self) {
        self.retire = false;
    }

    /// Schedules a timer against this activation. Every firing enqueues the
    /// op built by `make_op` as ordinary mail, so it executes serialized with
    /// all other operations. Non-repeating timers dispose themselves after
    /// their single firing.
    pub fn schedule_timer<F>(
        &mut self,
        first_delay: Duration,
        interval: Duration,
        repeating: bool,
        mut make_op: F,
    ) -> TimerId
    where
        F: FnMut() -> A::Op + Send + 'static,
    {
        let id = TimerId(self.next_timer);
        self.next_timer += 1;

        let mailbox = self.mailbox.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(first_delay).await;
            loop {
                let mail = Mail::Timer {
                    id,
                    repeating,
                    op: make_op(),
                };
                // A retired activation has dropped its mailbox; stop firing.
                if mailbox.send(mail).is_err() {
                    break;
                }
                if !repeating {
                    break;
                }
                tokio::time::sleep(interval).await;
            }
        });
        self.timers.insert(id, task.abort_handle());
        id
    }

    /// Cancels future firings. Safe to call on unknown or already-disposed
    /// timer ids.
    pub fn dispose_timer(&mut self, id: TimerId) {
        if let Some(handle) = self.timers.remove(&id) {
            handle.abort();
        }
    }

    pub(crate) fn timer_live(&self, id: TimerId) -> bool {
        self.timers.contains_key(&id)
    }

    pub(crate) fn finish_timer(&mut self, id: TimerId) {
        self.dispose_timer(id);
    }

    pub(crate) fn retire_requested(&self) -> bool {
        self.retire
    }

    pub(crate) fn cancel_timers(&mut self) {
        for (_, handle) in self.timers.drain() {
            handle.abort();
        }
    }
}
