//! Registry, activation loop and handles.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::{mpsc, oneshot};

use crate::actor::{Actor, Context};

/// One-shot reply channel carried inside mailbox ops.
pub type Reply<T> = oneshot::Sender<T>;

/// What an activation pulls out of its mailbox: either an external call or a
/// timer firing (tagged so a firing that raced its own disposal can be
/// dropped).
pub(crate) enum Mail<A: Actor> {
    Op(A::Op),
    Timer {
        id: crate::actor::TimerId,
        repeating: bool,
        op: A::Op,
    },
}

/// The in-process actor registry. Cheap to clone; all clones share one
/// registry and one master random source.
#[derive(Clone)]
pub struct Runtime {
    shared: Arc<Shared>,
}

struct Shared {
    actors: Mutex<HashMap<(TypeId, String), Box<dyn Any + Send>>>,
    master_rng: Mutex<StdRng>,
}

impl Runtime {
    /// Runtime with an entropy-derived master seed.
    pub fn new() -> Self {
        Self::with_seed(rand::thread_rng().gen())
    }

    /// Runtime with a fixed master seed, for deterministic tests: key
    /// generation and every activation's random source derive from it.
    pub fn with_seed(seed: u64) -> Self {
        Runtime {
            shared: Arc::new(Shared {
                actors: Mutex::new(HashMap::new()),
                master_rng: Mutex::new(StdRng::seed_from_u64(seed)),
            }),
        }
    }

    /// Pure handle lookup. Never fails and never activates anything.
    pub fn resolve<A: Actor>(&self, key: impl Into<String>) -> ActorRef<A> {
        ActorRef {
            runtime: self.clone(),
            key: key.into(),
            _actor: PhantomData,
        }
    }

    /// Random lowercase-alphanumeric key of the given length, drawn from the
    /// master random source.
    pub fn generate_key(&self, len: usize) -> String {
        const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
        let mut rng = self.shared.master_rng.lock();
        (0..len)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect()
    }

    /// Returns the mailbox of the live activation for `key`, spawning a fresh
    /// activation if none exists or the previous one has retired.
    fn sender<A: Actor>(&self, key: &str) -> mpsc::UnboundedSender<Mail<A>> {
        let mut actors = self.shared.actors.lock();
        let slot = (TypeId::of::<A>(), key.to_string());
        if let Some(entry) = actors.get(&slot) {
            let mailbox = entry
                .downcast_ref::<mpsc::UnboundedSender<Mail<A>>>()
                .expect("registry entry has mismatched actor type");
            if !mailbox.is_closed() {
                return mailbox.clone();
            }
        }

        let (mailbox, inbox) = mpsc::unbounded_channel();
        let seed = self.shared.master_rng.lock().gen();
        actors.insert(slot, Box::new(mailbox.clone()));
        tokio::spawn(run_activation::<A>(
            self.clone(),
            key.to_string(),
            mailbox.clone(),
            inbox,
            seed,
        ));
        mailbox
    }

    /// Removes the registry entry for a retiring activation, unless mail
    /// arrived in the meantime. Checked under the registry lock so a racing
    /// caller either lands in this mailbox before the check or resolves a
    /// fresh activation afterwards.
    fn try_retire<A: Actor>(
        &self,
        key: &str,
        inbox: &mut mpsc::UnboundedReceiver<Mail<A>>,
    ) -> Option<Mail<A>> {
        let mut actors = self.shared.actors.lock();
        match inbox.try_recv() {
            Ok(mail) => Some(mail),
            Err(_) => {
                actors.remove(&(TypeId::of::<A>(), key.to_string()));
                None
            }
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

/// Drives one activation: build the actor, drain the mailbox one message at
/// a time, retire when asked and idle.
async fn run_activation<A: Actor>(
    runtime: Runtime,
    key: String,
    mailbox: mpsc::UnboundedSender<Mail<A>>,
    mut inbox: mpsc::UnboundedReceiver<Mail<A>>,
    seed: u64,
) {
    let mut ctx = Context::new(runtime.clone(), key.clone(), mailbox, seed);
    let mut actor = A::activate(&mut ctx);
    debug!("{} `{}` activated", A::KIND, key);

    let mut pending = None;
    loop {
        let mail = match pending.take() {
            Some(mail) => mail,
            None => match inbox.recv().await {
                Some(mail) => mail,
                None => break,
            },
        };

        match mail {
            Mail::Op(op) => actor.handle(op, &mut ctx).await,
            Mail::Timer { id, repeating, op } => {
                if ctx.timer_live(id) {
                    if !repeating {
                        ctx.finish_timer(id);
                    }
                    actor.handle(op, &mut ctx).await;
                } else {
                    debug!("{} `{}` dropped a stale timer firing", A::KIND, key);
                }
            }
        }

        if ctx.retire_requested() {
            match runtime.try_retire::<A>(&key, &mut inbox) {
                // The mailbox was not empty after all; process what we found
                // and keep the retirement request pending.
                Some(mail) => pending = Some(mail),
                None => break,
            }
        }
    }

    ctx.cancel_timers();
    debug!("{} `{}` deactivated", A::KIND, key);
}

/// Location-transparent reference to an actor by type and key. Holding one
/// says nothing about whether the actor is currently activated; every call
/// re-resolves the registry.
pub struct ActorRef<A: Actor> {
    runtime: Runtime,
    key: String,
    _actor: PhantomData<fn() -> A>,
}

impl<A: Actor> Clone for ActorRef<A> {
    fn clone(&self) -> Self {
        ActorRef {
            runtime: self.runtime.clone(),
            key: self.key.clone(),
            _actor: PhantomData,
        }
    }
}

impl<A: Actor> ActorRef<A> {
    /// The key half of this handle's identity.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Enqueues the op built by `make_op` and awaits its reply.
    ///
    /// Queueing never fails. If the target activation retires between
    /// enqueue and execution the op is rebuilt and delivered to the next
    /// activation transparently, which is why `make_op` takes the reply
    /// sender instead of a ready-made op.
    pub async fn call<R, F>(&self, mut make_op: F) -> R
    where
        F: FnMut(Reply<R>) -> A::Op,
    {
        loop {
            let (reply, response) = oneshot::channel();
            let mailbox = self.runtime.sender::<A>(&self.key);
            if mailbox.send(Mail::Op(make_op(reply))).is_err() {
                // Raced a retiring activation; resolve a fresh one.
                continue;
            }
            match response.await {
                Ok(value) => return value,
                // The mailbox was torn down before our op ran.
                Err(_) => continue,
            }
        }
    }
}
