//! # Virtual Actor Runtime
//!
//! A small in-process substrate for named, lazily-activated, single-writer
//! execution contexts ("actors"). It carries no game knowledge; the
//! simulation crates build their entities on top of it.
//!
//! ## Model
//!
//! An actor is addressed by an [`ActorRef`] — a location-transparent handle
//! made of the actor type and a string key. Resolving a handle never touches
//! the registry and never fails; the backing activation is spawned on the
//! first delivered call and torn down again once the actor signals idleness
//! and its mailbox has drained.
//!
//! Each activation is one tokio task that owns the actor value and drains an
//! unbounded mailbox strictly in arrival order. Two operations on the same
//! activation can therefore never observe interleaved mutation. Cross-actor
//! calls made from inside an operation suspend that operation (and with it
//! the whole mailbox) until the callee answers — calls are not reentrant.
//!
//! Timers are scheduled per activation and fire by enqueueing an ordinary
//! mailbox operation, so timer callbacks see the same fully serialized state
//! as external callers.
//!
//! ## Example
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use runtime::{Actor, Context, Reply, Runtime};
//!
//! struct Greeter {
//!     greetings: u32,
//! }
//!
//! enum GreeterOp {
//!     Greet { name: String, reply: Reply<String> },
//! }
//!
//! #[async_trait]
//! impl Actor for Greeter {
//!     const KIND: &'static str = "greeter";
//!     type Op = GreeterOp;
//!
//!     fn activate(_ctx: &mut Context<Self>) -> Self {
//!         Greeter { greetings: 0 }
//!     }
//!
//!     async fn handle(&mut self, op: GreeterOp, _ctx: &mut Context<Self>) {
//!         match op {
//!             GreeterOp::Greet { name, reply } => {
//!                 self.greetings += 1;
//!                 let _ = reply.send(format!("hello {}", name));
//!             }
//!         }
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let runtime = Runtime::new();
//!     let greeter = runtime.resolve::<Greeter>("front-desk");
//!     let message = greeter
//!         .call(|reply| GreeterOp::Greet { name: "ada".into(), reply })
//!         .await;
//!     assert_eq!(message, "hello ada");
//! }
//! ```

mod actor;
mod system;

pub use actor::{Actor, Context, TimerId};
pub use system::{ActorRef, Reply, Runtime};
