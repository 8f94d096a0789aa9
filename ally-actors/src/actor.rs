use anyhow::{anyhow, Result};
use std::marker::PhantomData;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

/// Minimal actor trait. `Self: Sized` avoids object-safety issues when using `Context<Self>`.
#[async_trait::async_trait]
pub trait Actor: Send + Sized + 'static {
    type Msg: Send + 'static;

    /// Handle a single message. Return `Err` to stop the actor.
    async fn handle(&mut self, msg: Self::Msg, ctx: &mut Context<Self>) -> Result<()>;
}

/// Runtime context for an actor instance.
pub struct Context<A: Actor> {
    stop: bool,
    _actor: PhantomData<fn() -> A>,
}

impl<A: Actor> Context<A> {
    /// Request a graceful stop after processing the current message.
    pub fn stop(&mut self) {
        self.stop = true;
    }
}

/// Address for sending messages to an actor.
pub struct Addr<A: Actor>(mpsc::Sender<A::Msg>);

/// Manual Clone to avoid unnecessary bounds on `A`/`A::Msg`.
impl<A: Actor> Clone for Addr<A> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<A: Actor> Addr<A> {
    /// Async send; awaits backpressure. Returns the message if the receiver is dropped.
    pub async fn send(&self, msg: A::Msg) -> std::result::Result<(), A::Msg> {
        self.0.send(msg).await.map_err(|e| e.0)
    }

    /// Send a message carrying a reply channel and wait for the answer.
    ///
    /// ```
    /// # use anyhow::Result;
    /// # use async_trait::async_trait;
    /// # use ally_actors::actor::{self, Actor, Context};
    /// # use tokio::sync::oneshot;
    /// struct Doubler;
    ///
    /// #[async_trait]
    /// impl Actor for Doubler {
    ///     type Msg = (u32, oneshot::Sender<u32>);
    ///     async fn handle(&mut self, (n, reply): Self::Msg, _ctx: &mut Context<Self>) -> Result<()> {
    ///         let _ = reply.send(n * 2);
    ///         Ok(())
    ///     }
    /// }
    ///
    /// let rt = tokio::runtime::Runtime::new().unwrap();
    /// rt.block_on(async {
    ///     let actor::ActorHandle { addr, task } = actor::spawn_actor(Doubler, 4);
    ///     assert_eq!(addr.ask(|reply| (21, reply)).await.unwrap(), 42);
    ///     drop(addr);
    ///     task.await.unwrap().unwrap();
    /// });
    /// ```
    pub async fn ask<R>(&self, make: impl FnOnce(oneshot::Sender<R>) -> A::Msg) -> Result<R> {
        let (tx, rx) = oneshot::channel();
        self.send(make(tx))
            .await
            .map_err(|_| anyhow!("actor mailbox closed"))?;
        rx.await.map_err(|_| anyhow!("actor dropped the reply"))
    }
}

/// Handle to a running actor task.
pub struct ActorHandle<A: Actor> {
    pub addr: Addr<A>,
    pub task: JoinHandle<anyhow::Result<()>>,
}

/// Spawn an actor with a bounded mailbox.
///
/// Stop conditions:
/// - `handle` returns `Err`
/// - all senders are dropped
/// - `ctx.stop()` is called
pub fn spawn_actor<A: Actor>(actor: A, capacity: usize) -> ActorHandle<A> {
    spawn_actor_with_shutdown(actor, capacity, None)
}

/// Like [`spawn_actor`], and the actor also stops once `shutdown` is cancelled.
pub fn spawn_actor_with_shutdown<A: Actor>(
    mut actor: A,
    capacity: usize,
    shutdown: Option<CancellationToken>,
) -> ActorHandle<A> {
    let (tx, mut rx) = mpsc::channel::<A::Msg>(capacity);
    let addr = Addr(tx);
    let shutdown = shutdown.unwrap_or_default();

    let task = tokio::spawn(async move {
        let mut ctx = Context {
            stop: false,
            _actor: PhantomData,
        };

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                maybe_msg = rx.recv() => {
                    let Some(msg) = maybe_msg else { break };
                    if let Err(e) = actor.handle(msg, &mut ctx).await {
                        tracing::error!(target: "ally.actors", error = ?e, "actor returned error; stopping");
                        return Err(e);
                    }
                    if ctx.stop {
                        break;
                    }
                }
            }
        }
        Ok(())
    });

    ActorHandle { addr, task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Counter {
        seen: u32,
        done: Option<oneshot::Sender<u32>>,
    }

    #[async_trait]
    impl Actor for Counter {
        type Msg = u32;

        async fn handle(&mut self, msg: u32, ctx: &mut Context<Self>) -> Result<()> {
            if msg == 0 {
                return Err(anyhow!("zero is not allowed"));
            }
            self.seen += msg;
            if self.seen >= 3 {
                if let Some(done) = self.done.take() {
                    let _ = done.send(self.seen);
                }
                ctx.stop();
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn stops_when_asked() {
        let (tx, rx) = oneshot::channel();
        let ActorHandle { addr, task } = spawn_actor(
            Counter {
                seen: 0,
                done: Some(tx),
            },
            4,
        );
        addr.send(1).await.unwrap();
        addr.send(2).await.unwrap();
        assert_eq!(rx.await.unwrap(), 3);
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn handler_errors_stop_the_actor() {
        let ActorHandle { addr, task } = spawn_actor(Counter { seen: 0, done: None }, 1);
        addr.send(0).await.unwrap();
        assert!(task.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn dropping_every_addr_stops_the_actor() {
        let ActorHandle { addr, task } = spawn_actor(Counter { seen: 0, done: None }, 1);
        addr.send(1).await.unwrap();
        drop(addr);
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn shutdown_token_stops_an_idle_actor() {
        let token = CancellationToken::new();
        let ActorHandle { addr, task } =
            spawn_actor_with_shutdown(Counter { seen: 0, done: None }, 1, Some(token.clone()));
        token.cancel();
        task.await.unwrap().unwrap();
        assert!(addr.send(1).await.is_err());
    }
}
