//
// Copyright (C) 2024 Calling Team
// SPDX-License-Identifier: AGPL-3.0-only
//

//! A small single-threaded-cooperative actor, the concurrency backbone of
//! this crate.
//!
//! Modeled on `ringrtc`'s `simnet::actor::Actor` (a dedicated OS thread
//! draining a `BinaryHeap` of delayed tasks plus an `mpsc::Receiver`), but
//! built on a `tokio` task instead of a raw thread: `tokio::time::sleep`
//! already gives us delayed delivery, so there is no need to hand-roll a
//! timer heap. Every call's state lives behind exactly one `Actor`, which is
//! what gives the controller its single-threaded-cooperative semantics: all
//! mutations of a call's state run one task closure at a time, in the order
//! they were sent, and no lock is ever held across an `.await`.
//!
//! The state generator closure is handed a clone of the `Actor` it is about
//! to run inside of, so the state can keep a back-reference to its own actor
//! (used throughout the controller to spawn follow-up work and feed results
//! back in as new events).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

type Task<State> = Box<dyn FnOnce(&mut State) + Send + 'static>;

/// A cheaply-cloneable handle to a single-threaded actor running on its own
/// `tokio` task.
pub struct Actor<State> {
    sender: mpsc::UnboundedSender<Task<State>>,
    stopped: Arc<AtomicBool>,
}

impl<State> Clone for Actor<State> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            stopped: self.stopped.clone(),
        }
    }
}

impl<State: Send + 'static> Actor<State> {
    /// Starts a new actor. `gen_state` is invoked once, on the actor's task,
    /// with a clone of the actor it will run inside of, so the resulting
    /// `State` can store that clone for later use (e.g. to schedule its own
    /// follow-up events).
    pub fn start(gen_state: impl FnOnce(Actor<State>) -> State + Send + 'static) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Task<State>>();
        let stopped = Arc::new(AtomicBool::new(false));
        let actor = Self {
            sender,
            stopped: stopped.clone(),
        };
        let actor_for_task = actor.clone();
        tokio::spawn(async move {
            let mut state = gen_state(actor_for_task);
            while let Some(task) = receiver.recv().await {
                if stopped.load(Ordering::Relaxed) {
                    break;
                }
                task(&mut state);
            }
        });
        actor
    }

    /// Enqueues a task to run on the actor as soon as it is reached.
    pub fn send(&self, task: impl FnOnce(&mut State) + Send + 'static) {
        let _ = self.sender.send(Box::new(task));
    }

    /// Enqueues a task to run after `delay`, without blocking the actor in
    /// the meantime.
    pub fn send_delayed(&self, delay: Duration, task: impl FnOnce(&mut State) + Send + 'static) {
        let sender = self.sender.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = sender.send(Box::new(task));
        });
    }

    /// Stops the actor's task. Any tasks already queued ahead of the stop
    /// signal still run; nothing queued after it does. Safe to call more
    /// than once.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Relaxed);
        // Kick the loop in case it's blocked in `recv().await`.
        let _ = self.sender.send(Box::new(|_state: &mut State| {}));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[tokio::test]
    async fn tasks_run_in_order() {
        let log = Arc::new(Mutex::new(Vec::<u32>::new()));
        let log_for_state = log.clone();
        let actor: Actor<Vec<u32>> = Actor::start(move |_self_actor| {
            let _ = log_for_state;
            Vec::new()
        });
        for i in 0..10 {
            actor.send(move |state: &mut Vec<u32>| state.push(i));
        }
        let (tx, rx) = tokio::sync::oneshot::channel();
        actor.send(move |state: &mut Vec<u32>| {
            let _ = tx.send(state.clone());
        });
        let observed = rx.await.unwrap();
        assert_eq!(observed, (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn delayed_tasks_do_not_block_the_actor() {
        let actor: Actor<u32> = Actor::start(|_| 0u32);
        actor.send_delayed(Duration::from_millis(30), |state| *state += 1);
        actor.send(|state| *state += 10);
        tokio::time::sleep(Duration::from_millis(60)).await;
        let (tx, rx) = tokio::sync::oneshot::channel();
        actor.send(move |state| {
            let _ = tx.send(*state);
        });
        assert_eq!(rx.await.unwrap(), 11);
    }

    #[tokio::test]
    async fn stop_prevents_further_processing() {
        let actor: Actor<u32> = Actor::start(|_| 0u32);
        actor.stop();
        actor.send(|state| *state += 100);
        tokio::time::sleep(Duration::from_millis(20)).await;
        // We can't observe state after stop (no task runs), but we can at
        // least confirm `stop` is idempotent and doesn't panic.
        actor.stop();
    }
}
