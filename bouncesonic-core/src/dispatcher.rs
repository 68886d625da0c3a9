//! Completion dispatch off the render context.

use crate::error::{BounceSonicError, Result};
use crate::events::BounceSonicEvent;
use crate::launch::{LaunchOutcome, PendingLaunch};
use crate::mixer::RenderEvent;
use crossbeam_channel::{Receiver, Sender, TrySendError, select};
use std::thread::JoinHandle;

/// Control-plane thread that turns render events into callbacks and public events.
pub(crate) struct Dispatcher {
    shutdown: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl Dispatcher {
    pub(crate) fn spawn(
        events: Receiver<RenderEvent>,
        launch_done: Receiver<u64>,
        launch: PendingLaunch,
        published: Sender<BounceSonicEvent>,
    ) -> Result<Self> {
        let (shutdown, shutdown_rx) = crossbeam_channel::bounded::<()>(0);

        let thread = std::thread::Builder::new()
            .name("bouncesonic-dispatch".into())
            .spawn(move || {
                loop {
                    select! {
                        recv(launch_done) -> ticket => match ticket {
                            Ok(ticket) => complete_launch(ticket, &launch, &published),
                            Err(_) => break,
                        },
                        recv(events) -> event => match event {
                            Ok(event) => dispatch(event, &published),
                            Err(_) => break,
                        },
                        recv(shutdown_rx) -> _ => break,
                    }
                }
                // Anything the graph reported before it stopped still counts.
                for ticket in launch_done.try_iter() {
                    complete_launch(ticket, &launch, &published);
                }
                for event in events.try_iter() {
                    dispatch(event, &published);
                }
                log::debug!("Dispatcher thread exiting");
            })
            .map_err(|e| {
                BounceSonicError::Engine(format!("Failed to spawn dispatcher thread: {}", e))
            })?;

        Ok(Self {
            shutdown: Some(shutdown),
            thread: Some(thread),
        })
    }

    /// Drain outstanding events and join the thread. Idempotent.
    pub(crate) fn shutdown(&mut self) {
        drop(self.shutdown.take());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Dispatcher thread panicked");
            }
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn complete_launch(ticket: u64, launch: &PendingLaunch, published: &Sender<BounceSonicEvent>) {
    if launch.complete(ticket) {
        publish(
            published,
            BounceSonicEvent::LaunchFinished {
                outcome: LaunchOutcome::Completed,
            },
        );
    }
}

fn dispatch(event: RenderEvent, published: &Sender<BounceSonicEvent>) {
    let public = match event {
        RenderEvent::CollisionFinished {
            handle, sequence, ..
        } => {
            log::debug!("Collision cue on {} finished (trigger {})", handle, sequence);
            BounceSonicEvent::CollisionFinished { handle }
        }
        RenderEvent::VoiceFault { handle } => {
            log::warn!("Silenced faulty voice (object: {:?})", handle);
            BounceSonicEvent::VoiceSilenced { handle }
        }
        RenderEvent::StreamError(error) => {
            log::error!("Audio stream error: {}", error);
            BounceSonicEvent::DeviceError { error }
        }
    };
    publish(published, public);
}

/// Queue `event` for `poll_events`, dropping it when the host is not draining.
pub(crate) fn publish(published: &Sender<BounceSonicEvent>, event: BounceSonicEvent) {
    match published.try_send(event) {
        Ok(()) | Err(TrySendError::Disconnected(_)) => {}
        Err(TrySendError::Full(event)) => {
            log::warn!("Event queue full, dropping {:?}", event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launch::{LaunchCompletion, LaunchCuePlayer};
    use crate::pool::{GameObjectHandle, SlotKey};
    use crossbeam_channel::{bounded, unbounded};
    use std::time::Duration;

    const TIMEOUT: Duration = Duration::from_secs(2);

    #[test]
    fn test_launch_completion_runs_on_dispatcher_thread() {
        let (_render_tx, render_rx) = unbounded();
        let (launch_tx, launch_rx) = bounded(1);
        let (public_tx, public_rx) = unbounded();
        let (thread_tx, thread_rx) = unbounded();

        let mut launch = LaunchCuePlayer::new(0.35);
        let completion: LaunchCompletion = Box::new(move |outcome| {
            let name = std::thread::current().name().map(str::to_owned);
            let _ = thread_tx.send((outcome, name));
        });
        let ticket = launch.begin(completion).unwrap();

        let mut dispatcher =
            Dispatcher::spawn(render_rx, launch_rx, launch.pending(), public_tx).unwrap();
        launch_tx.send(ticket).unwrap();

        let (outcome, thread) = thread_rx.recv_timeout(TIMEOUT).unwrap();
        assert_eq!(outcome, LaunchOutcome::Completed);
        assert_eq!(thread.as_deref(), Some("bouncesonic-dispatch"));
        assert_eq!(
            public_rx.recv_timeout(TIMEOUT).unwrap(),
            BounceSonicEvent::LaunchFinished {
                outcome: LaunchOutcome::Completed
            }
        );
        dispatcher.shutdown();
    }

    #[test]
    fn test_shutdown_drains_queued_events() {
        let (render_tx, render_rx) = unbounded();
        let (public_tx, public_rx) = unbounded();
        let handle = GameObjectHandle::new(4);
        for sequence in 1..=3 {
            render_tx
                .send(RenderEvent::CollisionFinished {
                    handle,
                    key: SlotKey {
                        index: 0,
                        generation: 0,
                    },
                    sequence,
                })
                .unwrap();
        }

        let (_launch_tx, launch_rx) = bounded(1);
        let mut dispatcher =
            Dispatcher::spawn(render_rx, launch_rx, PendingLaunch::default(), public_tx).unwrap();
        dispatcher.shutdown();
        dispatcher.shutdown();

        let events: Vec<_> = public_rx.try_iter().collect();
        assert_eq!(events.len(), 3);
        assert!(events.iter().all(|e| e.handle() == Some(handle)));
    }

    #[test]
    fn test_unknown_launch_ticket_is_ignored() {
        let (_render_tx, render_rx) = unbounded();
        let (launch_tx, launch_rx) = bounded(1);
        let (public_tx, public_rx) = unbounded();
        let mut dispatcher =
            Dispatcher::spawn(render_rx, launch_rx, PendingLaunch::default(), public_tx).unwrap();
        launch_tx.send(42).unwrap();
        dispatcher.shutdown();
        assert!(public_rx.try_recv().is_err());
    }

    #[test]
    fn test_full_event_queue_drops_instead_of_growing() {
        let (render_tx, render_rx) = unbounded();
        let (_launch_tx, launch_rx) = bounded(1);
        let (public_tx, public_rx) = bounded(2);
        let handle = GameObjectHandle::new(8);
        for sequence in 1..=5 {
            render_tx
                .send(RenderEvent::CollisionFinished {
                    handle,
                    key: SlotKey {
                        index: 0,
                        generation: 0,
                    },
                    sequence,
                })
                .unwrap();
        }

        let mut dispatcher =
            Dispatcher::spawn(render_rx, launch_rx, PendingLaunch::default(), public_tx).unwrap();
        dispatcher.shutdown();
        assert_eq!(public_rx.try_iter().count(), 2);
    }
}
