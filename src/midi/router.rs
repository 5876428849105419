// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, error, info, span, warn, Level};

use super::{
    learner::MidiLearner,
    mapping::{MappingKey, MidiAction, MidiMapping},
    message::MidiMessage,
    store::MappingStore,
};
use crate::transport::{normalize_pitch, normalize_slider, TransportController};

/// How long stop() waits for the dispatch thread by default.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(1);

/// An external producer of messages, consumed instead of the router's queue. The router can only
/// stop between messages, so the source must yield regularly for stop() to be prompt.
pub type MessageSource = Box<dyn Iterator<Item = MidiMessage> + Send>;

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("unable to start the MIDI router thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("MIDI router thread did not stop within {0:?}")]
    StopTimeout(Duration),
}

enum Event {
    Message(MidiMessage),
    /// Wakes the dispatch loop so it can see its stop flag.
    Wake,
}

enum Source {
    Queue,
    External(Option<MessageSource>),
}

struct Worker {
    stop: Arc<AtomicBool>,
    /// Disconnects when the dispatch thread exits.
    exited: Receiver<()>,
    handle: JoinHandle<()>,
}

/// Shared by the router and its dispatch thread.
struct Dispatcher {
    store: Arc<dyn MappingStore>,
    learner: Arc<MidiLearner>,
    controller: Arc<dyn TransportController>,
}

/// Routes MIDI messages to transport actions on a dedicated thread.
///
/// Messages with a persisted mapping are dispatched directly. Messages without one are offered
/// to the learner; if a binding was pending the new mapping is dispatched, otherwise the message
/// is dropped.
pub struct MidiRouter {
    dispatcher: Arc<Dispatcher>,
    sender: Sender<Event>,
    receiver: Receiver<Event>,
    source: Mutex<Source>,
    stop_timeout: Duration,
    worker: Mutex<Option<Worker>>,
}

impl MidiRouter {
    /// Creates a router that reads from its own queue, fed by [MidiRouter::enqueue].
    pub fn new(
        controller: Arc<dyn TransportController>,
        store: Arc<dyn MappingStore>,
        learner: Option<Arc<MidiLearner>>,
    ) -> MidiRouter {
        let learner = learner.unwrap_or_else(|| Arc::new(MidiLearner::new(store.clone())));
        let (sender, receiver) = crossbeam_channel::unbounded();
        MidiRouter {
            dispatcher: Arc::new(Dispatcher {
                store,
                learner,
                controller,
            }),
            sender,
            receiver,
            source: Mutex::new(Source::Queue),
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            worker: Mutex::new(None),
        }
    }

    /// Creates a router that reads from an external source instead of its queue. The source is
    /// consumed by the first run; once it's exhausted the router has nothing left to read.
    pub fn with_source(
        controller: Arc<dyn TransportController>,
        store: Arc<dyn MappingStore>,
        learner: Option<Arc<MidiLearner>>,
        source: MessageSource,
    ) -> MidiRouter {
        let router = MidiRouter::new(controller, store, learner);
        *router.source.lock() = Source::External(Some(source));
        router
    }

    pub fn with_stop_timeout(mut self, stop_timeout: Duration) -> MidiRouter {
        self.stop_timeout = stop_timeout;
        self
    }

    pub fn learner(&self) -> Arc<MidiLearner> {
        self.dispatcher.learner.clone()
    }

    /// A sender that can feed the queue from other threads, e.g. a MIDI input callback.
    pub fn sender(&self) -> MessageSender {
        MessageSender {
            sender: self.sender.clone(),
        }
    }

    /// Hands a message to the dispatch thread. Never blocks.
    pub fn enqueue(&self, message: MidiMessage) {
        // The router holds a receiver, so the channel can't be disconnected.
        let _ = self.sender.send(Event::Message(message));
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(|worker| !worker.handle.is_finished())
    }

    /// Starts the dispatch thread. Does nothing if it's already running.
    pub fn start(&self) -> Result<(), RouterError> {
        let mut worker = self.worker.lock();
        if worker
            .as_ref()
            .is_some_and(|worker| !worker.handle.is_finished())
        {
            return Ok(());
        }

        let source = match &mut *self.source.lock() {
            Source::Queue => None,
            Source::External(source) => match source.take() {
                Some(source) => Some(source),
                None => {
                    warn!("MIDI message source has already been consumed, not starting router");
                    return Ok(());
                }
            },
        };

        let stop = Arc::new(AtomicBool::new(false));
        let (exited_tx, exited) = crossbeam_channel::bounded::<()>(0);
        let dispatcher = self.dispatcher.clone();
        let receiver = self.receiver.clone();
        let thread_stop = stop.clone();
        let handle = thread::Builder::new()
            .name("midi-router".into())
            .spawn(move || {
                let _exited = exited_tx;
                let span = span!(Level::INFO, "midi router");
                let _enter = span.enter();

                info!("MIDI router started");
                match source {
                    Some(source) => dispatcher.run_source(source, &thread_stop),
                    None => dispatcher.run_queue(&receiver, &thread_stop),
                }
                info!("MIDI router stopped");
            })
            .map_err(RouterError::Spawn)?;

        *worker = Some(Worker {
            stop,
            exited,
            handle,
        });
        Ok(())
    }

    /// Signals the dispatch thread to exit and waits for it, up to the stop timeout. The router
    /// is stopped afterwards either way; a thread that didn't exit in time is detached.
    pub fn stop(&self) -> Result<(), RouterError> {
        let Some(worker) = self.worker.lock().take() else {
            return Ok(());
        };

        worker.stop.store(true, Ordering::Release);
        let _ = self.sender.send(Event::Wake);

        match worker.exited.recv_timeout(self.stop_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if worker.handle.join().is_err() {
                    error!("MIDI router thread panicked");
                }
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    timeout = ?self.stop_timeout,
                    "MIDI router thread did not stop in time, detaching"
                );
                Err(RouterError::StopTimeout(self.stop_timeout))
            }
        }
    }
}

impl Drop for MidiRouter {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            error!(err = %e, "Error stopping MIDI router");
        }
    }
}

impl fmt::Debug for MidiRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MidiRouter")
            .field("running", &self.is_running())
            .field("queued", &self.receiver.len())
            .field("stop_timeout", &self.stop_timeout)
            .field("learner", &self.dispatcher.learner)
            .finish()
    }
}

/// Feeds a router's queue from another thread.
#[derive(Clone)]
pub struct MessageSender {
    sender: Sender<Event>,
}

impl MessageSender {
    pub fn send(&self, message: MidiMessage) {
        let _ = self.sender.send(Event::Message(message));
    }
}

impl fmt::Debug for MessageSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageSender").finish()
    }
}

impl Dispatcher {
    /// Messages queued before stop() was called are handled before the loop exits, since the
    /// wake is queued behind them.
    fn run_queue(&self, receiver: &Receiver<Event>, stop: &AtomicBool) {
        while let Ok(event) = receiver.recv() {
            match event {
                Event::Message(message) => self.handle(&message),
                // A wake left over from an earlier stop finds the flag clear.
                Event::Wake => {
                    if stop.load(Ordering::Acquire) {
                        return;
                    }
                }
            }
        }
    }

    fn run_source(&self, source: MessageSource, stop: &AtomicBool) {
        for message in source {
            if stop.load(Ordering::Acquire) {
                return;
            }
            self.handle(&message);
        }
        debug!("MIDI message source exhausted");
    }

    /// Handles a single message. Failures are logged and never stop the loop.
    fn handle(&self, message: &MidiMessage) {
        let key = MappingKey::from(message);
        let mapping = match self.lookup(&key) {
            Some(mapping) => mapping,
            None => match self.learn(message) {
                Some(mapping) => mapping,
                None => return,
            },
        };
        self.dispatch(&mapping, message);
    }

    fn lookup(&self, key: &MappingKey) -> Option<MidiMapping> {
        match self.store.get_mapping(key) {
            Ok(mapping) => mapping,
            Err(e) => {
                error!(key = %key, err = %e, "Unable to look up MIDI mapping");
                None
            }
        }
    }

    fn learn(&self, message: &MidiMessage) -> Option<MidiMapping> {
        match self.learner.process(message) {
            Ok(Some(mapping)) => Some(mapping),
            Ok(None) => {
                debug!(message = %message, "Ignoring unmapped MIDI message");
                None
            }
            Err(e) => {
                error!(message = %message, err = %e, "Unable to save learned MIDI mapping");
                None
            }
        }
    }

    fn dispatch(&self, mapping: &MidiMapping, message: &MidiMessage) {
        debug!(mapping = %mapping, value = message.value, "Dispatching MIDI message");
        let controller = &self.controller;
        match &mapping.action {
            MidiAction::PlayDeck(deck) => controller.toggle_play_pause(*deck),
            MidiAction::TempoDeck(deck) => {
                controller.set_tempo(*deck, normalize_slider(message.value))
            }
            MidiAction::PitchDeck(deck) => {
                controller.set_pitch(*deck, normalize_pitch(message.value))
            }
            MidiAction::Crossfader => controller.set_crossfader(normalize_slider(message.value)),
            MidiAction::SamplerPad => controller.trigger_sampler(mapping.pad(), message.value),
            MidiAction::Other(action) => {
                debug!(action, "Ignoring unknown MIDI action");
            }
        }
    }
}
