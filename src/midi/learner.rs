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

use std::{fmt, sync::Arc};

use parking_lot::Mutex;
use tracing::{debug, info};

use super::{
    mapping::{MappingKey, MidiAction, MidiMapping},
    message::MidiMessage,
    store::{MappingStore, StoreError},
};

/// An action waiting for a control to be bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingBinding {
    pub action: MidiAction,
    pub target: Option<String>,
}

/// Binds the next incoming control to a pending action. There is at most one pending binding;
/// starting a new one replaces the old.
pub struct MidiLearner {
    store: Arc<dyn MappingStore>,
    pending: Mutex<Option<PendingBinding>>,
}

impl MidiLearner {
    pub fn new(store: Arc<dyn MappingStore>) -> MidiLearner {
        MidiLearner {
            store,
            pending: Mutex::new(None),
        }
    }

    pub fn start_binding(&self, action: MidiAction, target: Option<String>) {
        info!(action = %action, target = ?target, "Waiting for a control to bind");
        *self.pending.lock() = Some(PendingBinding { action, target });
    }

    pub fn cancel(&self) {
        if self.pending.lock().take().is_some() {
            debug!("Cancelled pending binding");
        }
    }

    pub fn pending(&self) -> Option<PendingBinding> {
        self.pending.lock().clone()
    }

    pub fn is_learning(&self) -> bool {
        self.pending.lock().is_some()
    }

    /// Binds the message's control to the pending action, if there is one, and returns the
    /// persisted mapping. The new mapping is not dispatched for this message.
    ///
    /// If the store fails the binding stays pending, unless another binding was started in the
    /// meantime.
    pub fn process(&self, message: &MidiMessage) -> Result<Option<MidiMapping>, StoreError> {
        let Some(binding) = self.pending.lock().take() else {
            return Ok(None);
        };

        let mapping = MidiMapping::new(
            MappingKey::from(message),
            binding.action.clone(),
            binding.target.clone(),
        );
        if let Err(e) = self.store.save_mapping(mapping.clone()) {
            let mut pending = self.pending.lock();
            if pending.is_none() {
                *pending = Some(binding);
            }
            return Err(e);
        }

        info!(mapping = %mapping, "Learned mapping");
        Ok(Some(mapping))
    }
}

impl fmt::Debug for MidiLearner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MidiLearner")
            .field("pending", &*self.pending.lock())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use std::error::Error;

    use super::*;
    use crate::midi::{message::MessageType, store::MemoryMappingStore};
    use crate::testutil::FailingStore;
    use crate::transport::DeckId;

    #[test]
    fn test_no_pending_binding() -> Result<(), Box<dyn Error>> {
        let store = Arc::new(MemoryMappingStore::new());
        let learner = MidiLearner::new(store.clone());

        assert_eq!(
            learner.process(&MidiMessage::control_change(0, 10, 100))?,
            None
        );
        assert!(store.load_all()?.is_empty());
        Ok(())
    }

    #[test]
    fn test_learns_one_mapping() -> Result<(), Box<dyn Error>> {
        let store = Arc::new(MemoryMappingStore::new());
        let learner = MidiLearner::new(store.clone());

        learner.start_binding(MidiAction::SamplerPad, Some("4".into()));
        assert!(learner.is_learning());

        let mapping = learner
            .process(&MidiMessage::note_on(9, 36, 127))?
            .expect("mapping should be learned");
        assert_eq!(mapping.action, MidiAction::SamplerPad);
        assert_eq!(mapping.target.as_deref(), Some("4"));
        assert!(!learner.is_learning());

        let key = MappingKey::new(MessageType::NoteOn, 9, 36);
        assert_eq!(store.get_mapping(&key)?, Some(mapping));
        assert_eq!(store.load_all()?.len(), 1);

        // The slot is consumed.
        assert_eq!(learner.process(&MidiMessage::note_on(9, 37, 127))?, None);
        assert_eq!(store.load_all()?.len(), 1);
        Ok(())
    }

    #[test]
    fn test_last_binding_wins() -> Result<(), Box<dyn Error>> {
        let store = Arc::new(MemoryMappingStore::new());
        let learner = MidiLearner::new(store.clone());

        learner.start_binding(MidiAction::PlayDeck(DeckId::A), None);
        learner.start_binding(MidiAction::PlayDeck(DeckId::B), None);
        let mapping = learner.process(&MidiMessage::note_on(0, 1, 127))?;
        assert_eq!(
            mapping.map(|mapping| mapping.action),
            Some(MidiAction::PlayDeck(DeckId::B))
        );
        Ok(())
    }

    #[test]
    fn test_cancel() -> Result<(), Box<dyn Error>> {
        let store = Arc::new(MemoryMappingStore::new());
        let learner = MidiLearner::new(store.clone());

        learner.start_binding(MidiAction::Crossfader, None);
        learner.cancel();
        assert_eq!(learner.pending(), None);
        assert_eq!(
            learner.process(&MidiMessage::control_change(0, 10, 1))?,
            None
        );
        assert!(store.load_all()?.is_empty());
        Ok(())
    }

    #[test]
    fn test_binding_kept_when_save_fails() {
        let learner = MidiLearner::new(Arc::new(FailingStore::default()));

        learner.start_binding(MidiAction::TempoDeck(DeckId::A), None);
        assert!(matches!(
            learner.process(&MidiMessage::control_change(0, 10, 1)),
            Err(StoreError::Io { .. })
        ));
        assert_eq!(
            learner.pending(),
            Some(PendingBinding {
                action: MidiAction::TempoDeck(DeckId::A),
                target: None,
            })
        );
    }
}
