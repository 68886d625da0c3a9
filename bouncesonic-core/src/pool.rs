//! Collision player pool.
//!
//! Every live game object that makes noise owns exactly one [`PlayerSlot`]. Slots
//! live in an arena indexed by [`SlotKey`]; freed indices are reused with a bumped
//! generation so render-side state for a destroyed object can never be mistaken
//! for its successor.

use crate::config::ImpulseCurve;
use crate::error::{BounceSonicError, Result};
use crate::math::Vec3;
use crate::mixer::GraphCommand;
use crate::spatial::SpatialMixer;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Opaque identity of a scene object, assigned by the scene.
///
/// The pool never owns the object; it only keeps this id while the object is live.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GameObjectHandle(u64);

impl GameObjectHandle {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for GameObjectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "GameObjectHandle({})", self.0)
    }
}

/// Arena address of a slot: index plus the generation it was allocated in.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SlotKey {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl SlotKey {
    pub fn index(&self) -> usize {
        self.index as usize
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl std::fmt::Display for SlotKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SlotKey({}v{})", self.index, self.generation)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attachment {
    Detached,
    Attached,
}

/// What `play_collision` does for an object that has no player yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CollisionPolicy {
    /// Create the player on the fly. Physics contacts can arrive before the scene
    /// reports the object.
    #[default]
    AutoCreate,
    /// Reject with `UnknownHandle`.
    RequireExisting,
}

/// One collision player bound to one game object.
#[derive(Debug, Clone)]
pub struct PlayerSlot {
    pub handle: GameObjectHandle,
    pub key: SlotKey,
    /// Position of the most recent collision
    pub position: Vec3,
    pub attachment: Attachment,
    /// Gain and rate of the most recent collision
    pub gain: f32,
    pub rate: f32,
}

/// Per-index playback counters shared with the render graph.
///
/// The control plane bumps `started` on every trigger; the render graph stores
/// the trigger's sequence number in `finished` when the voice runs dry. A slot is
/// sounding while the two differ. Counters are never reset, so a late write from
/// a voice that was already replaced cannot mark its successor idle.
pub(crate) struct SlotActivity {
    started: Box<[AtomicU32]>,
    finished: Box<[AtomicU32]>,
}

impl SlotActivity {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            started: (0..capacity).map(|_| AtomicU32::new(0)).collect(),
            finished: (0..capacity).map(|_| AtomicU32::new(0)).collect(),
        }
    }

    pub(crate) fn begin(&self, index: usize) -> u32 {
        self.started[index].fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Mark the slot idle without waiting for the render graph.
    pub(crate) fn halt(&self, index: usize) {
        let started = self.started[index].load(Ordering::Acquire);
        self.finished[index].store(started, Ordering::Release);
    }

    pub(crate) fn finish(&self, index: usize, sequence: u32) {
        if let Some(finished) = self.finished.get(index) {
            finished.store(sequence, Ordering::Release);
        }
    }

    pub(crate) fn is_active(&self, index: usize) -> bool {
        self.started[index].load(Ordering::Acquire) != self.finished[index].load(Ordering::Acquire)
    }
}

enum Entry {
    Occupied(PlayerSlot),
    Vacant { generation: u32 },
}

/// Map from live game objects to their collision players.
pub struct PlayerPool {
    entries: Vec<Entry>,
    free: Vec<u32>,
    by_handle: HashMap<GameObjectHandle, SlotKey>,
    capacity: usize,
    activity: Arc<SlotActivity>,
}

impl PlayerPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            free: Vec::new(),
            by_handle: HashMap::with_capacity(capacity),
            capacity,
            activity: Arc::new(SlotActivity::new(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.by_handle.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_handle.is_empty()
    }

    pub fn contains(&self, handle: GameObjectHandle) -> bool {
        self.by_handle.contains_key(&handle)
    }

    pub fn slot(&self, handle: GameObjectHandle) -> Option<&PlayerSlot> {
        let key = self.by_handle.get(&handle)?;
        match &self.entries[key.index()] {
            Entry::Occupied(slot) => Some(slot),
            Entry::Vacant { .. } => None,
        }
    }

    /// Handles that currently own a player, in ascending order.
    pub fn handles(&self) -> Vec<GameObjectHandle> {
        let mut handles: Vec<_> = self.by_handle.keys().copied().collect();
        handles.sort();
        handles
    }

    /// Handles whose player is wired into the environment, in ascending order.
    pub fn attached_handles(&self) -> Vec<GameObjectHandle> {
        let mut handles: Vec<_> = self
            .entries
            .iter()
            .filter_map(|entry| match entry {
                Entry::Occupied(slot) if slot.attachment == Attachment::Attached => {
                    Some(slot.handle)
                }
                _ => None,
            })
            .collect();
        handles.sort();
        handles
    }

    /// Whether the object's collision sound is currently audible.
    pub fn is_active(&self, handle: GameObjectHandle) -> bool {
        self.by_handle
            .get(&handle)
            .is_some_and(|key| self.activity.is_active(key.index()))
    }

    pub(crate) fn activity(&self) -> Arc<SlotActivity> {
        self.activity.clone()
    }

    /// Allocate a player for `handle` and wire it into the environment.
    ///
    /// Fails with `DuplicateHandle` if the object already has a player; the existing
    /// player is left untouched.
    pub fn create_player(
        &mut self,
        handle: GameObjectHandle,
        mixer: &mut SpatialMixer,
    ) -> Result<SlotKey> {
        if self.by_handle.contains_key(&handle) {
            log::warn!("Ignoring duplicate player creation for {}", handle);
            return Err(BounceSonicError::DuplicateHandle(handle));
        }

        let key = self.allocate()?;
        mixer.attach(key);

        self.entries[key.index()] = Entry::Occupied(PlayerSlot {
            handle,
            key,
            position: Vec3::ZERO,
            attachment: Attachment::Attached,
            gain: 0.0,
            rate: 1.0,
        });
        self.by_handle.insert(handle, key);

        log::debug!("Created player {} for {}", key, handle);
        Ok(key)
    }

    /// Stop, detach and release the player of `handle`.
    pub fn destroy_player(
        &mut self,
        handle: GameObjectHandle,
        mixer: &mut SpatialMixer,
    ) -> Result<()> {
        let Some(key) = self.by_handle.remove(&handle) else {
            log::warn!("Ignoring destroy for {} which has no player", handle);
            return Err(BounceSonicError::UnknownHandle(handle));
        };

        // Detach also stops the render-side voice.
        mixer.detach(key);
        self.activity.halt(key.index());

        self.entries[key.index()] = Entry::Vacant {
            generation: key.generation.wrapping_add(1),
        };
        self.free.push(key.index);

        log::debug!("Destroyed player {} for {}", key, handle);
        Ok(())
    }

    /// Position the object's player at `position` and restart the collision cue.
    ///
    /// A hit on a player that is still sounding cuts the previous hit and starts
    /// over from the first sample.
    pub fn play_collision(
        &mut self,
        handle: GameObjectHandle,
        position: Vec3,
        impulse: f32,
        curve: &ImpulseCurve,
        policy: CollisionPolicy,
        mixer: &mut SpatialMixer,
    ) -> Result<SlotKey> {
        let key = match self.by_handle.get(&handle) {
            Some(key) => *key,
            None => match policy {
                CollisionPolicy::AutoCreate => {
                    log::debug!("Collision before creation for {}, creating player", handle);
                    self.create_player(handle, mixer)?
                }
                CollisionPolicy::RequireExisting => {
                    log::warn!("Collision for {} which has no player", handle);
                    return Err(BounceSonicError::UnknownHandle(handle));
                }
            },
        };

        let gain = curve.gain(impulse);
        let rate = curve.rate(impulse);

        let Entry::Occupied(slot) = &mut self.entries[key.index()] else {
            return Err(BounceSonicError::UnknownHandle(handle));
        };
        slot.position = position;
        slot.gain = gain;
        slot.rate = rate;

        let sequence = self.activity.begin(key.index());
        mixer.send(GraphCommand::TriggerCollision {
            handle,
            key,
            sequence,
            position,
            gain,
            rate,
        });

        log::debug!(
            "Collision on {} at {:?} (impulse {:.2} -> gain {:.3}, rate {:.3})",
            handle,
            position,
            impulse,
            gain,
            rate
        );
        Ok(key)
    }

    /// Destroy every player. Returns how many were released.
    pub fn clear(&mut self, mixer: &mut SpatialMixer) -> usize {
        let handles: Vec<_> = self.by_handle.keys().copied().collect();
        let count = handles.len();
        for handle in handles {
            // Cannot fail: the handle was just read from the map.
            let _ = self.destroy_player(handle, mixer);
        }
        count
    }

    fn allocate(&mut self) -> Result<SlotKey> {
        if let Some(index) = self.free.pop() {
            let generation = match self.entries[index as usize] {
                Entry::Vacant { generation } => generation,
                Entry::Occupied(_) => {
                    return Err(BounceSonicError::Engine(format!(
                        "free list points at occupied slot {}",
                        index
                    )));
                }
            };
            return Ok(SlotKey { index, generation });
        }

        if self.entries.len() >= self.capacity {
            return Err(BounceSonicError::PoolExhausted {
                capacity: self.capacity,
            });
        }

        let index = self.entries.len() as u32;
        self.entries.push(Entry::Vacant { generation: 0 });
        Ok(SlotKey {
            index,
            generation: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::EnvironmentState;

    fn mixer() -> SpatialMixer {
        SpatialMixer::new(EnvironmentState::default())
    }

    fn assert_attached_matches_live(pool: &PlayerPool, mixer: &SpatialMixer) {
        assert_eq!(pool.attached_handles(), pool.handles());
        assert_eq!(mixer.attached_count(), pool.len());
    }

    #[test]
    fn test_attached_set_tracks_live_handles() {
        let mut pool = PlayerPool::new(8);
        let mut mixer = mixer();
        let a = GameObjectHandle::new(1);
        let b = GameObjectHandle::new(2);
        let c = GameObjectHandle::new(3);

        pool.create_player(a, &mut mixer).unwrap();
        assert_attached_matches_live(&pool, &mixer);
        pool.create_player(b, &mut mixer).unwrap();
        assert_attached_matches_live(&pool, &mixer);
        pool.destroy_player(a, &mut mixer).unwrap();
        assert_attached_matches_live(&pool, &mixer);
        pool.create_player(c, &mut mixer).unwrap();
        assert_attached_matches_live(&pool, &mixer);
        pool.create_player(a, &mut mixer).unwrap();
        assert_attached_matches_live(&pool, &mixer);
        pool.destroy_player(b, &mut mixer).unwrap();
        assert_attached_matches_live(&pool, &mixer);

        assert_eq!(pool.handles(), vec![a, c]);
    }

    #[test]
    fn test_duplicate_create_is_rejected_without_side_effects() {
        let mut pool = PlayerPool::new(4);
        let mut mixer = mixer();
        let handle = GameObjectHandle::new(7);

        let key = pool.create_player(handle, &mut mixer).unwrap();
        let err = pool.create_player(handle, &mut mixer).unwrap_err();
        assert!(matches!(err, BounceSonicError::DuplicateHandle(h) if h == handle));
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.slot(handle).unwrap().key, key);
    }

    #[test]
    fn test_double_destroy_reports_unknown_handle() {
        let mut pool = PlayerPool::new(4);
        let mut mixer = mixer();
        let handle = GameObjectHandle::new(9);

        pool.create_player(handle, &mut mixer).unwrap();
        assert!(pool.destroy_player(handle, &mut mixer).is_ok());
        let err = pool.destroy_player(handle, &mut mixer).unwrap_err();
        assert!(matches!(err, BounceSonicError::UnknownHandle(h) if h == handle));
        assert!(pool.is_empty());
        assert_eq!(mixer.attached_count(), 0);
    }

    #[test]
    fn test_freed_slots_are_reused_with_new_generation() {
        let mut pool = PlayerPool::new(2);
        let mut mixer = mixer();
        let first = pool
            .create_player(GameObjectHandle::new(1), &mut mixer)
            .unwrap();
        pool.destroy_player(GameObjectHandle::new(1), &mut mixer)
            .unwrap();
        let second = pool
            .create_player(GameObjectHandle::new(2), &mut mixer)
            .unwrap();

        assert_eq!(first.index(), second.index());
        assert_ne!(first.generation(), second.generation());
    }

    #[test]
    fn test_capacity_is_enforced() {
        let mut pool = PlayerPool::new(2);
        let mut mixer = mixer();
        pool.create_player(GameObjectHandle::new(1), &mut mixer)
            .unwrap();
        pool.create_player(GameObjectHandle::new(2), &mut mixer)
            .unwrap();
        let err = pool
            .create_player(GameObjectHandle::new(3), &mut mixer)
            .unwrap_err();
        assert!(matches!(err, BounceSonicError::PoolExhausted { capacity: 2 }));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_collision_auto_creates_player() {
        let mut pool = PlayerPool::new(4);
        let mut mixer = mixer();
        let handle = GameObjectHandle::new(5);

        pool.play_collision(
            handle,
            Vec3::new(1.0, 0.0, 0.0),
            5.0,
            &ImpulseCurve::default(),
            CollisionPolicy::AutoCreate,
            &mut mixer,
        )
        .unwrap();

        let slot = pool.slot(handle).unwrap();
        assert_eq!(slot.position, Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(slot.attachment, Attachment::Attached);
        assert!(pool.is_active(handle));
    }

    #[test]
    fn test_collision_requiring_existing_player_is_rejected() {
        let mut pool = PlayerPool::new(4);
        let mut mixer = mixer();
        let handle = GameObjectHandle::new(5);

        let err = pool
            .play_collision(
                handle,
                Vec3::ZERO,
                1.0,
                &ImpulseCurve::default(),
                CollisionPolicy::RequireExisting,
                &mut mixer,
            )
            .unwrap_err();
        assert!(matches!(err, BounceSonicError::UnknownHandle(_)));
        assert!(pool.is_empty());
        assert_eq!(mixer.attached_count(), 0);
        assert_eq!(CollisionPolicy::default(), CollisionPolicy::AutoCreate);
    }

    #[test]
    fn test_activity_survives_late_finish_from_previous_trigger() {
        let activity = SlotActivity::new(1);
        let first = activity.begin(0);
        let second = activity.begin(0);
        // The first voice reports in after it was retriggered.
        activity.finish(0, first);
        assert!(activity.is_active(0));
        activity.finish(0, second);
        assert!(!activity.is_active(0));
    }

    #[test]
    fn test_clear_releases_everything() {
        let mut pool = PlayerPool::new(4);
        let mut mixer = mixer();
        for id in 0..3 {
            pool.create_player(GameObjectHandle::new(id), &mut mixer)
                .unwrap();
        }
        assert_eq!(pool.clear(&mut mixer), 3);
        assert!(pool.is_empty());
        assert!(pool.attached_handles().is_empty());
        assert_eq!(mixer.attached_count(), 0);
    }
}
