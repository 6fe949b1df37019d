//! Ordered persona slots shared between the session and its background tasks
//!
//! Every mutation targets a slot by id. Asynchronous producers capture the
//! collection's generation when they start and pass it back with their result;
//! [`PersonaCollection::reset`] bumps the generation so results started before
//! a reset are dropped instead of landing on the new set of slots.

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::{Persona, PersonaContent, PersonaOrigin, PersonaStatus};

/// Collection handle shared across tasks. Never hold the lock across `.await`.
pub type SharedCollection = Arc<Mutex<PersonaCollection>>;

#[derive(Debug, Clone, Default)]
pub struct PersonaCollection {
    personas: Vec<Persona>,
    generation: u64,
}

impl PersonaCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedCollection {
        Arc::new(Mutex::new(Self::new()))
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }

    pub fn len(&self) -> usize {
        self.personas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.personas.is_empty()
    }

    pub fn list(&self) -> &[Persona] {
        &self.personas
    }

    pub fn get(&self, id: &str) -> Option<&Persona> {
        self.personas.iter().find(|p| p.id == id)
    }

    fn get_mut(&mut self, id: &str) -> Result<&mut Persona> {
        self.personas
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| Error::not_found("persona", id))
    }

    /// Append a slot, returning its id
    pub fn add(&mut self, persona: Persona) -> String {
        let id = persona.id.clone();
        self.personas.push(persona);
        id
    }

    /// Append a batch only if `generation` is still current
    pub fn install(&mut self, generation: u64, personas: Vec<Persona>) -> bool {
        if !self.is_current(generation) {
            debug!(generation, current = self.generation, "Dropping stale batch");
            return false;
        }
        self.personas.extend(personas);
        true
    }

    pub fn remove(&mut self, id: &str) -> Result<Persona> {
        let index = self
            .personas
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| Error::not_found("persona", id))?;
        Ok(self.personas.remove(index))
    }

    /// Flip the lock flag, returning the new value
    pub fn toggle_lock(&mut self, id: &str) -> Result<bool> {
        let persona = self.get_mut(id)?;
        persona.is_locked = !persona.is_locked;
        Ok(persona.is_locked)
    }

    pub fn set_status(&mut self, id: &str, status: PersonaStatus) -> Result<()> {
        self.get_mut(id)?.status = status;
        Ok(())
    }

    /// Swap a slot's content. Locked slots are refused.
    pub fn replace_content(
        &mut self,
        id: &str,
        content: PersonaContent,
        origin: PersonaOrigin,
        expanded: bool,
    ) -> Result<()> {
        let persona = self.get_mut(id)?;
        if persona.is_locked {
            return Err(Error::Locked(id.to_string()));
        }
        persona.replace_content(content, origin, expanded);
        Ok(())
    }

    /// Generation-checked update of one slot.
    ///
    /// Returns false without calling `f` when the generation is stale or the
    /// slot no longer exists.
    pub fn apply<F>(&mut self, generation: u64, id: &str, f: F) -> bool
    where
        F: FnOnce(&mut Persona),
    {
        if !self.is_current(generation) {
            debug!(id, generation, current = self.generation, "Dropping stale update");
            return false;
        }
        match self.personas.iter_mut().find(|p| p.id == id) {
            Some(persona) => {
                f(persona);
                true
            }
            None => false,
        }
    }

    /// Drop every slot and start a new generation
    pub fn reset(&mut self) -> u64 {
        self.personas.clear();
        self.generation += 1;
        self.generation
    }

    /// Move every `loading` slot to `idle`. Returns how many were settled.
    pub fn settle_loading(&mut self, generation: u64) -> usize {
        if !self.is_current(generation) {
            return 0;
        }
        let mut settled = 0;
        for persona in self.personas.iter_mut().filter(|p| p.is_loading()) {
            persona.status = PersonaStatus::Idle;
            settled += 1;
        }
        settled
    }

    pub fn unlocked_ids(&self) -> Vec<String> {
        self.personas
            .iter()
            .filter(|p| !p.is_locked)
            .map(|p| p.id.clone())
            .collect()
    }

    /// Ids of slots a test run would pick up
    pub fn ready_ids(&self) -> Vec<String> {
        self.personas
            .iter()
            .filter(|p| p.is_ready())
            .map(|p| p.id.clone())
            .collect()
    }

    pub fn count_status(&self, status: PersonaStatus) -> usize {
        self.personas.iter().filter(|p| p.status == status).count()
    }

    pub fn any_loading(&self) -> bool {
        self.personas.iter().any(Persona::is_loading)
    }
}
