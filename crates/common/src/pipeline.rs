//! Persona acquisition pipeline
//!
//! Fetches personas from a [`PersonaSource`], expands them one at a time and
//! writes every intermediate result into a [`SharedCollection`] by slot id.
//! Every path ends with the touched slots out of `loading`: remote failures
//! degrade to placeholder content or to an unexpanded idle persona.

use futures::future::try_join_all;
use rand::seq::SliceRandom;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::collection::SharedCollection;
use crate::error::{Error, Result};
use crate::placeholder::{self, is_loading_content, loading_content, placeholder_content, placeholder_persona};
use crate::source::{ExpandRequest, PersonaSource};
use crate::types::{Audience, Persona, PersonaContent, PersonaOrigin, PersonaStatus};

/// Settles the slots an operation marked `loading` when it ends, however it
/// ends. A slot still showing loading content gets placeholder content for
/// its index; locked slots only settle.
struct SlotGuard {
    collection: SharedCollection,
    generation: u64,
    slots: Vec<(String, usize)>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        let mut guard = self.collection.lock();
        let mut settled = 0;
        for (id, index) in &self.slots {
            guard.apply(self.generation, id, |slot| {
                if !slot.is_loading() {
                    return;
                }
                if !slot.is_locked && is_loading_content(&slot.content) {
                    slot.replace_content(placeholder_content(*index), PersonaOrigin::Placeholder, false);
                }
                slot.status = PersonaStatus::Idle;
                settled += 1;
            });
        }
        if settled > 0 {
            warn!(settled, "Settled personas left loading by an abandoned operation");
        }
    }
}

#[derive(Clone)]
pub struct Pipeline {
    source: Arc<dyn PersonaSource>,
    audience: Audience,
}

fn random_avatar() -> &'static str {
    placeholder::AVATARS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(placeholder::LOADING_AVATAR)
}

impl Pipeline {
    pub fn new(source: Arc<dyn PersonaSource>) -> Self {
        Self {
            source,
            audience: Audience::default(),
        }
    }

    pub fn with_audience(mut self, audience: Audience) -> Self {
        self.audience = audience;
        self
    }

    pub fn audience(&self) -> Audience {
        self.audience
    }

    /// Step 1 only: a `loading`, unexpanded persona built from a random name
    pub async fn fetch_random_persona(&self) -> Result<Persona> {
        let name = self.source.fetch_random_name().await?;
        if name.name.trim().is_empty() {
            return Err(Error::InvalidPersona(vec!["Missing field: name".to_string()]));
        }
        let content = PersonaContent::new(name.name, self.audience.label(), name.base_persona, random_avatar());
        Ok(Persona::new(content, PersonaOrigin::Remote).with_status(PersonaStatus::Loading))
    }

    /// Fetch `count` personas concurrently. If any call fails the whole batch
    /// is replaced by placeholders `0..count`.
    pub async fn fetch_personas(&self, count: usize) -> Vec<Persona> {
        let calls = (0..count).map(|_| self.fetch_random_persona());
        match try_join_all(calls).await {
            Ok(personas) => {
                debug!(count, "Fetched persona batch");
                personas
            }
            Err(e) => {
                warn!(count, error = %e, "Persona batch failed, using placeholders");
                (0..count).map(placeholder_persona).collect()
            }
        }
    }

    /// Step 2. Already expanded personas are returned as-is without a call.
    /// On failure the content is left untouched and the persona settles idle.
    pub async fn expand_persona_details(&self, mut persona: Persona) -> Persona {
        if persona.expanded {
            return persona;
        }

        let request = ExpandRequest::for_content(&persona.content);
        let merged = match self.source.expand_persona(&request).await {
            Ok(details) => {
                let mut content = persona.content.clone();
                details.merge_into(&mut content).map(|_| content)
            }
            Err(e) => Err(e),
        };

        match merged {
            Ok(content) => {
                persona.content = content;
                persona.expanded = true;
                debug!(id = %persona.id, name = %persona.content.name, "Persona expanded");
            }
            Err(e) => {
                warn!(id = %persona.id, name = %persona.content.name, error = %e, "Expansion failed, keeping base persona");
            }
        }
        persona.status = PersonaStatus::Idle;
        persona
    }

    /// Expand the given slots in order, one at a time, writing each result
    /// as soon as it arrives. Placeholder and already expanded slots are
    /// settled without a call. Returns how many slots were expanded.
    pub async fn expand_sequentially(
        &self,
        collection: &SharedCollection,
        generation: u64,
        ids: &[String],
    ) -> usize {
        let mut expanded = 0;
        for id in ids {
            let snapshot = {
                let guard = collection.lock();
                if !guard.is_current(generation) {
                    debug!(generation, "Collection reset, stopping expansion");
                    break;
                }
                guard.get(id).cloned()
            };
            let Some(persona) = snapshot else {
                continue;
            };

            if persona.origin == PersonaOrigin::Placeholder || persona.expanded {
                collection.lock().apply(generation, id, settle);
                continue;
            }

            let result = self.expand_persona_details(persona).await;
            if result.expanded {
                expanded += 1;
            }
            collection.lock().apply(generation, id, |slot| fill_slot(slot, result));
        }
        expanded
    }

    /// Fill a fresh collection generation with `count` personas.
    ///
    /// Loading slots are installed first, then filled with the fetched batch
    /// and expanded in order. Returns the slot ids.
    pub async fn populate(
        &self,
        collection: &SharedCollection,
        generation: u64,
        count: usize,
    ) -> Vec<String> {
        let slots: Vec<Persona> = (0..count).map(|_| self.loading_slot()).collect();
        let ids: Vec<String> = slots.iter().map(|p| p.id.clone()).collect();

        if !collection.lock().install(generation, slots) {
            return Vec::new();
        }
        let _settle = SlotGuard {
            collection: collection.clone(),
            generation,
            slots: ids.iter().cloned().zip(0..).collect(),
        };

        info!(count, audience = %self.audience, "Acquiring personas");
        let batch = self.fetch_personas(count).await;
        self.assign(collection, generation, &ids, batch);
        let expanded = self.expand_sequentially(collection, generation, &ids).await;
        info!(count, expanded, "Persona acquisition finished");
        ids
    }

    /// Replace one slot's content with a freshly fetched persona.
    ///
    /// Locked slots are rejected. On total failure the slot keeps its id and
    /// receives placeholder content.
    pub async fn refresh_one(
        &self,
        collection: &SharedCollection,
        generation: u64,
        id: &str,
    ) -> Result<()> {
        let index = {
            let mut guard = collection.lock();
            let index = guard
                .list()
                .iter()
                .position(|p| p.id == id)
                .ok_or_else(|| Error::not_found("persona", id))?;
            if guard.list()[index].is_locked {
                return Err(Error::Locked(id.to_string()));
            }
            guard.apply(generation, id, |slot| slot.status = PersonaStatus::Loading);
            index
        };
        let _settle = SlotGuard {
            collection: collection.clone(),
            generation,
            slots: vec![(id.to_string(), index)],
        };

        match self.fetch_random_persona().await {
            Ok(fresh) => {
                collection.lock().apply(generation, id, |slot| fill_slot(slot, fresh));
                let ids = [id.to_string()];
                self.expand_sequentially(collection, generation, &ids).await;
            }
            Err(e) => {
                warn!(id, error = %e, "Refresh failed, using placeholder");
                collection
                    .lock()
                    .apply(generation, id, |slot| fill_slot(slot, placeholder_persona(index)));
            }
        }
        Ok(())
    }

    /// Replace the content of every unlocked slot. Locked slots are never
    /// touched. Returns the number of slots shuffled.
    pub async fn shuffle_unlocked(&self, collection: &SharedCollection, generation: u64) -> usize {
        let ids = {
            let mut guard = collection.lock();
            if !guard.is_current(generation) {
                return 0;
            }
            let ids = guard.unlocked_ids();
            for id in &ids {
                guard.apply(generation, id, |slot| slot.status = PersonaStatus::Loading);
            }
            ids
        };
        if ids.is_empty() {
            return 0;
        }
        let _settle = SlotGuard {
            collection: collection.clone(),
            generation,
            slots: ids.iter().cloned().zip(0..).collect(),
        };

        info!(count = ids.len(), "Shuffling unlocked personas");
        let batch = self.fetch_personas(ids.len()).await;
        self.assign(collection, generation, &ids, batch);
        self.expand_sequentially(collection, generation, &ids).await;
        ids.len()
    }

    /// Append one persona. The slot appears as `loading` immediately and is
    /// filled once the fetch settles.
    pub async fn add(&self, collection: &SharedCollection, generation: u64) -> Result<String> {
        let (id, index) = {
            let mut guard = collection.lock();
            if !guard.is_current(generation) {
                return Err(Error::Internal("collection was reset".into()));
            }
            let index = guard.len();
            (guard.add(self.loading_slot()), index)
        };
        let _settle = SlotGuard {
            collection: collection.clone(),
            generation,
            slots: vec![(id.clone(), index)],
        };

        match self.fetch_random_persona().await {
            Ok(fresh) => {
                collection.lock().apply(generation, &id, |slot| fill_slot(slot, fresh));
                let ids = [id.clone()];
                self.expand_sequentially(collection, generation, &ids).await;
            }
            Err(e) => {
                warn!(error = %e, "Add failed, using placeholder");
                collection
                    .lock()
                    .apply(generation, &id, |slot| fill_slot(slot, placeholder_persona(index)));
            }
        }
        Ok(id)
    }

    fn loading_slot(&self) -> Persona {
        Persona::new(loading_content(self.audience.label()), PersonaOrigin::Placeholder)
            .with_status(PersonaStatus::Loading)
    }

    fn assign(&self, collection: &SharedCollection, generation: u64, ids: &[String], batch: Vec<Persona>) {
        let mut guard = collection.lock();
        for (index, id) in ids.iter().enumerate() {
            let persona = batch
                .get(index)
                .cloned()
                .unwrap_or_else(|| Persona::new(placeholder_content(index), PersonaOrigin::Placeholder));
            guard.apply(generation, id, |slot| fill_slot(slot, persona));
        }
    }
}

fn settle(slot: &mut Persona) {
    if slot.is_loading() {
        slot.status = PersonaStatus::Idle;
    }
}

/// Move `persona`'s content into `slot`, keeping the slot's id. Locked slots
/// keep their content and only settle.
fn fill_slot(slot: &mut Persona, persona: Persona) {
    if slot.is_locked {
        settle(slot);
        return;
    }
    slot.replace_content(persona.content, persona.origin, persona.expanded);
    slot.status = persona.status;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::PersonaCollection;
    use crate::testing::ScriptedSource;
    use std::collections::HashSet;

    fn pipeline(source: &Arc<ScriptedSource>) -> Pipeline {
        Pipeline::new(source.clone())
    }

    #[tokio::test]
    async fn test_fetch_personas_returns_count_unique() {
        let source = Arc::new(ScriptedSource::new());
        let personas = pipeline(&source).fetch_personas(5).await;
        assert_eq!(personas.len(), 5);
        let ids: HashSet<_> = personas.iter().map(|p| p.id.clone()).collect();
        assert_eq!(ids.len(), 5);
        assert!(personas.iter().all(|p| p.origin == PersonaOrigin::Remote));
        assert!(personas.iter().all(|p| p.is_loading() && !p.expanded));
    }

    #[tokio::test]
    async fn test_one_failed_name_turns_batch_into_placeholders() {
        let source = Arc::new(ScriptedSource::new().fail_name_call(3));
        let personas = pipeline(&source).fetch_personas(5).await;
        assert_eq!(personas.len(), 5);
        for (i, persona) in personas.iter().enumerate() {
            assert_eq!(persona.origin, PersonaOrigin::Placeholder);
            assert_eq!(persona.content, placeholder_content(i));
            assert_eq!(persona.status, PersonaStatus::Idle);
        }
        let ids: HashSet<_> = personas.iter().map(|p| p.id.clone()).collect();
        assert_eq!(ids.len(), 5);
    }

    #[tokio::test]
    async fn test_expanded_persona_issues_no_call() {
        let source = Arc::new(ScriptedSource::new());
        let pipeline = pipeline(&source);
        let mut persona = pipeline.fetch_random_persona().await.unwrap();
        persona.expanded = true;

        let same = pipeline.expand_persona_details(persona.clone()).await;
        assert_eq!(same, persona);
        assert_eq!(source.expand_calls(), 0);
    }

    #[tokio::test]
    async fn test_expansion_failure_degrades_to_idle() {
        let source = Arc::new(ScriptedSource::new().fail_expand_call(1));
        let pipeline = pipeline(&source);
        let persona = pipeline.fetch_random_persona().await.unwrap();
        let before = persona.content.clone();

        let result = pipeline.expand_persona_details(persona).await;
        assert_eq!(result.status, PersonaStatus::Idle);
        assert!(!result.expanded);
        assert_eq!(result.content, before);
    }

    #[tokio::test]
    async fn test_populate_third_expansion_fails() {
        let source = Arc::new(ScriptedSource::new().fail_expand_call(3));
        let pipeline = pipeline(&source);
        let collection = PersonaCollection::shared();
        let generation = collection.lock().generation();

        let ids = pipeline.populate(&collection, generation, 5).await;
        assert_eq!(ids.len(), 5);

        let guard = collection.lock();
        let personas = guard.list();
        assert_eq!(personas.len(), 5);
        for (i, persona) in personas.iter().enumerate() {
            assert_eq!(persona.id, ids[i]);
            assert_eq!(persona.status, PersonaStatus::Idle);
            assert_eq!(persona.expanded, i != 2, "slot {}", i);
        }
        assert_eq!(source.expand_calls(), 5);
    }

    #[tokio::test]
    async fn test_populate_with_failed_batch_skips_expansion() {
        let source = Arc::new(ScriptedSource::new().fail_name_call(1));
        let collection = PersonaCollection::shared();
        let generation = collection.lock().generation();

        pipeline(&source).populate(&collection, generation, 4).await;

        let guard = collection.lock();
        assert_eq!(guard.len(), 4);
        assert!(!guard.any_loading());
        assert!(guard.list().iter().all(|p| p.origin == PersonaOrigin::Placeholder));
        assert_eq!(source.expand_calls(), 0);
    }

    #[tokio::test]
    async fn test_populate_after_reset_is_discarded() {
        let source = Arc::new(ScriptedSource::new());
        let collection = PersonaCollection::shared();
        let stale = collection.lock().generation();
        collection.lock().reset();

        let ids = pipeline(&source).populate(&collection, stale, 3).await;
        assert!(ids.is_empty());
        assert!(collection.lock().is_empty());
    }

    #[tokio::test]
    async fn test_shuffle_leaves_locked_slots_alone() {
        let source = Arc::new(ScriptedSource::new());
        let pipeline = pipeline(&source);
        let collection = PersonaCollection::shared();
        let generation = collection.lock().generation();
        let ids = pipeline.populate(&collection, generation, 4).await;

        collection.lock().toggle_lock(&ids[1]).unwrap();
        let locked_before = collection.lock().get(&ids[1]).cloned().unwrap();
        let others_before: Vec<_> = [0, 2, 3]
            .iter()
            .map(|&i| collection.lock().get(&ids[i]).unwrap().content.clone())
            .collect();

        let shuffled = pipeline.shuffle_unlocked(&collection, generation).await;
        assert_eq!(shuffled, 3);

        let guard = collection.lock();
        assert_eq!(guard.get(&ids[1]).unwrap(), &locked_before);
        for (n, &i) in [0, 2, 3].iter().enumerate() {
            let slot = guard.get(&ids[i]).unwrap();
            assert_eq!(slot.id, ids[i]);
            assert_ne!(slot.content, others_before[n]);
            assert_eq!(slot.status, PersonaStatus::Idle);
        }
    }

    #[tokio::test]
    async fn test_refresh_locked_is_rejected() {
        let source = Arc::new(ScriptedSource::new());
        let pipeline = pipeline(&source);
        let collection = PersonaCollection::shared();
        let generation = collection.lock().generation();
        let ids = pipeline.populate(&collection, generation, 2).await;
        collection.lock().toggle_lock(&ids[0]).unwrap();

        let err = pipeline.refresh_one(&collection, generation, &ids[0]).await.unwrap_err();
        assert!(matches!(err, Error::Locked(_)));
        assert!(matches!(
            pipeline.refresh_one(&collection, generation, "nope").await,
            Err(Error::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_refresh_failure_keeps_slot_id() {
        let source = Arc::new(ScriptedSource::new().fail_name_call(3));
        let pipeline = pipeline(&source);
        let collection = PersonaCollection::shared();
        let generation = collection.lock().generation();
        collection.lock().add(placeholder_persona(0));
        collection.lock().add(placeholder_persona(1));
        let id = collection.lock().list()[1].id.clone();

        // calls 1 and 2 succeed
        pipeline.refresh_one(&collection, generation, &id).await.unwrap();
        pipeline.refresh_one(&collection, generation, &id).await.unwrap();
        assert_eq!(collection.lock().get(&id).unwrap().origin, PersonaOrigin::Remote);

        pipeline.refresh_one(&collection, generation, &id).await.unwrap();
        let guard = collection.lock();
        let slot = guard.get(&id).unwrap();
        assert_eq!(slot.origin, PersonaOrigin::Placeholder);
        assert_eq!(slot.content, placeholder_content(1));
        assert_eq!(slot.status, PersonaStatus::Idle);
    }

    #[tokio::test]
    async fn test_add_appends_and_settles() {
        let source = Arc::new(ScriptedSource::new());
        let pipeline = pipeline(&source);
        let collection = PersonaCollection::shared();
        let generation = collection.lock().generation();

        let id = pipeline.add(&collection, generation).await.unwrap();
        let guard = collection.lock();
        assert_eq!(guard.len(), 1);
        let slot = guard.get(&id).unwrap();
        assert!(slot.expanded);
        assert_eq!(slot.status, PersonaStatus::Idle);
    }
}
