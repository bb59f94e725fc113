use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::{AuditSink, EconomicEvent, EconomicRecord};
use crate::error::StoreError;
use crate::models::{
    Adapter, BrandLock, Carousel, CarouselStatus, CompiledPrompt, LayoutSpec, NarrativeOut, SlideRecord, SlideStatus,
    StyleDna,
};
use crate::sanitizer::SanitizedNarrative;

pub const DEFAULT_EVENT_LIMIT: usize = 200;

/// Persistence for carousels and the economic audit trail.
#[async_trait]
pub trait CarouselStore: AuditSink {
    async fn create_carousel(
        &self,
        owner_id: &str,
        brand_id: Option<String>,
        brand_lock: BrandLock,
        layout_spec: LayoutSpec,
    ) -> Result<Uuid, StoreError>;

    async fn attach_style(&self, id: Uuid, style: StyleDna) -> Result<(), StoreError>;

    async fn save_adapter(&self, id: Uuid, adapter: Adapter) -> Result<(), StoreError>;

    /// Stores both the model's raw answer and its sanitized form.
    async fn save_narrative(&self, id: Uuid, raw: NarrativeOut, narrative: &SanitizedNarrative) -> Result<(), StoreError>;

    async fn save_compiled_prompt(&self, id: Uuid, prompt: CompiledPrompt) -> Result<(), StoreError>;

    async fn save_image(&self, id: Uuid, slide: u32, image_url: String) -> Result<(), StoreError>;

    async fn mark_complete(&self, id: Uuid) -> Result<(), StoreError>;

    async fn mark_failed(&self, id: Uuid, reason: &str) -> Result<(), StoreError>;

    async fn get_carousel(&self, id: Uuid) -> Result<Carousel, StoreError>;

    /// Carousels owned by `owner_id`, newest first.
    async fn list_carousels(&self, owner_id: &str) -> Result<Vec<Carousel>, StoreError>;

    /// Newest first.
    async fn list_economic_events(&self, limit: usize) -> Result<Vec<EconomicRecord>, StoreError>;

    async fn user_email(&self, user_id: &str) -> Result<Option<String>, StoreError>;

    async fn remember_user(&self, user_id: &str, email: &str) -> Result<(), StoreError>;
}

#[derive(Default)]
pub struct InMemoryStore {
    carousels: RwLock<HashMap<Uuid, Carousel>>,
    events: RwLock<Vec<EconomicRecord>>,
    model_costs: RwLock<HashMap<String, f64>>,
    users: RwLock<HashMap<String, String>>,
}

impl InMemoryStore {
    pub fn new(model_costs: HashMap<String, f64>) -> Self {
        Self { model_costs: RwLock::new(model_costs), ..Default::default() }
    }

    pub fn model_cost(&self, model: &str) -> Option<f64> {
        self.model_costs.read().get(model).copied()
    }

    fn with_carousel<T>(&self, id: Uuid, f: impl FnOnce(&mut Carousel) -> Result<T, StoreError>) -> Result<T, StoreError> {
        let mut guard = self.carousels.write();
        let carousel = guard.get_mut(&id).ok_or(StoreError::CarouselNotFound(id))?;
        let out = f(&mut *carousel)?;
        carousel.updated_at = Utc::now();
        Ok(out)
    }

    fn with_slide(
        &self,
        id: Uuid,
        slide: u32,
        f: impl FnOnce(&mut SlideRecord),
    ) -> Result<(), StoreError> {
        self.with_carousel(id, |carousel| {
            let record = carousel
                .slides
                .iter_mut()
                .find(|s| s.slide == slide)
                .ok_or(StoreError::SlideNotFound { carousel: id, slide })?;
            f(&mut *record);
            record.updated_at = Utc::now();
            Ok(())
        })
    }

    /// Unknown models are registered at zero cost so they show up in the
    /// table and can be priced later.
    fn price(&self, model: &str) -> f64 {
        if let Some(cost) = self.model_cost(model) {
            return cost;
        }
        warn!("Model {} has no cost entry, registering it at 0 EUR", model);
        *self.model_costs.write().entry(model.to_string()).or_insert(0.0)
    }
}

#[async_trait]
impl AuditSink for InMemoryStore {
    async fn record_economic_event(&self, event: EconomicEvent) -> Result<EconomicRecord, StoreError> {
        let cost_eur = self.price(&event.model);
        let mut events = self.events.write();
        let previous: f64 = events
            .iter()
            .filter(|r| r.event.flow_id == event.flow_id)
            .map(|r| r.cost_eur)
            .sum();
        let record = EconomicRecord {
            id: Uuid::new_v4(),
            event,
            cost_eur,
            cumulative_cost_eur: previous + cost_eur,
            created_at: Utc::now(),
        };
        events.push(record.clone());
        Ok(record)
    }
}

#[async_trait]
impl CarouselStore for InMemoryStore {
    async fn create_carousel(
        &self,
        owner_id: &str,
        brand_id: Option<String>,
        brand_lock: BrandLock,
        layout_spec: LayoutSpec,
    ) -> Result<Uuid, StoreError> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let carousel = Carousel {
            id,
            owner_id: owner_id.to_string(),
            brand_id,
            brand_lock,
            layout_spec,
            style_dna: None,
            adapter: None,
            slides: Vec::new(),
            status: CarouselStatus::Created,
            failure: None,
            created_at: now,
            updated_at: now,
        };
        self.carousels.write().insert(id, carousel);
        info!("🗂️ Created carousel {} for {}", id, owner_id);
        Ok(id)
    }

    async fn attach_style(&self, id: Uuid, style: StyleDna) -> Result<(), StoreError> {
        self.with_carousel(id, |c| {
            c.style_dna = Some(style);
            c.status = CarouselStatus::StyleAnalyzed;
            Ok(())
        })
    }

    async fn save_adapter(&self, id: Uuid, adapter: Adapter) -> Result<(), StoreError> {
        self.with_carousel(id, |c| {
            c.adapter = Some(adapter);
            c.status = CarouselStatus::AdapterSaved;
            Ok(())
        })
    }

    async fn save_narrative(&self, id: Uuid, raw: NarrativeOut, narrative: &SanitizedNarrative) -> Result<(), StoreError> {
        self.with_carousel(id, |c| {
            let now = Utc::now();
            let record = SlideRecord {
                slide: narrative.slide(),
                narrative_raw: raw,
                narrative: narrative.narrative().clone(),
                lint: narrative.lint().clone(),
                compiled_prompt: None,
                image_url: None,
                status: SlideStatus::NarrativeGenerated,
                created_at: now,
                updated_at: now,
            };
            match c.slides.iter_mut().find(|s| s.slide == record.slide) {
                Some(existing) => *existing = record,
                None => c.slides.push(record),
            }
            c.status = CarouselStatus::Generating;
            Ok(())
        })
    }

    async fn save_compiled_prompt(&self, id: Uuid, prompt: CompiledPrompt) -> Result<(), StoreError> {
        self.with_slide(id, prompt.slide, |record| {
            record.compiled_prompt = Some(prompt);
            record.status = SlideStatus::PromptCompiled;
        })
    }

    async fn save_image(&self, id: Uuid, slide: u32, image_url: String) -> Result<(), StoreError> {
        self.with_slide(id, slide, |record| {
            record.image_url = Some(image_url);
            record.status = SlideStatus::ImageGenerated;
        })
    }

    async fn mark_complete(&self, id: Uuid) -> Result<(), StoreError> {
        self.with_carousel(id, |c| {
            c.status = CarouselStatus::Complete;
            c.failure = None;
            Ok(())
        })
    }

    async fn mark_failed(&self, id: Uuid, reason: &str) -> Result<(), StoreError> {
        self.with_carousel(id, |c| {
            c.status = CarouselStatus::Failed;
            c.failure = Some(reason.to_string());
            Ok(())
        })
    }

    async fn get_carousel(&self, id: Uuid) -> Result<Carousel, StoreError> {
        self.carousels.read().get(&id).cloned().ok_or(StoreError::CarouselNotFound(id))
    }

    async fn list_carousels(&self, owner_id: &str) -> Result<Vec<Carousel>, StoreError> {
        let mut owned: Vec<Carousel> =
            self.carousels.read().values().filter(|c| c.owner_id == owner_id).cloned().collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(owned)
    }

    async fn list_economic_events(&self, limit: usize) -> Result<Vec<EconomicRecord>, StoreError> {
        Ok(self.events.read().iter().rev().take(limit).cloned().collect())
    }

    async fn user_email(&self, user_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self.users.read().get(user_id).cloned())
    }

    async fn remember_user(&self, user_id: &str, email: &str) -> Result<(), StoreError> {
        self.users.write().insert(user_id.to_string(), email.to_string());
        Ok(())
    }
}
