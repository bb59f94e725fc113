//! The carousel run: one reference-image analysis, one adapter, then
//! narrative, prompt and image for every slide in input order.
//!
//! Everything that can be checked locally (required fields, forbidden layout
//! tokens) is checked in [`validate_request`] before the first remote call.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::adapter::adapt;
use crate::audit::{AuditLog, EconomicEvent, EventKind};
use crate::auth::Principal;
use crate::compiler::{compile_prompt, CompileInput, SlidePosition};
use crate::error::{PipelineError, Stage, UpstreamError};
use crate::guard::validate_layout_spec;
use crate::models::{BrandLock, GenerateRequest, GenerateResponse, LayoutSpec, NarrativeOut, SlideInput, SlideResult};
use crate::sanitizer::{is_coherent_subject, sanitize_guidance, sanitize_narrative, sanitize_text_field, SanitizedNarrative};
use crate::services::{ImageModel, IntelligenceModel, NarrativeRequest};
use crate::store::CarouselStore;
use crate::style::normalize_style_dna;

const INCOHERENT_SUBJECT_RETRY: &str =
    "the subject was empty or meaningless after removing aesthetic words; describe only who or what appears and what happens";

/// A request that passed every local check.
#[derive(Debug, Clone)]
pub struct ValidatedRequest {
    pub brand_id: Option<String>,
    pub brand_lock: BrandLock,
    pub layout_spec: LayoutSpec,
    pub reference_image_url: String,
    pub slides: Vec<SlideInput>,
    pub text_model: String,
    pub image_model: String,
    pub aspect_ratio: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Required fields first, then unique slide indices, then the layout guard.
pub fn validate_request(request: GenerateRequest) -> Result<ValidatedRequest, PipelineError> {
    let reference_image_url = non_blank(request.reference_image_url);
    let text_model = non_blank(request.text_model);
    let image_model = non_blank(request.image_model);
    let slides = request.slides.filter(|s| !s.is_empty());

    let mut missing = Vec::new();
    if request.brand_lock.is_none() {
        missing.push("brandLock");
    }
    if request.layout_spec.is_none() {
        missing.push("layoutSpec");
    }
    if reference_image_url.is_none() {
        missing.push("referenceImageUrl");
    }
    if slides.is_none() {
        missing.push("slides");
    }
    if text_model.is_none() {
        missing.push("textModel");
    }
    if image_model.is_none() {
        missing.push("imageModel");
    }

    match (request.brand_lock, request.layout_spec, reference_image_url, slides, text_model, image_model) {
        (Some(brand_lock), Some(layout_spec), Some(reference_image_url), Some(slides), Some(text_model), Some(image_model)) => {
            let mut seen = HashSet::new();
            if let Some(dup) = slides.iter().find(|s| !seen.insert(s.slide)) {
                return Err(PipelineError::Validation(format!("Duplicate slide index: {}", dup.slide)));
            }
            validate_layout_spec(&layout_spec)?;
            Ok(ValidatedRequest {
                brand_id: non_blank(request.brand_id),
                brand_lock,
                layout_spec,
                reference_image_url,
                slides,
                text_model,
                image_model,
                aspect_ratio: non_blank(request.aspect_ratio),
            })
        }
        _ => Err(PipelineError::Validation(format!("Missing required fields: {}", missing.join(", ")))),
    }
}

pub struct CarouselOrchestrator {
    intelligence: Arc<dyn IntelligenceModel>,
    images: Arc<dyn ImageModel>,
    store: Arc<dyn CarouselStore>,
    audit: AuditLog,
    call_timeout: Duration,
}

/// Identity attached to every audit event of one run.
struct RunContext {
    carousel_id: Uuid,
    user_id: String,
    user_email: Option<String>,
}

impl CarouselOrchestrator {
    pub fn new(
        intelligence: Arc<dyn IntelligenceModel>,
        images: Arc<dyn ImageModel>,
        store: Arc<dyn CarouselStore>,
        audit: AuditLog,
        call_timeout: Duration,
    ) -> Self {
        Self { intelligence, images, store, audit, call_timeout }
    }

    /// Runs a validated request to completion. On failure the carousel keeps
    /// every slide written so far and is marked failed.
    pub async fn run(
        &self,
        principal: &Principal,
        request: ValidatedRequest,
        cancel: CancellationToken,
    ) -> Result<GenerateResponse, PipelineError> {
        let user_email = self.resolve_email(principal).await;
        let carousel_id = self
            .store
            .create_carousel(
                &principal.user_id,
                request.brand_id.clone(),
                request.brand_lock.clone(),
                request.layout_spec.clone(),
            )
            .await?;
        info!(
            "🚀 Carousel {} started: {} slides, layout {}, text={}, image={}",
            carousel_id,
            request.slides.len(),
            request.layout_spec.blueprint_id,
            request.text_model,
            request.image_model
        );

        let ctx = RunContext { carousel_id, user_id: principal.user_id.clone(), user_email };
        match self.drive(&ctx, &request, &cancel).await {
            Ok(response) => Ok(response),
            Err(e) => {
                let reason = match &e {
                    PipelineError::Cancelled => "cancelled".to_string(),
                    other => other.to_string(),
                };
                error!("❌ Carousel {} failed: {}", carousel_id, reason);
                if let Err(store_err) = self.store.mark_failed(carousel_id, &reason).await {
                    warn!("Could not mark carousel {} as failed: {}", carousel_id, store_err);
                }
                Err(e)
            }
        }
    }

    async fn resolve_email(&self, principal: &Principal) -> Option<String> {
        if let Some(email) = &principal.email {
            if let Err(e) = self.store.remember_user(&principal.user_id, email).await {
                warn!("Could not remember email for {}: {}", principal.user_id, e);
            }
            return Some(email.clone());
        }
        match self.store.user_email(&principal.user_id).await {
            Ok(email) => email,
            Err(e) => {
                warn!("Could not resolve email for {}: {}", principal.user_id, e);
                None
            }
        }
    }

    async fn drive(
        &self,
        ctx: &RunContext,
        request: &ValidatedRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerateResponse, PipelineError> {
        let id = ctx.carousel_id;

        let style = self
            .remote(
                Stage::StyleAnalysis,
                None,
                self.intelligence.analyze_reference_image(&request.reference_image_url, &request.text_model),
            )
            .await?;
        self.audit_call(ctx, "style_analysis", &request.text_model, EventKind::Intelligence, json!({
            "family": style.family.as_str()
        }));
        let style = normalize_style_dna(style);
        self.store.attach_style(id, style.clone()).await?;
        info!("🎨 Carousel {} style: {} / {}", id, style.family.as_str(), style.render_medium);

        let adapter = adapt(&style, &request.brand_lock);
        self.store.save_adapter(id, adapter.clone()).await?;

        let total = request.slides.len();
        let mut results = Vec::with_capacity(total);
        for (index, input) in request.slides.iter().enumerate() {
            if cancel.is_cancelled() {
                warn!("🛑 Carousel {} cancelled before slide {}", id, input.slide);
                return Err(PipelineError::Cancelled);
            }

            let (raw, narrative) = self.narrative_for(ctx, request, input).await?;
            self.store.save_narrative(id, raw, &narrative).await?;

            let compiled = compile_prompt(&CompileInput {
                brand: &request.brand_lock,
                style: &style,
                adapter: &adapter,
                layout: &request.layout_spec,
                narrative: &narrative,
                text: &input.text,
                position: SlidePosition { index, total },
                aspect_ratio: request.aspect_ratio.as_deref(),
            });
            self.store.save_compiled_prompt(id, compiled.clone()).await?;

            let image_url = self
                .remote(
                    Stage::Image,
                    Some(input.slide),
                    self.images.generate_image(&compiled.prompt, &request.image_model, request.aspect_ratio.as_deref()),
                )
                .await?;
            self.audit_call(ctx, "image", &request.image_model, EventKind::Image, json!({
                "slide": input.slide,
                "aspectRatio": request.aspect_ratio
            }));
            self.store.save_image(id, input.slide, image_url.clone()).await?;
            info!("✅ Carousel {} slide {} ({}/{}) done", id, input.slide, index + 1, total);

            results.push(SlideResult { slide: input.slide, prompt: compiled.prompt, image_url });
        }

        self.store.mark_complete(id).await?;
        info!("🏁 Carousel {} complete with {} slides", id, results.len());

        Ok(GenerateResponse { success: true, carousel_id: id, style_dna: style, results })
    }

    /// Generates and sanitizes one slide's narrative. A subject that does not
    /// survive sanitizing is regenerated once; the second answer is kept as is.
    async fn narrative_for(
        &self,
        ctx: &RunContext,
        request: &ValidatedRequest,
        input: &SlideInput,
    ) -> Result<(NarrativeOut, SanitizedNarrative), PipelineError> {
        let (guidance, guidance_lint) = sanitize_guidance(&input.guidance);
        if guidance_lint.changed {
            info!("🧹 Slide {} guidance lost {:?}", input.slide, guidance_lint.removed_tokens);
        }
        let context = input
            .context
            .as_deref()
            .map(|c| sanitize_text_field(c).cleaned)
            .filter(|c| !c.is_empty());
        let emotion: Vec<String> = input
            .emotion
            .iter()
            .flatten()
            .map(|e| sanitize_text_field(e).cleaned)
            .filter(|e| !e.trim().is_empty())
            .collect();

        let mut narrative_request = NarrativeRequest { slide: input.slide, guidance, context, emotion, retry_reason: None };
        let (raw, sanitized) = self.request_narrative(ctx, request, input, &narrative_request, 1).await?;
        if is_coherent_subject(sanitized.subject()) {
            return Ok((raw, sanitized));
        }

        warn!("⚠️ Slide {} subject incoherent after sanitizing, regenerating once", input.slide);
        narrative_request.retry_reason = Some(INCOHERENT_SUBJECT_RETRY.to_string());
        let (raw, sanitized) = self.request_narrative(ctx, request, input, &narrative_request, 2).await?;
        if !is_coherent_subject(sanitized.subject()) {
            warn!("⚠️ Slide {} subject still incoherent after regeneration, keeping it", input.slide);
        }
        Ok((raw, sanitized))
    }

    async fn request_narrative(
        &self,
        ctx: &RunContext,
        request: &ValidatedRequest,
        input: &SlideInput,
        narrative_request: &NarrativeRequest,
        attempt: u32,
    ) -> Result<(NarrativeOut, SanitizedNarrative), PipelineError> {
        let mut raw = self
            .remote(
                Stage::Narrative,
                Some(input.slide),
                self.intelligence.generate_narrative(narrative_request, &request.text_model),
            )
            .await?;
        self.audit_call(ctx, "narrative", &request.text_model, EventKind::Intelligence, json!({
            "slide": input.slide,
            "attempt": attempt
        }));
        raw.slide = input.slide;

        let sanitized = sanitize_narrative(&raw, &[("guidance", input.guidance.as_str())]);
        if sanitized.lint().changed {
            info!("🧹 Slide {} narrative lint removed {:?}", input.slide, sanitized.lint().removed_tokens);
        }
        Ok((raw, sanitized))
    }

    async fn remote<T>(
        &self,
        stage: Stage,
        slide: Option<u32>,
        call: impl Future<Output = Result<T, UpstreamError>>,
    ) -> Result<T, PipelineError> {
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(source)) => Err(PipelineError::Upstream { stage, slide, source }),
            Err(_) => Err(PipelineError::Upstream {
                stage,
                slide,
                source: UpstreamError::Timeout(self.call_timeout.as_secs()),
            }),
        }
    }

    fn audit_call(&self, ctx: &RunContext, phase: &str, model: &str, kind: EventKind, metadata: serde_json::Value) {
        self.audit.emit(EconomicEvent {
            flow_id: ctx.carousel_id,
            phase: phase.to_string(),
            model: model.to_string(),
            kind,
            user_id: ctx.user_id.clone(),
            user_email: ctx.user_email.clone(),
            metadata,
        });
    }
}
