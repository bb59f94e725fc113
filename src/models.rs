use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use uuid::Uuid;

// --- Brand ---

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BrandPalette {
    #[serde(alias = "fondo")]
    pub background: String,
    #[serde(alias = "texto")]
    pub text: String,
    #[serde(alias = "acento")]
    pub accent: String,
    #[serde(default)]
    pub neutral: Option<String>,
}

#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LogoSpec {
    pub enabled: bool,
    #[serde(default = "default_logo_position")]
    pub position: String,
    #[serde(default = "default_logo_height")]
    pub size_pct_h: f32,
    #[serde(default = "default_logo_width")]
    pub max_width_pct: f32,
    #[serde(default)]
    pub url: Option<String>,
}

fn default_logo_position() -> String { "bottom-right".into() }
fn default_logo_height() -> f32 { 5.0 }
fn default_logo_width() -> f32 { 15.0 }

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TextRules {
    #[serde(default)]
    pub allow_only_text_field: bool,
    #[serde(default)]
    pub forbid_extra_text: bool,
}

#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Typography {
    #[serde(default)]
    pub heading: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
}

/// Enforceable identity of a brand for one generation run.
#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BrandLock {
    #[serde(default)]
    pub brand_name: Option<String>,
    #[serde(default = "default_language")]
    pub language: String,
    pub palette: BrandPalette,
    #[serde(default)]
    pub background_is_absolute: bool,
    #[serde(default)]
    pub logo: Option<LogoSpec>,
    #[serde(default)]
    pub text_rules: TextRules,
    #[serde(default)]
    pub typography: Option<Typography>,
    #[serde(default)]
    pub tone: Vec<String>,
}

fn default_language() -> String { "es".into() }

impl BrandLock {
    pub fn includes_logo(&self) -> bool {
        self.logo.as_ref().map(|l| l.enabled).unwrap_or(false)
    }
}

// --- Layout ---

#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LayoutSpec {
    pub blueprint_id: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub rules: Vec<String>,
}

// --- Style ---

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StyleFamily {
    Photo,
    LineArt,
    Watercolor,
    OilPaint,
    #[serde(rename = "3d_cartoon")]
    Cartoon3d,
    Anime,
    Cartoon2d,
    #[serde(other)]
    Other,
}

impl StyleFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            StyleFamily::Photo => "photo",
            StyleFamily::LineArt => "line_art",
            StyleFamily::Watercolor => "watercolor",
            StyleFamily::OilPaint => "oil_paint",
            StyleFamily::Cartoon3d => "3d_cartoon",
            StyleFamily::Anime => "anime",
            StyleFamily::Cartoon2d => "cartoon2d",
            StyleFamily::Other => "other",
        }
    }
}

/// Aesthetic descriptor extracted from the reference image. Field names follow
/// the JSON schema the intelligence model is asked to produce.
#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StyleDna {
    pub version: String,
    pub source: String,
    pub family: StyleFamily,
    pub render_medium: String,
    #[serde(default)]
    pub line_quality: Option<String>,
    #[serde(default)]
    pub shading: Option<String>,
    #[serde(default)]
    pub lighting: Option<String>,
    #[serde(default)]
    pub texture: Option<String>,
    #[serde(default)]
    pub color_behavior: Option<String>,
    #[serde(default)]
    pub palette: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub confidence: Option<f32>,
    pub positives: Vec<String>,
    pub negatives: Vec<String>,
}

pub const STYLE_DNA_VERSION: &str = "1.0";
pub const STYLE_DNA_SOURCE: &str = "reference_image_analysis";

// --- Adapter ---

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Precedence {
    BrandWins,
    StyleWins,
    Merge,
}

#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AttributeResolution {
    pub attribute: String,
    pub precedence: Precedence,
    pub value: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct DegradationPolicy {
    pub tier_a_nonnegotiable: Vec<String>,
    pub tier_b_prefer: Vec<String>,
    pub tier_c_optional: Vec<String>,
}

/// Reconciliation of a [`StyleDna`] against a [`BrandLock`].
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Adapter {
    pub application_rules: Vec<String>,
    pub material_translation_rules: Vec<String>,
    pub degradation_policy: DegradationPolicy,
    pub resolutions: Vec<AttributeResolution>,
}

// --- Slides ---

#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SlideText {
    pub headline: String,
    pub body: String,
    #[serde(default)]
    pub cta: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SlideInput {
    pub slide: u32,
    pub guidance: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub emotion: Option<Vec<String>>,
    pub text: SlideText,
}

/// Narrative as returned by the intelligence model, before sanitizing.
#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct NarrativeOut {
    pub slide: u32,
    pub subject: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub emotion: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct LintReport {
    pub removed_tokens: Vec<String>,
    pub changed: bool,
    pub by_field: BTreeMap<String, Vec<String>>,
    pub by_category: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompiledPrompt {
    pub slide: u32,
    pub prompt: String,
}

// --- Persisted aggregate ---

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CarouselStatus {
    Created,
    StyleAnalyzed,
    AdapterSaved,
    Generating,
    Complete,
    Failed,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SlideStatus {
    NarrativeGenerated,
    PromptCompiled,
    ImageGenerated,
}

#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SlideRecord {
    pub slide: u32,
    pub narrative_raw: NarrativeOut,
    pub narrative: NarrativeOut,
    pub lint: LintReport,
    pub compiled_prompt: Option<CompiledPrompt>,
    pub image_url: Option<String>,
    pub status: SlideStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Carousel {
    pub id: Uuid,
    pub owner_id: String,
    pub brand_id: Option<String>,
    pub brand_lock: BrandLock,
    pub layout_spec: LayoutSpec,
    pub style_dna: Option<StyleDna>,
    pub adapter: Option<Adapter>,
    pub slides: Vec<SlideRecord>,
    pub status: CarouselStatus,
    pub failure: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// --- HTTP payloads ---

/// Body of `POST /api/carousel/generate`. Every field is optional at the wire
/// level so that missing fields surface as a descriptive 400.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    #[serde(default)]
    pub brand_id: Option<String>,
    #[serde(default)]
    pub brand_lock: Option<BrandLock>,
    #[serde(default)]
    pub layout_spec: Option<LayoutSpec>,
    #[serde(default)]
    pub reference_image_url: Option<String>,
    #[serde(default)]
    pub slides: Option<Vec<SlideInput>>,
    #[serde(default)]
    pub text_model: Option<String>,
    #[serde(default)]
    pub image_model: Option<String>,
    #[serde(default)]
    pub aspect_ratio: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SlideResult {
    pub slide: u32,
    pub prompt: String,
    pub image_url: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub success: bool,
    pub carousel_id: Uuid,
    #[serde(rename = "styleDNA")]
    pub style_dna: StyleDna,
    pub results: Vec<SlideResult>,
}

#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct SelectCompositionRequest {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub slide_count: Option<usize>,
    #[serde(default)]
    pub seed: Option<String>,
}
