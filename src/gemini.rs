use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::error::UpstreamError;
use crate::models::{NarrativeOut, StyleDna, StyleFamily, STYLE_DNA_SOURCE, STYLE_DNA_VERSION};
use crate::services::{ImageModel, IntelligenceModel, NarrativeRequest};
use crate::style::ensure_style_shape;

pub const DEMO_KEY: &str = "DEMO_KEY";

const SUPPORTED_RATIOS: &[&str] = &["1:1", "3:2", "2:3", "3:4", "4:3", "4:5", "5:4", "9:16", "16:9", "21:9"];
const RETRY_DELAYS_MS: [u64; 3] = [1000, 2000, 4000];

const STRICT_JSON_NOTE: &str = "\n\nRETURN ONLY VALID JSON. NO EXTRA TEXT. NO MARKDOWN. NO WRAPPING QUOTES.";

const STYLE_SYSTEM_PROMPT: &str = "You are a visual analysis module. You must produce valid JSON and nothing else.";
const STYLE_USER_PROMPT: &str = r##"Analyze the reference image and return ONLY a JSON object matching the StyleDNA schema.

Schema: {
  "version": "1.0",
  "source": "reference_image_analysis",
  "family": "photo|line_art|watercolor|oil_paint|3d_cartoon|anime|cartoon2d|other",
  "render_medium": "string",
  "line_quality": "string?",
  "shading": "string?",
  "lighting": "string?",
  "texture": "string?",
  "color_behavior": "string?",
  "palette": ["#hex"],
  "description": "one dense paragraph describing the style",
  "confidence": 0.0,
  "positives": ["..."],
  "negatives": ["..."]
}

Rules:
- No paragraphs or explanations outside the JSON.
- negatives must depend on the detected family.
- positives are observed style statements.
- Use short phrases without redundant adjectives.
- NEVER include markdown or backticks."##;

const NARRATIVE_SYSTEM_PROMPT: &str = "You are a semantic narrative module. Return ONLY valid JSON, no markdown. Ignore any aesthetic or rendering instruction.";

// Helper function to truncate base64 data in JSON for cleaner logging
fn truncate_base64_in_json(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                if key == "data" {
                    if let Value::String(s) = val {
                        if s.len() > 100 {
                            *val = Value::String(preview(s, 50));
                        }
                    }
                } else {
                    truncate_base64_in_json(val);
                }
            }
        }
        Value::Array(arr) => {
            for val in arr.iter_mut() {
                truncate_base64_in_json(val);
            }
        }
        _ => {}
    }
}

fn preview(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...[{} chars total]", &s[..idx], s.len()),
        None => s.to_string(),
    }
}

/// Strips the gateway namespace some model ids carry.
pub fn normalize_model(model: &str) -> &str {
    model.strip_prefix("wisdom/").unwrap_or(model)
}

/// Maps a requested ratio onto one the image endpoint accepts.
pub fn map_aspect_ratio(aspect_ratio: Option<&str>) -> &'static str {
    let Some(ratio) = aspect_ratio else { return "1:1" };
    if let Some(supported) = SUPPORTED_RATIOS.iter().find(|r| **r == ratio) {
        return *supported;
    }
    let mapped = match ratio {
        "1.91:1" => "16:9",
        "1.2:1" => "5:4",
        _ => "1:1",
    };
    warn!("Mapping custom ratio {} to supported {}", ratio, mapped);
    mapped
}

fn is_system_busy(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("system busy") || lower.contains("please try again")
}

fn parse_data_url(url: &str) -> Option<(String, String)> {
    let rest = url.strip_prefix("data:")?;
    let (meta, data) = rest.split_once(',')?;
    let mime = meta.strip_suffix(";base64")?;
    Some((data.to_string(), if mime.is_empty() { "image/png".into() } else { mime.to_string() }))
}

fn build_narrative_prompt(request: &NarrativeRequest) -> String {
    let mut prompt = format!(
        "Return a JSON object matching NarrativeOut:\n{{\n  \"slide\": {},\n  \"subject\": \"(nouns/verbs/spatial relations only; no style or rendering)\",\n  \"context\": \"(optional, semantic context, no aesthetics)\",\n  \"emotion\": [\"(optional, simple emotions without lighting)\"]\n}}\n\nStrict rules:\n- Never mention aesthetics, technique, style, materials, lighting or cameras.\n- Do not use the word scene. Always use subject.\n- If the brief contains aesthetics, IGNORE them completely.\n- Answer ONLY valid JSON, no extra text.\n\nBrief (sanitized): {}\n",
        request.slide, request.guidance
    );
    if let Some(ctx) = request.context.as_deref().filter(|c| !c.is_empty()) {
        prompt.push_str(&format!("Context: {ctx}\n"));
    }
    if !request.emotion.is_empty() {
        prompt.push_str(&format!("Suggested emotion: {}\n", request.emotion.join(", ")));
    }
    if let Some(reason) = &request.retry_reason {
        prompt.push_str(&format!("\nRetry because: {reason}\nAnswer ONLY valid JSON."));
    }
    prompt
}

pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: String, base_url: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn is_demo(&self) -> bool {
        self.api_key == DEMO_KEY
    }

    async fn generate_content(&self, model: &str, body: &Value) -> Result<GeminiResponse, UpstreamError> {
        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, normalize_model(model));
        info!("🔗 Making request to: {}", url);

        let mut logged = body.clone();
        truncate_base64_in_json(&mut logged);
        debug!("📤 Request body: {}", logged);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        info!("📥 Response status: {}", status);
        let response_text = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&response_text)
                .ok()
                .and_then(|v| v["error"]["message"].as_str().map(String::from))
                .unwrap_or(response_text);
            error!("❌ API Error response: {}", preview(&message, 300));
            return Err(UpstreamError::Status { status: status.as_u16(), message });
        }

        serde_json::from_str(&response_text)
            .map_err(|e| UpstreamError::Parse(format!("{}: {}", e, preview(&response_text, 200))))
    }

    async fn fetch_inline_image(&self, url: &str) -> Result<(String, String), UpstreamError> {
        if let Some(inline) = parse_data_url(url) {
            return Ok(inline);
        }
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(UpstreamError::Status {
                status: response.status().as_u16(),
                message: format!("failed to fetch reference image {url}"),
            });
        }
        let mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/png")
            .to_string();
        let bytes: Bytes = response.bytes().await?;
        info!("🖼️ Fetched reference image ({} bytes, {})", bytes.len(), mime);
        Ok((base64::engine::general_purpose::STANDARD.encode(&bytes), mime))
    }

    /// Asks for JSON; a non-JSON answer is retried once with a stricter note.
    async fn generate_json(
        &self,
        model: &str,
        system_prompt: &str,
        user_prompt: &str,
        image: Option<&(String, String)>,
    ) -> Result<String, UpstreamError> {
        for strict in [false, true] {
            let mut parts = Vec::new();
            if let Some((data, mime)) = image {
                parts.push(json!({ "inlineData": { "data": data, "mimeType": mime } }));
            }
            let note = if strict { STRICT_JSON_NOTE } else { "" };
            parts.push(json!({ "text": format!("{user_prompt}{note}") }));

            let body = json!({
                "contents": [{ "role": "user", "parts": parts }],
                "generationConfig": { "responseMimeType": "application/json", "temperature": 0.4 },
                "systemInstruction": { "parts": [{ "text": system_prompt }] }
            });

            let text = self.generate_content(model, &body).await?.joined_text();
            if serde_json::from_str::<Value>(&text).is_ok() {
                return Ok(text);
            }
            warn!("⚠️ Model {} returned non-JSON text (strict={}): {}", model, strict, preview(&text, 120));
        }
        Err(UpstreamError::Parse(format!("model {model} did not return valid JSON")))
    }

    fn demo_style() -> StyleDna {
        StyleDna {
            version: STYLE_DNA_VERSION.into(),
            source: STYLE_DNA_SOURCE.into(),
            family: StyleFamily::Photo,
            render_medium: "digital editorial photo".into(),
            line_quality: None,
            shading: Some("soft".into()),
            lighting: Some("diffuse daylight".into()),
            texture: None,
            color_behavior: Some("restrained".into()),
            palette: Vec::new(),
            description: Some("Demo style: clean editorial daylight with generous negative space.".into()),
            confidence: Some(0.5),
            positives: vec!["clean contrast".into()],
            negatives: vec!["no clutter".into()],
        }
    }

    fn generate_placeholder_image(prompt: &str) -> String {
        let colors = ["#3B82F6", "#EF4444", "#10B981", "#F59E0B", "#8B5CF6"];
        let color = colors[prompt.len() % colors.len()];
        let label = prompt
            .lines()
            .find_map(|l| l.strip_prefix("CAROUSEL: "))
            .unwrap_or("carousel slide");
        let svg = format!(
            r#"<svg width="400" height="500" xmlns="http://www.w3.org/2000/svg"><rect width="400" height="500" fill="{color}"/><text x="200" y="250" font-family="Arial, sans-serif" font-size="22" text-anchor="middle" fill="white">{label}</text></svg>"#
        );
        format!(
            "data:image/svg+xml;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(svg.as_bytes())
        )
    }
}

#[async_trait]
impl IntelligenceModel for GeminiClient {
    async fn analyze_reference_image(&self, image_url: &str, model: &str) -> Result<StyleDna, UpstreamError> {
        if self.is_demo() {
            info!("Using demo mode - returning fixed StyleDNA");
            return Ok(Self::demo_style());
        }

        info!("🎯 Analyzing reference image with {}", model);
        let image = self.fetch_inline_image(image_url).await?;
        let raw = self
            .generate_json(model, STYLE_SYSTEM_PROMPT, STYLE_USER_PROMPT, Some(&image))
            .await?;
        let style: StyleDna = serde_json::from_str(&raw).map_err(|e| UpstreamError::Shape(e.to_string()))?;
        ensure_style_shape(&style).map_err(|e| UpstreamError::Shape(e.to_string()))?;
        info!("✅ StyleDNA detected: family={} medium={}", style.family.as_str(), style.render_medium);
        Ok(style)
    }

    async fn generate_narrative(&self, request: &NarrativeRequest, model: &str) -> Result<NarrativeOut, UpstreamError> {
        if self.is_demo() {
            info!("Using demo mode - echoing guidance as narrative");
            let subject = if request.guidance.trim().is_empty() { "brand subject" } else { request.guidance.as_str() };
            return Ok(NarrativeOut {
                slide: request.slide,
                subject: subject.to_string(),
                context: request.context.clone(),
                emotion: (!request.emotion.is_empty()).then(|| request.emotion.clone()),
            });
        }

        let prompt = build_narrative_prompt(request);
        info!("🎯 Generating narrative for slide {} (prompt: {})", request.slide, preview(&prompt, 120));
        let raw = self.generate_json(model, NARRATIVE_SYSTEM_PROMPT, &prompt, None).await?;
        serde_json::from_str::<NarrativeOut>(&raw).map_err(|e| UpstreamError::Shape(format!("NarrativeOut: {e}")))
    }
}

#[async_trait]
impl ImageModel for GeminiClient {
    async fn generate_image(&self, prompt: &str, model: &str, aspect_ratio: Option<&str>) -> Result<String, UpstreamError> {
        if model.trim().is_empty() {
            return Err(UpstreamError::Other("Missing image model".into()));
        }
        if self.is_demo() {
            info!("Using demo mode - no real images generated");
            return Ok(Self::generate_placeholder_image(prompt));
        }

        let target_ratio = map_aspect_ratio(aspect_ratio);
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "responseModalities": ["IMAGE"],
                "imageConfig": { "aspectRatio": target_ratio, "imageSize": "1K" }
            }
        });

        let attempts = RETRY_DELAYS_MS.len() + 1;
        let mut attempt = 0;
        loop {
            info!("[{}/{}] Generating image with {}", attempt + 1, attempts, model);
            match self.generate_content(model, &body).await {
                Ok(parsed) => {
                    let image = parsed
                        .first_inline_image()
                        .ok_or_else(|| UpstreamError::Other("no image data in response".into()))?;
                    info!("✅ Successfully generated image: {}", preview(&image, 50));
                    return Ok(image);
                }
                Err(UpstreamError::Status { message, .. }) if is_system_busy(&message) && attempt < RETRY_DELAYS_MS.len() => {
                    let delay = RETRY_DELAYS_MS[attempt];
                    warn!("[{}/{}] Image gateway busy, retrying in {}ms", attempt + 1, attempts, delay);
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!("❌ Failed to generate image: {}", e);
                    return Err(e);
                }
            }
        }
    }
}

// --- Response Parsing Helpers ---

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Content,
}

#[derive(Debug, Deserialize, Default)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Part {
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
    Text { text: String },
    Other(#[allow(dead_code)] Value),
}

#[derive(Debug, Deserialize)]
struct InlineData {
    data: String,
    #[serde(rename = "mimeType", default)]
    mime_type: Option<String>,
}

impl GeminiResponse {
    fn joined_text(&self) -> String {
        self.candidates
            .first()
            .map(|c| {
                c.content
                    .parts
                    .iter()
                    .filter_map(|p| match p {
                        Part::Text { text } => Some(text.as_str()),
                        _ => None,
                    })
                    .collect::<String>()
            })
            .unwrap_or_default()
            .trim()
            .to_string()
    }

    fn first_inline_image(&self) -> Option<String> {
        self.candidates.iter().flat_map(|c| &c.content.parts).find_map(|p| match p {
            Part::Inline { inline_data } if !inline_data.data.is_empty() => {
                let mime = inline_data.mime_type.as_deref().unwrap_or("image/png");
                Some(format!("data:{};base64,{}", mime, inline_data.data))
            }
            _ => None,
        })
    }
}
