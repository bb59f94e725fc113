//! Final prompt assembly for one slide.
//!
//! Block order: role header, carousel position, brand lock, style, adapter,
//! layout, slide content with the literal text, visual style, consistency,
//! logo (only when the brand enables it), technical footer.

use crate::models::{Adapter, BrandLock, CompiledPrompt, LayoutSpec, SlideText, StyleDna};
use crate::sanitizer::SanitizedNarrative;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlidePosition {
    /// Zero-based position of the slide within the request.
    pub index: usize,
    pub total: usize,
}

impl SlidePosition {
    pub fn number(&self) -> usize { self.index + 1 }
    pub fn is_first(&self) -> bool { self.index == 0 }
    pub fn is_last(&self) -> bool { self.index + 1 == self.total }
}

pub struct CompileInput<'a> {
    pub brand: &'a BrandLock,
    pub style: &'a StyleDna,
    pub adapter: &'a Adapter,
    pub layout: &'a LayoutSpec,
    pub narrative: &'a SanitizedNarrative,
    pub text: &'a SlideText,
    pub position: SlidePosition,
    pub aspect_ratio: Option<&'a str>,
}

const ROLE_HEADER: &str = "ROLE: You are an art director and editorial designer. You keep absolute coherence between slides (typography, composition, grid, visual treatment).";

fn bool_str(v: bool) -> &'static str { if v { "true" } else { "false" } }

fn brand_block(brand: &BrandLock) -> Vec<String> {
    let p = &brand.palette;
    let mut lines = Vec::new();
    if let Some(name) = &brand.brand_name {
        lines.push(format!("brand: {name}"));
    }
    lines.push(format!("language: {}", brand.language));
    let mut palette = format!("palette: background={}, text={}, accent={}", p.background, p.text, p.accent);
    if let Some(neutral) = &p.neutral {
        palette.push_str(&format!(", neutral={neutral}"));
    }
    lines.push(palette);
    lines.push(format!(
        "background: SOLID {} covering >=85% of canvas. No black/dark fills. No dark gradients/vignettes.",
        p.background
    ));
    lines.push("Black allowed ONLY for linework strokes and text; never as background fill.".into());
    lines.push(format!("backgroundIsAbsolute: {}", bool_str(brand.background_is_absolute)));
    if let Some(logo) = &brand.logo {
        lines.push(format!(
            "logo: enabled={}, position={}, sizePctH={}, maxWidthPct={}",
            bool_str(logo.enabled),
            logo.position,
            logo.size_pct_h,
            logo.max_width_pct
        ));
    }
    lines.push(format!(
        "textRules: allowOnlyTextField={}, forbidExtraText={}",
        bool_str(brand.text_rules.allow_only_text_field),
        bool_str(brand.text_rules.forbid_extra_text)
    ));
    if let Some(typo) = &brand.typography {
        if let Some(h) = &typo.heading {
            lines.push(format!("typography.heading: {h}"));
        }
        if let Some(b) = &typo.body {
            lines.push(format!("typography.body: {b}"));
        }
        lines.push("Font names are internal guidance only; never draw them as visible text.".into());
    }
    if !brand.tone.is_empty() {
        lines.push(format!("tone: {}", brand.tone.join(" | ")));
    }
    lines
}

fn style_block(style: &StyleDna) -> Vec<String> {
    let mut lines = vec![
        format!("family: {}", style.family.as_str()),
        format!("render_medium: {}", style.render_medium),
    ];
    let optional = [
        ("line_quality", &style.line_quality),
        ("shading", &style.shading),
        ("lighting", &style.lighting),
        ("texture", &style.texture),
        ("color_behavior", &style.color_behavior),
    ];
    for (label, value) in optional {
        if let Some(v) = value {
            lines.push(format!("{label}: {v}"));
        }
    }
    if !style.positives.is_empty() {
        lines.push(format!("positives: {}", style.positives.join(" | ")));
    }
    if !style.negatives.is_empty() {
        lines.push(format!("negatives: {}", style.negatives.join(" | ")));
    }
    lines
}

fn adapter_block(adapter: &Adapter) -> Vec<String> {
    let mut lines = Vec::new();
    if !adapter.application_rules.is_empty() {
        lines.push(format!("apply: {}", adapter.application_rules.join(" | ")));
    }
    if !adapter.material_translation_rules.is_empty() {
        lines.push(format!("material_translation: {}", adapter.material_translation_rules.join(" | ")));
    }
    for r in &adapter.resolutions {
        if let Some(value) = &r.value {
            let winner = match r.precedence {
                crate::models::Precedence::BrandWins => "brand",
                crate::models::Precedence::StyleWins => "style",
                crate::models::Precedence::Merge => "merge",
            };
            lines.push(format!("{} ({winner}): {value}", r.attribute));
        }
    }
    let d = &adapter.degradation_policy;
    lines.push(format!("degradation.tierA: {}", d.tier_a_nonnegotiable.join(" | ")));
    lines.push(format!("degradation.tierB: {}", d.tier_b_prefer.join(" | ")));
    lines.push(format!("degradation.tierC: {}", d.tier_c_optional.join(" | ")));
    lines
}

fn layout_block(layout: &LayoutSpec) -> Vec<String> {
    let mut lines = vec![format!("blueprintId: {}", layout.blueprint_id)];
    if let Some(label) = &layout.label {
        lines.push(format!("composition: {label}"));
    }
    if !layout.rules.is_empty() {
        lines.push(format!("rules: {}", layout.rules.join(" | ")));
    }
    lines
}

fn content_block(narrative: &SanitizedNarrative, text: &SlideText) -> Vec<String> {
    let n = narrative.narrative();
    let mut lines = vec![format!("subject: {}", n.subject)];
    if let Some(ctx) = &n.context {
        lines.push(format!("context: {ctx}"));
    }
    if let Some(emotion) = n.emotion.as_ref().filter(|e| !e.is_empty()) {
        lines.push(format!("emotion: {}", emotion.join(" | ")));
    }
    lines.push("TEXT (render each quoted string exactly as written, nothing else):".into());
    lines.push(format!("\"{}\"", text.headline));
    lines.push(format!("\"{}\"", text.body));
    if let Some(cta) = &text.cta {
        lines.push(format!("\"{cta}\""));
    }
    if let Some(url) = &text.url {
        lines.push(format!("\"{url}\""));
    }
    lines
}

fn consistency_block(position: SlidePosition) -> Vec<String> {
    let mut lines = vec![
        "Use the same base composition on every slide.".to_string(),
        "Keep margins, grid, typographic hierarchy and spacing constant.".to_string(),
        "Do not change typeface, scale, weights or hierarchy between slides.".to_string(),
        "Do not move or resize text boxes or main blocks.".to_string(),
        "Only the main subject changes, in content and never in style.".to_string(),
    ];
    if position.is_first() {
        lines.push(format!(
            "This slide (1/{}) establishes the master layout for the whole carousel.",
            position.total
        ));
    } else {
        lines.push(format!(
            "This slide ({}/{}) clones the master layout of slide 1.",
            position.number(),
            position.total
        ));
    }
    if position.is_last() && position.total > 1 {
        lines.push("Closing slide: same layout, the sequence ends here.".to_string());
    }
    lines
}

fn logo_block(brand: &BrandLock, position: SlidePosition) -> Vec<String> {
    let placement = brand
        .logo
        .as_ref()
        .map(|l| l.position.as_str())
        .unwrap_or("bottom-right");
    vec![
        "Insert the provided logo without deforming or recreating it.".to_string(),
        format!("Keep it at {placement}, same position, size and treatment on all {} slides.", position.total),
        "No effects on the logo: no blur, no glow, no shadows.".to_string(),
        "If the logo cannot be preserved exactly, leave it out.".to_string(),
    ]
}

/// Assembles the final prompt. Pure and deterministic; the literal slide text
/// is embedded verbatim.
pub fn compile_prompt(input: &CompileInput<'_>) -> CompiledPrompt {
    let mut lines: Vec<String> = Vec::new();
    let section = |lines: &mut Vec<String>, title: &str, body: Vec<String>| {
        lines.push(title.to_string());
        lines.extend(body);
        lines.push(String::new());
    };

    lines.push(ROLE_HEADER.to_string());
    lines.push(format!("CAROUSEL: slide {} of {}", input.position.number(), input.position.total));
    if let Some(ratio) = input.aspect_ratio {
        lines.push(format!("FORMAT: {ratio}"));
    }
    lines.push(String::new());

    section(&mut lines, "GLOBAL RULES", vec![
        "Do NOT render any prompt text. Render ONLY the quoted TEXT strings.".into(),
        "Never draw field names, tags, hex codes or instructions as visible text.".into(),
    ]);
    section(&mut lines, "LAYER 0: Brand/Identity Lock", brand_block(input.brand));
    section(&mut lines, "LAYER 1: StyleDNA", style_block(input.style));
    if let Some(directive) = input.style.description.as_deref().filter(|d| !d.trim().is_empty()) {
        section(&mut lines, "MASTER STYLE (MANDATORY)", vec![directive.to_string()]);
    }
    section(&mut lines, "LAYER 2: Style-to-Brand Adapter", adapter_block(input.adapter));
    section(&mut lines, "LAYER 3: Layout Spec (geometry only)", layout_block(input.layout));
    section(&mut lines, "LAYER 4: Content Layer", content_block(input.narrative, input.text));
    section(&mut lines, "VISUAL STYLE", vec![format!(
        "{} / {}",
        input.style.family.as_str(),
        input.style.render_medium
    )]);
    section(&mut lines, "CONSISTENCY LOCK", consistency_block(input.position));
    if input.brand.includes_logo() {
        section(&mut lines, "LOGO PRIORITY (MANDATORY)", logo_block(input.brand, input.position));
    }

    lines.push("LAYER 5: Override Policy".into());
    lines.push(
        "If SUBJECT implies a visual technique (3D/photo/gradient/etc.), IGNORE it. StyleDNA + Brand rules are mandatory."
            .into(),
    );
    lines.push("TECHNICAL REQUIREMENTS: clean professional layout for social feeds; type legible on mobile.".into());

    CompiledPrompt {
        slide: input.narrative.slide(),
        prompt: lines.join("\n"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{adapt, sample_brand};
    use crate::models::{LogoSpec, NarrativeOut, StyleFamily};
    use crate::sanitizer::sanitize_narrative;
    use crate::style::sample_style;
    use pretty_assertions::assert_eq;

    fn layout() -> LayoutSpec {
        LayoutSpec {
            blueprint_id: "minimal".into(),
            label: None,
            rules: vec!["Grid 2x2, text block top-left, subject bottom-right".into()],
        }
    }

    fn narrative() -> SanitizedNarrative {
        sanitize_narrative(
            &NarrativeOut { slide: 1, subject: "persona trabajando".into(), context: None, emotion: None },
            &[],
        )
    }

    fn text() -> SlideText {
        SlideText {
            headline: "50% OFF HOY".into(),
            body: "Solo en tienda".into(),
            cta: Some("Reserva ya".into()),
            url: Some("cafelumen.es".into()),
        }
    }

    fn compile_with(brand: &BrandLock, position: SlidePosition) -> CompiledPrompt {
        let style = sample_style(StyleFamily::Photo);
        let adapter = adapt(&style, brand);
        let layout = layout();
        let narrative = narrative();
        let text = text();
        compile_prompt(&CompileInput {
            brand,
            style: &style,
            adapter: &adapter,
            layout: &layout,
            narrative: &narrative,
            text: &text,
            position,
            aspect_ratio: Some("4:5"),
        })
    }

    const SECOND_OF_THREE: SlidePosition = SlidePosition { index: 1, total: 3 };

    #[test]
    fn layers_appear_in_order() {
        let prompt = compile_with(&sample_brand(), SECOND_OF_THREE).prompt;
        let markers = [
            "ROLE:",
            "CAROUSEL: slide 2 of 3",
            "LAYER 0",
            "LAYER 1",
            "MASTER STYLE",
            "LAYER 2",
            "LAYER 3",
            "LAYER 4",
            "VISUAL STYLE",
            "CONSISTENCY LOCK",
            "LAYER 5",
            "TECHNICAL REQUIREMENTS",
        ];
        let positions: Vec<usize> = markers.iter().map(|m| prompt.find(m).unwrap()).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{positions:?}");
        assert!(prompt.contains("covering >=85% of canvas"));
        assert!(prompt.contains("No black/dark fills"));
    }

    #[test]
    fn literal_text_is_kept_verbatim() {
        let compiled = compile_with(&sample_brand(), SECOND_OF_THREE);
        assert!(compiled.prompt.contains("\"50% OFF HOY\""));
        assert!(compiled.prompt.contains("\"Reserva ya\""));
        assert!(!compiled.prompt.contains("CTA:"));
        assert_eq!(compiled.slide, 1);
    }

    #[test]
    fn compiling_twice_is_byte_identical() {
        let brand = sample_brand();
        assert_eq!(compile_with(&brand, SECOND_OF_THREE), compile_with(&brand, SECOND_OF_THREE));
    }

    #[test]
    fn logo_block_only_when_enabled() {
        let mut brand = sample_brand();
        assert!(!compile_with(&brand, SECOND_OF_THREE).prompt.contains("LOGO PRIORITY"));

        brand.logo = Some(LogoSpec {
            enabled: false,
            position: "top-left".into(),
            size_pct_h: 5.0,
            max_width_pct: 15.0,
            url: None,
        });
        assert!(!compile_with(&brand, SECOND_OF_THREE).prompt.contains("LOGO PRIORITY"));

        brand.logo.as_mut().unwrap().enabled = true;
        let prompt = compile_with(&brand, SECOND_OF_THREE).prompt;
        assert!(prompt.contains("LOGO PRIORITY"));
        assert!(prompt.contains("Keep it at top-left"));
    }

    #[test]
    fn first_slide_sets_the_master_layout() {
        let prompt = compile_with(&sample_brand(), SlidePosition { index: 0, total: 3 }).prompt;
        assert!(prompt.contains("establishes the master layout"));
        assert!(prompt.contains("CAROUSEL: slide 1 of 3"));
    }
}
