//! Style-to-brand reconciliation.
//!
//! Which side wins for each visual attribute is declared in
//! [`PRECEDENCE_TABLE`]; [`adapt`] applies it and adds the per-family rules.

use crate::models::{
    Adapter, AttributeResolution, BrandLock, DegradationPolicy, Precedence, StyleDna, StyleFamily,
};

pub const PRECEDENCE_TABLE: &[(&str, Precedence)] = &[
    ("palette.background", Precedence::BrandWins),
    ("palette.text", Precedence::BrandWins),
    ("palette.accent", Precedence::BrandWins),
    ("palette.neutral", Precedence::BrandWins),
    ("render_medium", Precedence::StyleWins),
    ("lighting", Precedence::StyleWins),
    ("shading", Precedence::StyleWins),
    ("texture", Precedence::StyleWins),
    ("line_quality", Precedence::StyleWins),
    ("color_behavior", Precedence::Merge),
];

pub fn precedence_of(attribute: &str) -> Option<Precedence> {
    PRECEDENCE_TABLE
        .iter()
        .find(|(name, _)| *name == attribute)
        .map(|(_, p)| *p)
}

fn is_white_like(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "#fff" | "#ffffff" | "white" | "blanco")
}

fn mentions_any(text: Option<&str>, tokens: &[&str]) -> bool {
    text.map(|t| {
        let lower = t.to_lowercase();
        tokens.iter().any(|token| lower.contains(token))
    })
    .unwrap_or(false)
}

fn brand_value(brand: &BrandLock, attribute: &str) -> Option<String> {
    match attribute {
        "palette.background" => Some(brand.palette.background.clone()),
        "palette.text" => Some(brand.palette.text.clone()),
        "palette.accent" => Some(brand.palette.accent.clone()),
        "palette.neutral" => brand.palette.neutral.clone(),
        _ => None,
    }
}

fn style_value(style: &StyleDna, attribute: &str) -> Option<String> {
    match attribute {
        "render_medium" => Some(style.render_medium.clone()),
        "lighting" => style.lighting.clone(),
        "shading" => style.shading.clone(),
        "texture" => style.texture.clone(),
        "line_quality" => style.line_quality.clone(),
        "color_behavior" => style.color_behavior.clone(),
        _ => None,
    }
}

fn resolve(style: &StyleDna, brand: &BrandLock, attribute: &str, precedence: Precedence) -> Option<String> {
    match precedence {
        Precedence::BrandWins => brand_value(brand, attribute),
        Precedence::StyleWins => style_value(style, attribute),
        Precedence::Merge => {
            let palette = format!(
                "brand palette {} / {} / {}",
                brand.palette.background, brand.palette.text, brand.palette.accent
            );
            Some(match style_value(style, attribute) {
                Some(behavior) => format!("{behavior}, restricted to {palette}"),
                None => palette,
            })
        }
    }
}

fn application_rules(style: &StyleDna, background_is_white: bool) -> Vec<String> {
    let mut rules = Vec::new();
    match style.family {
        StyleFamily::Photo if !background_is_white => rules.push(
            "Keep photographic realism; apply a subtle grade towards the brand background without destroying realistic lighting.".to_string(),
        ),
        StyleFamily::LineArt => {
            rules.push("Prioritise clean, consistent lines; do not introduce painterly textures.".to_string())
        }
        StyleFamily::Watercolor | StyleFamily::OilPaint => rules.push(
            "Preserve the behaviour of the medium (washes, brush strokes) without adding external techniques.".to_string(),
        ),
        StyleFamily::Cartoon3d | StyleFamily::Cartoon2d | StyleFamily::Anime => {
            rules.push("Respect stylised proportions, avoiding photographic realism.".to_string())
        }
        _ => {}
    }
    rules
}

fn degradation_policy() -> DegradationPolicy {
    DegradationPolicy {
        tier_a_nonnegotiable: vec![
            "StyleDNA has absolute priority over any aesthetic hint in the subject.".into(),
            "Brand palette and brand rules are mandatory.".into(),
            "Do not introduce techniques not declared in StyleDNA.".into(),
        ],
        tier_b_prefer: vec![
            "Keep line_quality, shading and texture coherent when present.".into(),
            "Apply material translation rules when they conflict with the brand.".into(),
        ],
        tier_c_optional: vec![
            "Simplify secondary details if they hurt text legibility.".into(),
            "Reduce texture complexity if it competes with the type hierarchy.".into(),
        ],
    }
}

/// Builds the adapter for one carousel. Pure: neither input is touched and the
/// same inputs always give the same adapter.
pub fn adapt(style: &StyleDna, brand: &BrandLock) -> Adapter {
    let background_is_white = is_white_like(&brand.palette.background);
    let paper = ["paper", "papel"];
    let mentions_paper = mentions_any(Some(&style.render_medium), &paper)
        || mentions_any(style.texture.as_deref(), &paper)
        || mentions_any(Some(&style.positives.join(" ")), &paper);

    let mut material_translation_rules = Vec::new();
    if mentions_paper && !background_is_white {
        material_translation_rules.push(format!(
            "Treat the substrate as paper tinted with the background colour ({}) instead of white.",
            brand.palette.background
        ));
    }

    let resolutions = PRECEDENCE_TABLE
        .iter()
        .map(|(attribute, precedence)| AttributeResolution {
            attribute: attribute.to_string(),
            precedence: *precedence,
            value: resolve(style, brand, attribute, *precedence),
        })
        .collect();

    Adapter {
        application_rules: application_rules(style, background_is_white),
        material_translation_rules,
        degradation_policy: degradation_policy(),
        resolutions,
    }
}

#[cfg(test)]
pub(crate) fn sample_brand() -> BrandLock {
    use crate::models::{BrandPalette, TextRules};
    BrandLock {
        brand_name: Some("Cafe Lumen".into()),
        language: "es".into(),
        palette: BrandPalette {
            background: "#f0e500".into(),
            text: "#141210".into(),
            accent: "#ff6a00".into(),
            neutral: None,
        },
        background_is_absolute: true,
        logo: None,
        text_rules: TextRules { allow_only_text_field: true, forbid_extra_text: true },
        typography: None,
        tone: vec!["cercano".into()],
    }
}
