use thiserror::Error;

use crate::models::{StyleDna, StyleFamily, STYLE_DNA_SOURCE, STYLE_DNA_VERSION};

#[derive(Debug, Error, PartialEq)]
pub enum StyleShapeError {
    #[error("StyleDNA.version must be \"1.0\", got \"{0}\"")]
    Version(String),
    #[error("StyleDNA.source must be \"reference_image_analysis\", got \"{0}\"")]
    Source(String),
    #[error("StyleDNA.render_medium is required")]
    RenderMedium,
    #[error("StyleDNA.confidence must be within 0..=1, got {0}")]
    Confidence(f32),
}

/// Checks the invariants serde cannot express on a freshly parsed StyleDNA.
pub fn ensure_style_shape(style: &StyleDna) -> Result<(), StyleShapeError> {
    if style.version != STYLE_DNA_VERSION {
        return Err(StyleShapeError::Version(style.version.clone()));
    }
    if style.source != STYLE_DNA_SOURCE {
        return Err(StyleShapeError::Source(style.source.clone()));
    }
    if style.render_medium.trim().is_empty() {
        return Err(StyleShapeError::RenderMedium);
    }
    if let Some(c) = style.confidence {
        if !(0.0..=1.0).contains(&c) {
            return Err(StyleShapeError::Confidence(c));
        }
    }
    Ok(())
}

const LINE_ART_DRAMA: &[&str] = &["chiaroscuro", "dramatic", "deep shadows"];

fn mentions_drama(item: &str) -> bool {
    let lower = item.to_lowercase();
    LINE_ART_DRAMA.iter().any(|t| lower.contains(t))
}

fn push_unique(list: &mut Vec<String>, item: &str) {
    if !list.iter().any(|existing| existing == item) {
        list.push(item.to_string());
    }
}

/// Line art has no light to speak of: drop dramatic lighting vocabulary and
/// pin the guards that keep black strictly for strokes and text. Other
/// families pass through unchanged.
pub fn normalize_style_dna(style: StyleDna) -> StyleDna {
    if style.family != StyleFamily::LineArt {
        return style;
    }

    let mut positives: Vec<String> = Vec::new();
    for p in style.positives.iter().filter(|p| !mentions_drama(p)) {
        push_unique(&mut positives, p);
    }
    push_unique(&mut positives, "high contrast via crosshatching density");

    let mut negatives: Vec<String> = Vec::new();
    for n in style.negatives.iter().filter(|n| !mentions_drama(n)) {
        push_unique(&mut negatives, n);
    }
    push_unique(&mut negatives, "no black background fill");
    push_unique(&mut negatives, "black only for linework and text");

    StyleDna {
        lighting: Some("flat/none".into()),
        positives,
        negatives,
        ..style
    }
}

#[cfg(test)]
pub(crate) fn sample_style(family: StyleFamily) -> StyleDna {
    StyleDna {
        version: STYLE_DNA_VERSION.into(),
        source: STYLE_DNA_SOURCE.into(),
        family,
        render_medium: "digital photo".into(),
        line_quality: None,
        shading: None,
        lighting: Some("soft daylight".into()),
        texture: None,
        color_behavior: None,
        palette: vec!["#ffffff".into(), "#202020".into()],
        description: Some("Editorial daylight scene with clean contrast".into()),
        confidence: Some(0.8),
        positives: vec!["clean contrast".into()],
        negatives: vec!["no blur".into(), "no gradient".into()],
    }
}
