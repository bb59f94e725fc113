//! Deny-list of style and material vocabulary.
//!
//! The grouped tokens drive narrative sanitizing; the layout guard uses the
//! union plus a handful of brand-safety terms and rejects on the first hit.

use thiserror::Error;

use crate::models::LayoutSpec;

pub const FORBIDDEN_TOKEN_GROUPS: &[(&str, &[&str])] = &[
    (
        "background",
        &[
            "fondo negro",
            "fondo oscuro",
            "black background",
            "dark background",
            "white background",
            "fondo blanco",
        ],
    ),
    (
        "style",
        &[
            "premium",
            "render",
            "hiperrealista",
            "hyperrealistic",
            "octane",
            "unreal engine",
            "3d render",
        ],
    ),
    (
        "lighting",
        &[
            "dramatic lighting",
            "dramatic",
            "golden hour",
            "dark shadows",
            "deep shadows",
            "chiaroscuro",
            "backlight",
            "contraluz",
            "iluminacion dramatica",
        ],
    ),
    (
        "material",
        &[
            "glossy",
            "matte",
            "holographic",
            "holografico",
            "gold foil",
            "marble",
        ],
    ),
    (
        "camera",
        &[
            "bokeh",
            "depth of field",
            "wide angle",
            "close-up shot",
            "35mm",
            "85mm",
        ],
    ),
];

/// Extra terms only the layout guard denies.
pub const LAYOUT_ONLY_TOKENS: &[&str] = &[
    "glass",
    "neon",
    "metallic",
    "chrome",
    "cinematic",
    "photorealistic",
    "realistic",
];

pub fn all_forbidden_tokens() -> impl Iterator<Item = &'static str> {
    FORBIDDEN_TOKEN_GROUPS
        .iter()
        .flat_map(|(_, tokens)| tokens.iter().copied())
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GuardError {
    #[error("Layout rule contains forbidden style/material token: \"{token}\"")]
    ForbiddenToken { token: String, rule: String },
}

/// Scans every layout rule, case-insensitively, and fails on the first
/// forbidden token found. Rules are visited in order; within a rule the shared
/// list is checked before the layout-only terms.
pub fn validate_layout_spec(layout: &LayoutSpec) -> Result<(), GuardError> {
    for rule in &layout.rules {
        let lower = rule.to_lowercase();
        let hit = all_forbidden_tokens()
            .chain(LAYOUT_ONLY_TOKENS.iter().copied())
            .find(|token| lower.contains(token));
        if let Some(token) = hit {
            return Err(GuardError::ForbiddenToken {
                token: token.to_string(),
                rule: rule.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(rules: &[&str]) -> LayoutSpec {
        LayoutSpec {
            blueprint_id: "minimal".into(),
            label: None,
            rules: rules.iter().map(|r| r.to_string()).collect(),
        }
    }

    #[test]
    fn clean_rules_pass() {
        let spec = layout(&["Grid 2x2, text block top-left, subject bottom-right", "Logo anchor bottom-right"]);
        assert_eq!(validate_layout_spec(&spec), Ok(()));
    }

    #[test]
    fn first_forbidden_token_is_named() {
        let spec = layout(&["Centered headline", "neon chrome finish"]);
        let err = validate_layout_spec(&spec).unwrap_err();
        let GuardError::ForbiddenToken { token, rule } = err;
        assert_eq!(token, "neon");
        assert_eq!(rule, "neon chrome finish");
    }

    #[test]
    fn match_is_case_insensitive() {
        let spec = layout(&["Subject in CINEMATIC framing"]);
        assert!(matches!(
            validate_layout_spec(&spec),
            Err(GuardError::ForbiddenToken { ref token, .. }) if token == "cinematic"
        ));
    }

    #[test]
    fn shared_tokens_are_denied_too() {
        let spec = layout(&["Soft bokeh behind the subject"]);
        assert!(validate_layout_spec(&spec).is_err());
        assert!(validate_layout_spec(&layout(&["Golden Hour sky"])).is_err());
        assert!(validate_layout_spec(&layout(&["persona trabajando"])).is_ok());
    }

    #[test]
    fn empty_rules_pass() {
        assert_eq!(validate_layout_spec(&layout(&[])), Ok(()));
    }
}
