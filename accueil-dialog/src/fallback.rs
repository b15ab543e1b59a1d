//! Static intent-to-template replies used when the backend is unusable

use accueil_core::config::DialogConfig;
use accueil_core::Entities;
use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use rand::Rng;
use regex::Regex;
use std::collections::HashMap;
use thiserror::Error;

/// `{{`, `}}`, a `{name}` placeholder, or a stray brace
static TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{|\}\}|\{([A-Za-z_][A-Za-z0-9_]*)\}|[{}]")
        .expect("template token pattern is valid")
});

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateRenderError {
    #[error("template references missing entity '{0}'")]
    MissingEntity(String),

    #[error("malformed template: unbalanced brace at byte {0}")]
    Malformed(usize),
}

/// Substitute `{name}` placeholders from `entities`
pub fn render_template(template: &str, entities: &Entities) -> Result<String, TemplateRenderError> {
    let mut out = String::with_capacity(template.len());
    let mut last = 0;

    for caps in TOKEN_RE.captures_iter(template) {
        let Some(token) = caps.get(0) else { continue };
        out.push_str(&template[last..token.start()]);
        match token.as_str() {
            "{{" => out.push('{'),
            "}}" => out.push('}'),
            "{" | "}" => return Err(TemplateRenderError::Malformed(token.start())),
            _ => {
                let name = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
                let value = entities
                    .get(name)
                    .ok_or_else(|| TemplateRenderError::MissingEntity(name.to_string()))?;
                out.push_str(&value.render());
            }
        }
        last = token.end();
    }

    out.push_str(&template[last..]);
    Ok(out)
}

/// Intent-keyed fallback templates plus the generic apology
#[derive(Debug, Clone)]
pub struct FallbackPolicy {
    rules: HashMap<String, Vec<String>>,
    generic_apology: String,
}

impl FallbackPolicy {
    pub fn new(rules: HashMap<String, Vec<String>>, generic_apology: impl Into<String>) -> Self {
        Self {
            // Rules without variants can never produce text
            rules: rules.into_iter().filter(|(_, v)| !v.is_empty()).collect(),
            generic_apology: generic_apology.into(),
        }
    }

    pub fn from_config(config: &DialogConfig) -> Self {
        Self::new(
            config
                .fallback
                .iter()
                .map(|(intent, variants)| (intent.clone(), variants.clone()))
                .collect(),
            config.generic_apology.clone(),
        )
    }

    pub fn generic_apology(&self) -> &str {
        &self.generic_apology
    }

    pub fn has_rule(&self, intent: &str) -> bool {
        self.rules.contains_key(intent)
    }

    pub fn variants(&self, intent: &str) -> Option<&[String]> {
        self.rules.get(intent).map(Vec::as_slice)
    }

    /// Pick one variant for `intent` uniformly at random and render it.
    ///
    /// Returns `None` when no rule exists for the intent.
    pub fn render<R: Rng + ?Sized>(
        &self,
        intent: &str,
        entities: &Entities,
        rng: &mut R,
    ) -> Option<Result<String, TemplateRenderError>> {
        let template = self.rules.get(intent)?.choose(rng)?;
        Some(render_template(template, entities))
    }
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self::from_config(&DialogConfig::default())
    }
}
