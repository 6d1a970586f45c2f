//! Template engines behind [`RenderEngine`].

mod expression;
mod handlebars;
mod model;

use std::{fmt, num::NonZeroUsize, str::FromStr, sync::Arc};

use serde::Deserialize;

pub use self::handlebars::HandlebarsEngine;
pub use expression::{CompiledTemplate, DEFAULT_COMPILED_CACHE_CAPACITY, ExpressionEngine};
pub use model::{LinkModel, PageModel, value_to_json};

use super::types::RenderEngine;

/// Which engine renders templates; a deployment-wide choice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    #[default]
    Expression,
    Handlebars,
}

impl EngineKind {
    pub fn build(self, compiled_cache_capacity: NonZeroUsize) -> Arc<dyn RenderEngine> {
        match self {
            Self::Expression => Arc::new(ExpressionEngine::new(compiled_cache_capacity)),
            Self::Handlebars => Arc::new(HandlebarsEngine::new(compiled_cache_capacity)),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Expression => "expression",
            Self::Handlebars => "handlebars",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "expression" | "razor" => Ok(Self::Expression),
            "handlebars" | "hbs" => Ok(Self::Handlebars),
            other => Err(format!(
                "unknown engine `{other}`, expected `expression` or `handlebars`"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_names_parse() {
        assert_eq!("Expression".parse(), Ok(EngineKind::Expression));
        assert_eq!("razor".parse(), Ok(EngineKind::Expression));
        assert_eq!(" hbs ".parse(), Ok(EngineKind::Handlebars));
        assert!("liquid".parse::<EngineKind>().is_err());
    }

    #[test]
    fn built_engines_report_their_kind() {
        let capacity = NonZeroUsize::new(4).unwrap();
        for kind in [EngineKind::Expression, EngineKind::Handlebars] {
            assert_eq!(kind.build(capacity).name(), kind.as_str());
        }
    }
}
