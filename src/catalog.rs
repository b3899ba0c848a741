//! # Provider and Model Alias Catalog
//!
//! Two lookup tables drive name resolution across the SDK:
//!
//! ## Provider aliases
//!
//! A dotted name such as `openai.deepseek` selects a *wire family* (the part
//! before the dot) plus endpoint and credential conventions for a specific
//! service. The alias system namespaces credentials so several
//! OpenAI-compatible services can coexist in one process without fighting
//! over `OPENAI_API_KEY`.
//!
//! | Alias | Default base URL | API-key env | Base-URL override env |
//! |-------|-----------------|-------------|----------------------|
//! | `openai` | `https://api.openai.com/v1` | `OPENAI_API_KEY` | `OPENAI_BASE_URL` |
//! | `openai.deepseek` | `https://api.deepseek.com` | `DEEPSEEK_API_KEY` | `DEEPSEEK_BASE_URL` |
//! | `openai.groq` | `https://api.groq.com/openai/v1` | `GROQ_API_KEY` | `GROQ_BASE_URL` |
//! | `openai.xai` | `https://api.x.ai/v1` | `XAI_API_KEY` | `XAI_BASE_URL` |
//! | `openai.qwen` | Dashscope compatible endpoint | `QWEN_API_KEY` | `QWEN_BASE_URL` |
//! | `openai.together` | `https://api.together.xyz/v1` | `TOGETHER_API_KEY` | `TOGETHER_BASE_URL` |
//! | `openai.ollama` | `http://localhost:11434/v1` | (none) | `OLLAMA_BASE_URL` |
//!
//! ## Model aliases
//!
//! The abstract names `fast`, `smart`, `code`, and `vision` resolve to a
//! concrete model identifier *per provider*. Resolution happens inside each
//! adapter's default application, so a chain configured with `model: "smart"`
//! gets each provider's own "smart" model at each attempt rather than the
//! first provider's choice bleeding through.

/// Endpoint and credential conventions for one provider alias.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderAlias {
    /// Full alias as configured, e.g. `openai.deepseek`.
    pub alias: &'static str,
    /// Wire family the alias routes through, e.g. `openai`.
    pub base_provider: &'static str,
    /// Default endpoint when neither option nor env override it.
    pub base_url: &'static str,
    /// Environment variable holding the API key; `None` for keyless local
    /// services.
    pub api_key_env: Option<&'static str>,
    /// Environment variable overriding the base URL.
    pub base_url_env: &'static str,
    /// Model used when the request leaves the model unset.
    pub default_model: &'static str,
}

/// Every provider alias the SDK recognizes, including the bare wire
/// families themselves.
pub const PROVIDER_ALIASES: &[ProviderAlias] = &[
    ProviderAlias {
        alias: "openai",
        base_provider: "openai",
        base_url: "https://api.openai.com/v1",
        api_key_env: Some("OPENAI_API_KEY"),
        base_url_env: "OPENAI_BASE_URL",
        default_model: "gpt-4o-mini",
    },
    ProviderAlias {
        alias: "openai.deepseek",
        base_provider: "openai",
        base_url: "https://api.deepseek.com",
        api_key_env: Some("DEEPSEEK_API_KEY"),
        base_url_env: "DEEPSEEK_BASE_URL",
        default_model: "deepseek-chat",
    },
    ProviderAlias {
        alias: "openai.groq",
        base_provider: "openai",
        base_url: "https://api.groq.com/openai/v1",
        api_key_env: Some("GROQ_API_KEY"),
        base_url_env: "GROQ_BASE_URL",
        default_model: "llama-3.3-70b-versatile",
    },
    ProviderAlias {
        alias: "openai.xai",
        base_provider: "openai",
        base_url: "https://api.x.ai/v1",
        api_key_env: Some("XAI_API_KEY"),
        base_url_env: "XAI_BASE_URL",
        default_model: "grok-3",
    },
    ProviderAlias {
        alias: "openai.qwen",
        base_provider: "openai",
        base_url: "https://dashscope.aliyuncs.com/compatible-mode/v1",
        api_key_env: Some("QWEN_API_KEY"),
        base_url_env: "QWEN_BASE_URL",
        default_model: "qwen-plus",
    },
    ProviderAlias {
        alias: "openai.together",
        base_provider: "openai",
        base_url: "https://api.together.xyz/v1",
        api_key_env: Some("TOGETHER_API_KEY"),
        base_url_env: "TOGETHER_BASE_URL",
        default_model: "meta-llama/Llama-3.3-70B-Instruct-Turbo",
    },
    ProviderAlias {
        alias: "openai.ollama",
        base_provider: "openai",
        base_url: "http://localhost:11434/v1",
        api_key_env: None,
        base_url_env: "OLLAMA_BASE_URL",
        default_model: "llama3.2",
    },
    ProviderAlias {
        alias: "anthropic",
        base_provider: "anthropic",
        base_url: "https://api.anthropic.com",
        api_key_env: Some("ANTHROPIC_API_KEY"),
        base_url_env: "ANTHROPIC_BASE_URL",
        default_model: "claude-sonnet-4-0",
    },
    ProviderAlias {
        alias: "gemini",
        base_provider: "gemini",
        base_url: "https://generativelanguage.googleapis.com/v1beta",
        api_key_env: Some("GEMINI_API_KEY"),
        base_url_env: "GEMINI_BASE_URL",
        default_model: "gemini-2.0-flash",
    },
    ProviderAlias {
        alias: "bedrock",
        base_provider: "bedrock",
        base_url: "",
        api_key_env: None,
        base_url_env: "",
        default_model: "anthropic.claude-3-5-sonnet-20241022-v2:0",
    },
];

/// Look up an alias (dotted or bare) in the catalog.
pub fn lookup_alias(name: &str) -> Option<&'static ProviderAlias> {
    PROVIDER_ALIASES.iter().find(|a| a.alias == name)
}

/// True when `name` is in the catalog.
pub fn is_known_alias(name: &str) -> bool {
    lookup_alias(name).is_some()
}

/// The abstract model names every provider maps to a concrete identifier.
pub const MODEL_ALIASES: &[&str] = &["fast", "smart", "code", "vision"];

/// True when `name` is one of the abstract model aliases.
pub fn is_model_alias(name: &str) -> bool {
    MODEL_ALIASES.contains(&name)
}

/// Resolve an abstract model alias against a provider.
///
/// Lookup tries the full provider alias first (`openai.deepseek`), then its
/// wire family (`openai`), so sub-aliases can override the family mapping.
/// Returns `None` when `name` is not an abstract alias or the provider has no
/// mapping for it; the adapter then falls back to its default model.
pub fn resolve_model_alias(provider: &str, name: &str) -> Option<&'static str> {
    if !is_model_alias(name) {
        return None;
    }
    model_table(provider, name).or_else(|| {
        lookup_alias(provider).and_then(|a| {
            if a.base_provider == provider {
                None
            } else {
                model_table(a.base_provider, name)
            }
        })
    })
}

fn model_table(provider: &str, name: &str) -> Option<&'static str> {
    let model = match (provider, name) {
        ("openai", "fast") => "gpt-4o-mini",
        ("openai", "smart") => "gpt-4o",
        ("openai", "code") => "gpt-4o",
        ("openai", "vision") => "gpt-4o",

        ("openai.deepseek", "fast") => "deepseek-chat",
        ("openai.deepseek", "smart") => "deepseek-reasoner",
        ("openai.deepseek", "code") => "deepseek-chat",

        ("openai.groq", "fast") => "llama-3.1-8b-instant",
        ("openai.groq", "smart") => "llama-3.3-70b-versatile",
        ("openai.groq", "code") => "llama-3.3-70b-versatile",

        ("openai.xai", "fast") => "grok-3-mini",
        ("openai.xai", "smart") => "grok-3",
        ("openai.xai", "vision") => "grok-2-vision-1212",

        ("anthropic", "fast") => "claude-3-5-haiku-latest",
        ("anthropic", "smart") => "claude-sonnet-4-0",
        ("anthropic", "code") => "claude-sonnet-4-0",
        ("anthropic", "vision") => "claude-sonnet-4-0",

        ("gemini", "fast") => "gemini-2.0-flash",
        ("gemini", "smart") => "gemini-2.5-pro",
        ("gemini", "code") => "gemini-2.5-pro",
        ("gemini", "vision") => "gemini-2.0-flash",

        ("bedrock", "fast") => "anthropic.claude-3-5-haiku-20241022-v1:0",
        ("bedrock", "smart") => "anthropic.claude-3-5-sonnet-20241022-v2:0",
        ("bedrock", "code") => "anthropic.claude-3-5-sonnet-20241022-v2:0",
        ("bedrock", "vision") => "anthropic.claude-3-5-sonnet-20241022-v2:0",

        _ => return None,
    };
    Some(model)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alias_table_entries() {
        let deepseek = lookup_alias("openai.deepseek").unwrap();
        assert_eq!(deepseek.base_provider, "openai");
        assert_eq!(deepseek.base_url, "https://api.deepseek.com");
        assert_eq!(deepseek.api_key_env, Some("DEEPSEEK_API_KEY"));
        assert_eq!(deepseek.base_url_env, "DEEPSEEK_BASE_URL");

        assert!(lookup_alias("openai.nonexistent").is_none());
    }

    #[test]
    fn test_ollama_is_keyless() {
        let ollama = lookup_alias("openai.ollama").unwrap();
        assert_eq!(ollama.api_key_env, None);
        assert_eq!(ollama.base_url, "http://localhost:11434/v1");
    }

    #[test]
    fn test_bare_families_are_known() {
        for name in ["openai", "anthropic", "gemini", "bedrock"] {
            assert!(is_known_alias(name), "{name} should be known");
        }
        assert!(!is_known_alias("mistral"));
    }

    #[test]
    fn test_model_alias_detection() {
        assert!(is_model_alias("fast"));
        assert!(is_model_alias("vision"));
        assert!(!is_model_alias("gpt-4o"));
        assert!(!is_model_alias(""));
    }

    #[test]
    fn test_model_alias_resolves_per_provider() {
        assert_eq!(resolve_model_alias("openai", "smart"), Some("gpt-4o"));
        assert_eq!(
            resolve_model_alias("anthropic", "smart"),
            Some("claude-sonnet-4-0")
        );
        assert_eq!(resolve_model_alias("gemini", "smart"), Some("gemini-2.5-pro"));
    }

    #[test]
    fn test_sub_alias_overrides_family() {
        // deepseek overrides the openai family mapping for "smart"
        assert_eq!(
            resolve_model_alias("openai.deepseek", "smart"),
            Some("deepseek-reasoner")
        );
        // but falls back to the family for aliases it does not define
        assert_eq!(
            resolve_model_alias("openai.deepseek", "vision"),
            Some("gpt-4o")
        );
    }

    #[test]
    fn test_concrete_model_passes_through() {
        assert_eq!(resolve_model_alias("openai", "gpt-4o-mini"), None);
    }

    #[test]
    fn test_unmapped_provider_returns_none() {
        assert_eq!(resolve_model_alias("nonexistent", "smart"), None);
    }
}
