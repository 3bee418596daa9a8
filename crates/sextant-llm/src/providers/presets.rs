/// A named provider preset for OpenAI-compatible APIs.
pub struct ProviderPreset {
    pub default_base_url: &'static str,
    pub needs_api_key: bool,
}

/// Look up a provider preset by name.
pub fn get_preset(provider: &str) -> Option<ProviderPreset> {
    match provider {
        "openai" => Some(ProviderPreset {
            default_base_url: "https://api.openai.com/v1",
            needs_api_key: true,
        }),
        "ollama" => Some(ProviderPreset {
            default_base_url: "http://localhost:11434/v1",
            needs_api_key: false,
        }),
        "groq" => Some(ProviderPreset {
            default_base_url: "https://api.groq.com/openai/v1",
            needs_api_key: true,
        }),
        "openrouter" => Some(ProviderPreset {
            default_base_url: "https://openrouter.ai/api/v1",
            needs_api_key: true,
        }),
        "together" => Some(ProviderPreset {
            default_base_url: "https://api.together.xyz/v1",
            needs_api_key: true,
        }),
        "mistral" => Some(ProviderPreset {
            default_base_url: "https://api.mistral.ai/v1",
            needs_api_key: true,
        }),
        "deepseek" => Some(ProviderPreset {
            default_base_url: "https://api.deepseek.com/v1",
            needs_api_key: true,
        }),
        _ => None,
    }
}

/// Resolve the chat-completions endpoint for a provider.
///
/// An explicit `base_url` wins over the preset. Either may be given with or
/// without the trailing `/chat/completions`.
pub fn chat_completions_url(provider: &str, base_url: Option<&str>) -> Option<String> {
    let base = match base_url {
        Some(url) => url.to_string(),
        None => get_preset(provider)?.default_base_url.to_string(),
    };
    let base = base.trim_end_matches('/');
    if base.ends_with("/chat/completions") {
        Some(base.to_string())
    } else {
        Some(format!("{}/chat/completions", base))
    }
}

/// List all known preset provider names.
pub fn all_preset_names() -> &'static [&'static str] {
    &[
        "openai",
        "ollama",
        "groq",
        "openrouter",
        "together",
        "mistral",
        "deepseek",
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_listed_preset_resolves() {
        for name in all_preset_names() {
            assert!(get_preset(name).is_some(), "missing preset {}", name);
        }
    }

    #[test]
    fn test_url_from_preset() {
        assert_eq!(
            chat_completions_url("ollama", None).unwrap(),
            "http://localhost:11434/v1/chat/completions"
        );
    }

    #[test]
    fn test_explicit_base_url_wins() {
        assert_eq!(
            chat_completions_url("openai", Some("http://proxy.local/v1/")).unwrap(),
            "http://proxy.local/v1/chat/completions"
        );
        assert_eq!(
            chat_completions_url("custom", Some("http://h/v1/chat/completions")).unwrap(),
            "http://h/v1/chat/completions"
        );
    }

    #[test]
    fn test_unknown_provider_without_url() {
        assert!(chat_completions_url("nope", None).is_none());
    }
}
