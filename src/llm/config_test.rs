use std::sync::{Mutex, MutexGuard};

use super::*;

// Process env is global; serialize every test that touches it.
static ENV_LOCK: Mutex<()> = Mutex::new(());

fn lock_env() -> MutexGuard<'static, ()> {
    let guard = ENV_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    unsafe {
        std::env::remove_var("LLM_PROVIDER");
        std::env::remove_var("LLM_MODEL");
        std::env::remove_var("LLM_CLASSIFIER_MODEL");
        std::env::remove_var("LLM_API_KEY_ENV");
        std::env::remove_var("LLM_OPENAI_BASE_URL");
        std::env::remove_var("LLM_REQUEST_TIMEOUT_SECS");
        std::env::remove_var("LLM_CONNECT_TIMEOUT_SECS");
        std::env::remove_var("ANTHROPIC_API_KEY");
        std::env::remove_var("OPENAI_API_KEY");
        std::env::remove_var("TEST_KEY");
    }
    guard
}

#[test]
fn from_env_defaults_to_anthropic() {
    let _env = lock_env();
    unsafe {
        std::env::set_var("LLM_API_KEY_ENV", "TEST_KEY");
        std::env::set_var("TEST_KEY", "secret");
    }

    let cfg = LlmConfig::from_env().unwrap();
    assert_eq!(cfg.provider, LlmProviderKind::Anthropic);
    assert_eq!(cfg.model, "claude-sonnet-4-5-20250929");
    assert_eq!(cfg.classifier_model, cfg.model);
    assert_eq!(cfg.openai_base_url, DEFAULT_OPENAI_BASE_URL);
    assert_eq!(
        cfg.timeouts,
        LlmTimeouts { request_secs: DEFAULT_LLM_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_LLM_CONNECT_TIMEOUT_SECS }
    );
    assert_eq!(cfg.api_key, "secret");
}

#[test]
fn from_env_parses_openai_overrides() {
    let _env = lock_env();
    unsafe {
        std::env::set_var("LLM_PROVIDER", "openai");
        std::env::set_var("LLM_API_KEY_ENV", "OPENAI_API_KEY");
        std::env::set_var("OPENAI_API_KEY", "sk-test");
        std::env::set_var("LLM_CLASSIFIER_MODEL", "gpt-4o-mini");
        std::env::set_var("LLM_OPENAI_BASE_URL", "https://example.test/v1/");
        std::env::set_var("LLM_REQUEST_TIMEOUT_SECS", "42");
        std::env::set_var("LLM_CONNECT_TIMEOUT_SECS", "7");
    }

    let cfg = LlmConfig::from_env().unwrap();
    assert_eq!(cfg.provider, LlmProviderKind::OpenAi);
    assert_eq!(cfg.model, "gpt-4o");
    assert_eq!(cfg.classifier_model, "gpt-4o-mini");
    assert_eq!(cfg.openai_base_url, "https://example.test/v1");
    assert_eq!(cfg.timeouts, LlmTimeouts { request_secs: 42, connect_secs: 7 });
}

#[test]
fn from_env_unknown_provider_errors() {
    let _env = lock_env();
    unsafe {
        std::env::set_var("LLM_PROVIDER", "bad");
        std::env::set_var("LLM_API_KEY_ENV", "TEST_KEY");
        std::env::set_var("TEST_KEY", "secret");
    }

    let err = LlmConfig::from_env().unwrap_err().to_string();
    assert!(err.contains("unknown LLM_PROVIDER"));
}

#[test]
fn from_env_missing_key_errors() {
    let _env = lock_env();

    let err = LlmConfig::from_env().unwrap_err().to_string();
    assert!(err.contains("LLM_API_KEY_ENV"));
}
