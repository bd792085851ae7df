//! Public model name to backend bot routing.

/// Public model name and backend bot identifier, in listing order.
const MODEL_TO_BOT: &[(&str, &str)] = &[
    ("gpt-5", "gpt_5"),
    ("gpt-4o", "gpt_4_o_chat"),
    ("gpt-4o-mini", "gpt_4_o_mini_chat"),
    ("gpt-4-5", "gpt_4_5_chat"),
    ("gpt-4.1", "gpt_4_1"),
    ("gpt-4.1-mini", "gpt_4_1_mini"),
    ("gpt-4.1-nano", "gpt_4_1_nano"),
    ("claude-4-sonnet", "claude_4_sonnet"),
    ("claude-4-sonnet-thinking", "claude_4_sonnet_think"),
    ("claude-4-opus", "claude_4_opus"),
    ("claude-4-opus-thinking", "claude_4_opus_think"),
    ("claude-3-7-sonnet-thinking", "claude_3_7_sonnet_think"),
    ("claude-3-7-sonnet", "claude_3_7_sonnet"),
    ("claude-3-5-sonnet", "claude_3.5_sonnet"),
    ("claude-3-5-haiku", "claude_3.5_haiku"),
    ("gemini-2.5-pro", "gemini_2_5_pro"),
    ("gemini-2.5-flash", "gemini_2_5_flash"),
    ("gemini-2.0-flash", "gemini_2_0"),
    ("gemini-1", "gemini_1_5"),
    ("o1-preview", "openai_o_1"),
    ("o3", "o3"),
    ("o3-mini", "openai_o_3_mini"),
    ("o4-mini", "o4_mini"),
    ("deepseek-reasoner", "deepseek_reasoner"),
    ("deepseek-chat", "deepseek_chat"),
    ("deepclaude", "deepclaude"),
    ("sonar", "sonar"),
    ("sonar-reasoning-pro", "sonar_reasoning_pro"),
    ("grok-3-beta", "grok_3_beta"),
    ("grok-4", "grok_4"),
];

/// Map a public model name to the backend bot id.
///
/// Unknown names pass through unchanged; the backend may still accept them.
#[must_use]
pub fn resolve_bot(public_name: &str) -> String {
    if let Some((_, bot)) = MODEL_TO_BOT.iter().find(|(name, _)| *name == public_name) {
        return (*bot).to_string();
    }
    tracing::warn!(model = public_name, "No bot mapping for model, using name as-is");
    public_name.to_string()
}

/// Public model names, in listing order.
#[must_use]
pub fn supported_models() -> Vec<&'static str> {
    MODEL_TO_BOT.iter().map(|(name, _)| *name).collect()
}
