use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModelCapabilities {
    pub max_tokens: u32,
    pub context_window: u32,
    pub supports_vision: bool,
    pub supports_tools: bool,
    pub supports_streaming: bool,
}

impl ModelCapabilities {
    pub const fn new(
        max_tokens: u32,
        context_window: u32,
        supports_vision: bool,
        supports_tools: bool,
    ) -> Self {
        ModelCapabilities {
            max_tokens,
            context_window,
            supports_vision,
            supports_tools,
            supports_streaming: true,
        }
    }
}

/// Static per-provider lookup from model name to capabilities.
#[derive(Debug)]
pub struct CapabilityTable {
    entries: &'static [(&'static str, ModelCapabilities)],
    fallback: ModelCapabilities,
}

impl CapabilityTable {
    pub const fn new(
        entries: &'static [(&'static str, ModelCapabilities)],
        fallback: ModelCapabilities,
    ) -> Self {
        CapabilityTable { entries, fallback }
    }

    /// Exact match, then the longest known prefix (so `llava:13b` finds
    /// `llava`), then the provider fallback.
    pub fn get(&self, model: &str) -> ModelCapabilities {
        self.lookup(model).unwrap_or(self.fallback)
    }

    pub fn lookup(&self, model: &str) -> Option<ModelCapabilities> {
        if let Some((_, caps)) = self.entries.iter().find(|(name, _)| *name == model) {
            return Some(*caps);
        }
        self.entries
            .iter()
            .filter(|(name, _)| model.starts_with(name))
            .max_by_key(|(name, _)| name.len())
            .map(|(_, caps)| *caps)
    }

    pub fn models(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|(name, _)| *name)
    }
}
