//! OpenTelemetry GenAI Semantic Convention attribute constants.
//!
//! Field names follow the OTel GenAI conventions so spans emitted around
//! Completion Service calls line up with other GenAI tooling. A span declares
//! these fields empty, then fills them with `Span::record` under the names
//! below.

// --- Required attributes ---

/// The name of the operation being performed (e.g., "chat").
pub const GEN_AI_OPERATION_NAME: &str = "gen_ai.operation.name";

/// The name of the GenAI system behind the Completion Service.
pub const GEN_AI_SYSTEM: &str = "gen_ai.system";

// --- Recommended attributes ---

/// The model ID requested.
pub const GEN_AI_REQUEST_MODEL: &str = "gen_ai.request.model";

/// The sampling temperature for the request.
pub const GEN_AI_REQUEST_TEMPERATURE: &str = "gen_ai.request.temperature";

/// The maximum number of output tokens requested.
pub const GEN_AI_REQUEST_MAX_TOKENS: &str = "gen_ai.request.max_tokens";

/// The number of input tokens consumed.
pub const GEN_AI_USAGE_INPUT_TOKENS: &str = "gen_ai.usage.input_tokens";

/// The number of output tokens generated.
pub const GEN_AI_USAGE_OUTPUT_TOKENS: &str = "gen_ai.usage.output_tokens";

// --- Operation name values ---

/// Chat completion, used for every gated call.
pub const OP_CHAT: &str = "chat";

/// All attribute names, for exporters that want to allow-list them.
pub const ALL_ATTRIBUTES: [&str; 7] = [
    GEN_AI_OPERATION_NAME,
    GEN_AI_SYSTEM,
    GEN_AI_REQUEST_MODEL,
    GEN_AI_REQUEST_TEMPERATURE,
    GEN_AI_REQUEST_MAX_TOKENS,
    GEN_AI_USAGE_INPUT_TOKENS,
    GEN_AI_USAGE_OUTPUT_TOKENS,
];
