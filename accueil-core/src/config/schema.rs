//! Configuration schema definitions

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Root configuration for accueil
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Generation backend configuration
    #[serde(default)]
    pub backend: BackendConfig,
    /// Session store configuration
    #[serde(default)]
    pub sessions: SessionsConfig,
    /// Dialog (prompt and fallback) configuration
    #[serde(default)]
    pub dialog: DialogConfig,
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
    /// Directory for log files
    #[serde(default = "default_log_dir")]
    pub dir: String,
    /// Module-specific overrides
    #[serde(default)]
    pub overrides: HashMap<String, String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            dir: default_log_dir(),
            overrides: HashMap::new(),
        }
    }
}

/// Wire dialect spoken by the generation backend.
///
/// The variant is chosen once, when the backend client is built; it cannot
/// change per call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum BackendConfig {
    /// OpenAI-style `/v1/chat/completions` endpoint (FastChat, vLLM, ...)
    ChatProtocol(ChatProtocolConfig),
    /// Single-prompt `/generate` endpoint (text-generation-inference)
    CompletionProtocol(CompletionProtocolConfig),
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::ChatProtocol(ChatProtocolConfig::default())
    }
}

impl BackendConfig {
    /// Tag value as written in the configuration file
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ChatProtocol(_) => "chat-protocol",
            Self::CompletionProtocol(_) => "completion-protocol",
        }
    }

    pub fn endpoint(&self) -> &str {
        match self {
            Self::ChatProtocol(c) => &c.endpoint,
            Self::CompletionProtocol(c) => &c.endpoint,
        }
    }

    pub fn model(&self) -> &str {
        match self {
            Self::ChatProtocol(c) => &c.model,
            Self::CompletionProtocol(c) => &c.model,
        }
    }

    pub fn timeout_ms(&self) -> u64 {
        match self {
            Self::ChatProtocol(c) => c.timeout_ms,
            Self::CompletionProtocol(c) => c.timeout_ms,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms())
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        match self {
            Self::ChatProtocol(c) => &c.headers,
            Self::CompletionProtocol(c) => &c.headers,
        }
    }
}

/// Fields of the chat-protocol variant
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatProtocolConfig {
    /// Base URL of the service, e.g. `http://localhost:8000`
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Model identifier sent with each request
    #[serde(default)]
    pub model: String,
    /// Hard bound on one request, in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Extra headers (API keys, ...)
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Request path appended to the endpoint
    #[serde(default = "default_chat_path")]
    pub path: String,
}

impl Default for ChatProtocolConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: String::new(),
            timeout_ms: default_timeout_ms(),
            headers: HashMap::new(),
            path: default_chat_path(),
        }
    }
}

/// Fields of the completion-protocol variant
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionProtocolConfig {
    /// Base URL of the service, e.g. `http://localhost:8080`
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Model identifier, sent only when non-empty
    #[serde(default)]
    pub model: String,
    /// Hard bound on one request, in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Extra headers (API keys, ...)
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Request path appended to the endpoint
    #[serde(default = "default_completion_path")]
    pub path: String,
    /// Generation length cap
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: u32,
    /// Sampling temperature
    #[serde(default = "default_completion_temperature")]
    pub temperature: f32,
}

impl Default for CompletionProtocolConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: String::new(),
            timeout_ms: default_timeout_ms(),
            headers: HashMap::new(),
            path: default_completion_path(),
            max_new_tokens: default_max_new_tokens(),
            temperature: default_completion_temperature(),
        }
    }
}

fn default_endpoint() -> String {
    "http://localhost:8000".to_string()
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_chat_path() -> String {
    "/v1/chat/completions".to_string()
}

fn default_completion_path() -> String {
    "/generate".to_string()
}

fn default_max_new_tokens() -> u32 {
    512
}

fn default_completion_temperature() -> f32 {
    0.2
}

/// What the store does when asked for an id it has never seen
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionPolicy {
    /// Create an empty session on first access
    #[default]
    Permissive,
    /// Reject unknown ids with `Error::UnknownSession`
    Strict,
}

/// Session store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Maximum number of messages kept per session
    #[serde(default = "default_max_history")]
    pub max_history: usize,
    /// Idle time after which a session may be swept
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    /// How often the server triggers a sweep
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Unknown-id handling
    #[serde(default)]
    pub policy: SessionPolicy,
}

fn default_max_history() -> usize {
    20
}

fn default_ttl_secs() -> u64 {
    3600
}

fn default_sweep_interval_secs() -> u64 {
    60
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            max_history: default_max_history(),
            ttl_secs: default_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            policy: SessionPolicy::default(),
        }
    }
}

pub const DEFAULT_SYSTEM_PROMPT: &str = "Tu es un assistant conversationnel pour un robot d'accueil de salle multisports. \
Tu dois répondre de façon polie, concise et utile. Tu peux proposer d'aider pour : \
informations (horaires, tarifs, activités), orientation (guidage vers vestiaires/salles), \
inscriptions et réservations. Si l'utilisateur demande une réservation, \
demande toujours l'activité et le créneau si manquants. Fournis des réponses adaptées en français. \
Ne fournis pas d'informations personnelles sensibles. Si tu ne comprends pas, demande une clarification.";

pub const DEFAULT_GENERIC_APOLOGY: &str =
    "Désolé, le système de dialogue n'est pas disponible pour le moment. Pouvez-vous reformuler ?";

/// Dialog configuration: prompt, fallback table, randomness
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogConfig {
    /// System prompt sent with every backend call
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    /// Reply used when no fallback template applies
    #[serde(default = "default_generic_apology")]
    pub generic_apology: String,
    /// Intent -> template variants used when the backend is unusable
    #[serde(default = "default_fallback_rules")]
    pub fallback: BTreeMap<String, Vec<String>>,
    /// Seed for template selection; entropy when unset
    #[serde(default)]
    pub rng_seed: Option<u64>,
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

fn default_generic_apology() -> String {
    DEFAULT_GENERIC_APOLOGY.to_string()
}

fn default_fallback_rules() -> BTreeMap<String, Vec<String>> {
    let mut rules = BTreeMap::new();
    rules.insert(
        "greeting".to_string(),
        vec![
            "Bonjour ! Je peux vous aider pour les horaires, les inscriptions, les réservations ou pour vous orienter. Que souhaitez-vous ?".to_string(),
            "Salut ! Comment puis-je vous aider aujourd'hui ?".to_string(),
            "Bonjour ! En quoi puis-je vous être utile pour votre visite à la salle multisports ?".to_string(),
        ],
    );
    rules.insert(
        "ask_hours".to_string(),
        vec!["La salle est ouverte du lundi au vendredi de 8h à 22h, et le weekend de 9h à 18h.".to_string()],
    );
    rules.insert(
        "ask_activities".to_string(),
        vec!["Nous proposons fitness, basket, natation, tennis, futsal et yoga. Laquelle vous intéresse ?".to_string()],
    );
    rules.insert(
        "book_activity".to_string(),
        vec!["Je note votre demande de réservation pour {activity} à {time}.".to_string()],
    );
    rules
}

impl Default for DialogConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            generic_apology: default_generic_apology(),
            fallback: default_fallback_rules(),
            rng_seed: None,
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_host")]
    pub host: String,
    /// Bind port
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}
