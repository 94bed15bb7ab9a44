//! Chat gateway — runs one chat request end to end.
//!
//! 1. Fetch or create the session and take its lock
//! 2. Compose the prompt (mode decision + history window)
//! 3. Call the LLM provider
//! 4. Interpret the raw reply
//! 5. Commit mode, files and both turns to the session
//!
//! The session is only written in step 5, so a failed provider call leaves
//! it exactly as it was.

use tracing::{debug, info, warn};

use crate::bus::SessionEvent;
use crate::composer::{Composer, Composition};
use crate::config::RahlConfig;
use crate::error::{RahlError, Result};
use crate::interpret::{interpret, Interpretation};
use crate::message::{ChatInput, Role};
use crate::provider::{LlmProvider, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE};
use crate::session::{Session, SessionStore};

/// Configuration for the gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Prior turns forwarded with each message.
    pub history_window: usize,
    /// Max tokens per response.
    pub max_tokens: u32,
    /// Temperature for generation.
    pub temperature: f32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            history_window: 6,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

impl GatewayConfig {
    pub fn from_config(config: &RahlConfig) -> Self {
        Self {
            history_window: config.gateway.history_window,
            max_tokens: config.provider.max_tokens,
            temperature: config.provider.temperature,
        }
    }
}

/// The gateway — ties together the session store, composer and a provider.
pub struct ChatGateway {
    config: GatewayConfig,
    composer: Composer,
    sessions: SessionStore,
}

impl ChatGateway {
    pub fn new(config: GatewayConfig, sessions: SessionStore) -> Self {
        Self {
            composer: Composer::new(config.history_window),
            config,
            sessions,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Handle one chat message.
    ///
    /// Requests for the same session id are processed one at a time; the
    /// session lock is held across the provider call.
    pub async fn process(
        &self,
        provider: &dyn LlmProvider,
        input: &ChatInput,
    ) -> Result<Interpretation> {
        validate(input)?;

        let handle = self.sessions.get_or_create(&input.session_id);
        let mut session = handle.lock().await;

        let composition = self.composer.compose(&session, &input.message);

        debug!(
            "Session {}: composed {} turn(s), coding={}",
            input.session_id,
            composition.prompt.turns.len(),
            composition.mode.is_coding()
        );

        let request = composition
            .prompt
            .clone()
            .into_request(self.config.max_tokens, self.config.temperature);

        let response = match provider.chat(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(
                    "Session {}: {} call failed: {}",
                    input.session_id,
                    provider.name(),
                    e
                );
                return Err(e);
            }
        };

        let Some(raw) = response.content else {
            warn!(
                "Session {}: {} returned no content (finish reason: {})",
                input.session_id,
                provider.name(),
                response.finish_reason
            );
            return Err(RahlError::Provider(format!(
                "empty reply (finish reason: {})",
                response.finish_reason
            )));
        };
        let interpretation = interpret(&composition.mode, &raw);

        if interpretation.fell_back {
            warn!(
                "Session {}: coding reply was not valid JSON, showing it as text",
                input.session_id
            );
        }

        self.commit(&mut session, composition, &input.message, &raw, &interpretation);

        info!(
            "Session {}: replied with {} chars (model {}, {} tokens)",
            input.session_id,
            raw.len(),
            response.model,
            response.usage.total_tokens
        );

        Ok(interpretation)
    }

    fn commit(
        &self,
        session: &mut Session,
        composition: Composition,
        message: &str,
        raw: &str,
        interpretation: &Interpretation,
    ) {
        if composition.changes_mode(session) {
            let event = SessionEvent::ModeChanged {
                session_id: session.id().to_string(),
                coding: composition.mode.is_coding(),
                project: composition.mode.project().to_string(),
            };
            info!("{}", event);
            self.sessions.bus().publish(event);
        }
        session.set_mode(composition.mode);

        if !interpretation.reply.files.is_empty() {
            session.merge_files(interpretation.reply.files.clone());
        }

        session.append_turn(Role::User, message);
        session.append_turn(Role::Assistant, raw);
    }
}

fn validate(input: &ChatInput) -> Result<()> {
    if input.session_id.trim().is_empty() {
        return Err(RahlError::InvalidInput("session id is required".into()));
    }
    if input.message.trim().is_empty() {
        return Err(RahlError::InvalidInput("message is required".into()));
    }
    Ok(())
}
