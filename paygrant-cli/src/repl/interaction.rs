//! Interaction reference prompt
//!
//! After a grant comes back pending, the human approves it at the redirect
//! URL and is sent on to the finish URI with `interact_ref` in the query.
//! They paste that URL (or just its query) here.

use paygrant_core::{InteractionSource, PendingGrant};
use rustyline::DefaultEditor;
use tracing::{info, warn};

const PROMPT: &str = "Enter URL... ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InteractionInput {
    /// Give up on the grant
    Exit,
    Ref(String),
}

/// Accept `exit`, or a URL or query string carrying `interact_ref`
pub fn parse_interaction_input(input: &str) -> Option<InteractionInput> {
    let input = input.trim();
    if input == "exit" {
        return Some(InteractionInput::Exit);
    }

    let query = match url::Url::parse(input) {
        Ok(url) => url.query().unwrap_or_default().to_string(),
        Err(_) => input.trim_start_matches('?').to_string(),
    };

    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "interact_ref")
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
        .map(InteractionInput::Ref)
}

/// Reads the interaction reference from the terminal
pub struct PromptInteraction<'a> {
    editor: &'a mut DefaultEditor,
}

impl<'a> PromptInteraction<'a> {
    pub fn new(editor: &'a mut DefaultEditor) -> Self {
        Self { editor }
    }
}

impl InteractionSource for PromptInteraction<'_> {
    fn interact_ref(&mut self, pending: &PendingGrant) -> Option<String> {
        match &pending.redirect {
            Some(redirect) => info!(
                redirect = %redirect,
                "Got pending grant. Navigate to the redirect URL to complete interaction."
            ),
            None => warn!("Got pending grant without a redirect URL"),
        }

        loop {
            let line = match self.editor.readline(PROMPT) {
                Ok(line) => line,
                Err(e) => {
                    warn!(error = %e, "Interaction prompt closed");
                    return None;
                }
            };

            match parse_interaction_input(&line) {
                Some(InteractionInput::Exit) => return None,
                Some(InteractionInput::Ref(interact_ref)) => return Some(interact_ref),
                None => println!("Paste the URL you were sent to (it contains interact_ref), or `exit`."),
            }
        }
    }
}
