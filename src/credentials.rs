//! Credential prompt boundary used by the login flow.

use std::sync::Mutex;

/// Answer from a credential prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialResponse {
    Provided { username: String, password: String },
    /// Nothing stored and nothing entered; the caller may ask again.
    Missing,
    /// The user dismissed the prompt.
    Cancelled,
}

/// Service asked for login credentials. Called on the session worker.
pub trait CredentialPrompt: Send + Sync {
    /// `reason` is set when a previous attempt failed.
    fn request(&self, title: &str, reason: Option<&str>, force_prompt: bool) -> CredentialResponse;
}

/// Prompt that answers from fixed credentials, or cancels when none are set.
#[derive(Debug, Default)]
pub struct StaticCredentials {
    credentials: Option<(String, String)>,
    requests: Mutex<Vec<Option<String>>>,
}

impl StaticCredentials {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            credentials: Some((username.to_string(), password.to_string())),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn cancelling() -> Self {
        Self::default()
    }

    /// Failure reasons passed to each request so far.
    pub fn requested_reasons(&self) -> Vec<Option<String>> {
        self.requests
            .lock()
            .expect("credential request log lock poisoned")
            .clone()
    }
}

impl CredentialPrompt for StaticCredentials {
    fn request(
        &self,
        _title: &str,
        reason: Option<&str>,
        force_prompt: bool,
    ) -> CredentialResponse {
        let mut requests = self
            .requests
            .lock()
            .expect("credential request log lock poisoned");
        requests.push(reason.map(str::to_string));
        match &self.credentials {
            // A repeated forced prompt after a failure would loop forever on
            // the same wrong answer.
            Some(_) if force_prompt && requests.len() > 2 => CredentialResponse::Cancelled,
            Some((username, password)) => CredentialResponse::Provided {
                username: username.clone(),
                password: password.clone(),
            },
            None => CredentialResponse::Cancelled,
        }
    }
}
