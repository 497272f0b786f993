use uuid::Uuid;

pub const SESSION_COOKIE_NAME: &str = "chargerecorder_session";
pub const SESSION_COOKIE_MAX_AGE_SECS: i64 = 86_400;

pub trait CredentialVerifier {
    fn verify(&self, credential: Option<&str>) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnlockOutcome {
    NotRequired,
    Unlocked { session_token: String },
    Rejected,
}

/// Single shared-secret gate. A successful unlock hands out a token that is
/// random per process, so the passphrase itself never travels in a cookie.
#[derive(Clone)]
pub struct PassphraseGate {
    passphrase: Option<String>,
    session_token: String,
}

impl PassphraseGate {
    pub fn new(passphrase: Option<String>) -> Self {
        Self {
            passphrase: passphrase.filter(|value| !value.is_empty()),
            session_token: Uuid::new_v4().simple().to_string(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.passphrase.is_some()
    }

    pub fn unlock(&self, phrase: &str) -> UnlockOutcome {
        match &self.passphrase {
            None => UnlockOutcome::NotRequired,
            Some(expected) if secrets_match(expected, phrase) => UnlockOutcome::Unlocked {
                session_token: self.session_token.clone(),
            },
            Some(_) => UnlockOutcome::Rejected,
        }
    }
}

impl std::fmt::Debug for PassphraseGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassphraseGate")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl CredentialVerifier for PassphraseGate {
    fn verify(&self, credential: Option<&str>) -> bool {
        if self.passphrase.is_none() {
            return true;
        }
        credential.is_some_and(|value| secrets_match(value, &self.session_token))
    }
}

/// Compares every byte regardless of where the first mismatch is.
fn secrets_match(left: &str, right: &str) -> bool {
    let (left, right) = (left.as_bytes(), right.as_bytes());
    if left.len() != right.len() {
        return false;
    }

    left.iter()
        .zip(right)
        .fold(0u8, |diff, (a, b)| diff | (a ^ b))
        == 0
}
