use basis_core::RecordId;

/// Session of the caller, resolved from the `session_id` cookie.
///
/// Present on every route behind the session middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    sid: String,
    uid: RecordId,
    login: String,
}

impl SessionContext {
    pub fn new(sid: impl Into<String>, uid: RecordId, login: impl Into<String>) -> Self {
        Self {
            sid: sid.into(),
            uid,
            login: login.into(),
        }
    }

    pub fn sid(&self) -> &str {
        &self.sid
    }

    pub fn uid(&self) -> RecordId {
        self.uid
    }

    pub fn login(&self) -> &str {
        &self.login
    }
}
