use super::Username;

/// Identity of one signaled voice call. The id is minted by the server and
/// opaque to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallInfo {
    pub call_id: String,
    pub caller: Username,
    pub receiver: Username,
}

impl CallInfo {
    /// The remote party, from the point of view of `local_user`.
    pub fn other_party(&self, local_user: &str) -> &str {
        if self.caller == local_user {
            &self.receiver
        } else {
            &self.caller
        }
    }
}
