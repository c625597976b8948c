//! Addressing of client requests.

/// Where a client request goes, derived from its name.
///
/// Names containing `/` are split at the first `/` into adapter name and
/// adapter request name. Bare names are connection-level requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestTarget {
    Login,
    Logout,
    Adapter { adapter: String, request: String },
    Unsupported(String),
}

impl RequestTarget {
    pub fn parse(name: &str) -> Self {
        if let Some((adapter, request)) = name.split_once('/') {
            return RequestTarget::Adapter {
                adapter: adapter.to_string(),
                request: request.to_string(),
            };
        }

        match name {
            "login" => RequestTarget::Login,
            "logout" => RequestTarget::Logout,
            other => RequestTarget::Unsupported(other.to_string()),
        }
    }
}
