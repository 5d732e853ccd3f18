use crate::error::{Result, StreamError};

/// A parsed `user@host:port` CLI argument, plus the deterministic control
/// socket path derived from it.
#[derive(Debug, Clone)]
pub struct TargetSpec {
    pub user: String,
    pub host: String,
    pub port: u16,
    pub socket_path: String,
}

impl TargetSpec {
    /// Parse `user@host:port`. Both `@` and `:` are required; anything else
    /// is an `InvalidTarget` before any network activity happens.
    pub fn parse(raw: &str) -> Result<Self> {
        let (user, rest) = raw
            .split_once('@')
            .ok_or_else(|| StreamError::InvalidTarget(raw.to_string()))?;
        let (host, port) = rest
            .rsplit_once(':')
            .ok_or_else(|| StreamError::InvalidTarget(raw.to_string()))?;

        if user.is_empty() || host.is_empty() {
            return Err(StreamError::InvalidTarget(raw.to_string()));
        }

        let port: u16 = port
            .parse()
            .map_err(|_| StreamError::InvalidTarget(raw.to_string()))?;

        let socket_path = format!("/tmp/sshx_mux_{}_{}_{}", user, host, port);

        Ok(TargetSpec {
            user: user.to_string(),
            host: host.to_string(),
            port,
            socket_path,
        })
    }

    pub fn user_host(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_target() {
        let t = TargetSpec::parse("alice@example.com:2222").unwrap();
        assert_eq!(t.user, "alice");
        assert_eq!(t.host, "example.com");
        assert_eq!(t.port, 2222);
        assert_eq!(t.socket_path, "/tmp/sshx_mux_alice_example.com_2222");
    }

    #[test]
    fn rejects_missing_at() {
        assert!(matches!(
            TargetSpec::parse("examplecom:22"),
            Err(StreamError::InvalidTarget(_))
        ));
    }

    #[test]
    fn rejects_missing_colon() {
        assert!(matches!(
            TargetSpec::parse("alice@example.com"),
            Err(StreamError::InvalidTarget(_))
        ));
    }

    #[test]
    fn rejects_non_numeric_port() {
        assert!(matches!(
            TargetSpec::parse("alice@example.com:ssh"),
            Err(StreamError::InvalidTarget(_))
        ));
    }

    #[test]
    fn rejects_empty_user() {
        assert!(matches!(
            TargetSpec::parse("@example.com:22"),
            Err(StreamError::InvalidTarget(_))
        ));
    }
}
