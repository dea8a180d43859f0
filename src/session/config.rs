use serde::{Deserialize, Serialize};

/// Everything the transport needs to reach a host, optionally through a
/// bastion. Secrets are never serialized.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionDescriptor {
    pub id: String,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    #[serde(default, skip_serializing)]
    pub key_passphrase: Option<String>,
    pub auth_method: AuthMethod,
    #[serde(default)]
    pub jump_host: Option<JumpHost>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum AuthMethod {
    Password,
    PrivateKey {
        path: String,
        #[serde(default)]
        key_id: Option<String>,
    },
    Agent,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JumpHost {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth_method: AuthMethod,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
}

impl SessionDescriptor {
    pub fn new(name: String, host: String, port: u16, username: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            host,
            port,
            username,
            password: None,
            key_passphrase: None,
            auth_method: AuthMethod::PrivateKey {
                path: String::from("~/.ssh/id_rsa"),
                key_id: None,
            },
            jump_host: None,
        }
    }

    pub fn with_jump_host(mut self, jump_host: JumpHost) -> Self {
        self.jump_host = Some(jump_host);
        self
    }

    pub fn connection_string(&self) -> String {
        let target = format!("{}@{}:{}", self.username, self.host, self.port);
        match &self.jump_host {
            Some(jump) => format!("{} via {}@{}:{}", target, jump.username, jump.host, jump.port),
            None => target,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_string_mentions_bastion() {
        let descriptor = SessionDescriptor::new(
            "db".to_string(),
            "10.0.0.5".to_string(),
            22,
            "deploy".to_string(),
        )
        .with_jump_host(JumpHost {
            host: "bastion.example.com".to_string(),
            port: 2222,
            username: "ops".to_string(),
            auth_method: AuthMethod::Agent,
            password: None,
        });

        assert_eq!(
            descriptor.connection_string(),
            "deploy@10.0.0.5:22 via ops@bastion.example.com:2222"
        );
    }

    #[test]
    fn secrets_are_not_serialized() {
        let mut descriptor = SessionDescriptor::new(
            "web".to_string(),
            "web.example.com".to_string(),
            22,
            "root".to_string(),
        );
        descriptor.auth_method = AuthMethod::Password;
        descriptor.password = Some("hunter2".to_string());

        let json = serde_json::to_string(&descriptor).expect("serialize descriptor");
        assert!(!json.contains("hunter2"));

        let back: SessionDescriptor = serde_json::from_str(&json).expect("deserialize descriptor");
        assert_eq!(back.password, None);
        assert_eq!(back.auth_method, AuthMethod::Password);
    }
}
