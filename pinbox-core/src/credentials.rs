use pinbox_shared::Masked;

use crate::supplier::ProviderKind;
use crate::{CoreError, CoreResult};

/// Provider credentials, parsed once when the provider record is loaded.
///
/// The tag protocol stores `username:password` inside the single key column;
/// the form-action protocol uses the key as-is.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderCredentials {
    ApiKey(Masked<String>),
    UserPass {
        username: String,
        password: Masked<String>,
    },
}

impl ProviderCredentials {
    pub fn parse(kind: ProviderKind, raw: &str) -> CoreResult<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(CoreError::ConfigurationError("provider credential is empty".to_string()));
        }

        match kind {
            ProviderKind::Tagged => {
                // Split on the first colon only; passwords may contain ':'
                let (username, password) = raw.split_once(':').ok_or_else(|| {
                    CoreError::ConfigurationError(
                        "tag provider credential must be in username:password form".to_string(),
                    )
                })?;

                if username.is_empty() || password.is_empty() {
                    return Err(CoreError::ConfigurationError(
                        "tag provider credential has an empty username or password".to_string(),
                    ));
                }

                Ok(ProviderCredentials::UserPass {
                    username: username.to_string(),
                    password: Masked(password.to_string()),
                })
            }
            ProviderKind::Panel => Ok(ProviderCredentials::ApiKey(Masked(raw.to_string()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compound_credential_split_once() {
        let creds = ProviderCredentials::parse(ProviderKind::Tagged, "dealer01:pa:ss").unwrap();
        match creds {
            ProviderCredentials::UserPass { username, password } => {
                assert_eq!(username, "dealer01");
                assert_eq!(password.expose(), "pa:ss");
            }
            other => panic!("unexpected credentials: {:?}", other),
        }
    }

    #[test]
    fn test_compound_credential_requires_both_parts() {
        assert!(ProviderCredentials::parse(ProviderKind::Tagged, "dealer01").is_err());
        assert!(ProviderCredentials::parse(ProviderKind::Tagged, ":secret").is_err());
        assert!(ProviderCredentials::parse(ProviderKind::Tagged, "dealer01:").is_err());
    }

    #[test]
    fn test_panel_key_is_opaque() {
        let creds = ProviderCredentials::parse(ProviderKind::Panel, " abc:def ").unwrap();
        assert_eq!(creds, ProviderCredentials::ApiKey(Masked("abc:def".to_string())));
        assert!(ProviderCredentials::parse(ProviderKind::Panel, "  ").is_err());
    }
}
