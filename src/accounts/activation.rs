use tracing::{debug, info};

use super::AccountError;
use crate::store::{StoreError, UserRepository};
use crate::types::TokenHash;

/// Consume a one-time token. Unknown, consumed and expired tokens all
/// surface as `Store(NotFound)`.
pub async fn activate_invitation(users: &dyn UserRepository, token: &str) -> Result<(), AccountError> {
    let token_hash = TokenHash::of(token);
    match users.activate(&token_hash).await {
        Ok(()) => {
            info!("activated user from invitation");
            Ok(())
        }
        Err(StoreError::NotFound) => {
            debug!("activation token did not match a live invitation");
            Err(StoreError::NotFound.into())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};

    use super::*;
    use crate::accounts::{Accounts, RegistrationRequest};
    use crate::mailer::MailConfig;
    use crate::store::{NewInvitation, NewUser};
    use crate::testing::{InMemoryUsers, ScriptedMailer};
    use crate::types::UserId;

    async fn pending(users: &InMemoryUsers, name: &str, token: &str, ttl: Duration) -> UserId {
        let id = UserId::new(format!("id-{}", name));
        users
            .create_with_invitation(
                &NewUser {
                    id: id.clone(),
                    username: name.to_string(),
                    email: format!("{}@example.com", name),
                    password_hash: String::new(),
                    role: "user".to_string(),
                },
                &NewInvitation {
                    token_hash: TokenHash::of(token),
                    expires_at: Utc::now() + ttl,
                },
            )
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    async fn test_activate_then_reuse() {
        let users = InMemoryUsers::default();
        let id = pending(&users, "alice", "tok-a", Duration::hours(1)).await;

        activate_invitation(&users, "tok-a").await.unwrap();
        assert!(users.get_by_id(&id).await.unwrap().is_active);
        assert_eq!(users.invitation_count(), 0);

        let err = activate_invitation(&users, "tok-a").await.unwrap_err();
        assert_eq!(err, AccountError::Store(StoreError::NotFound));
    }

    #[tokio::test]
    async fn test_expired_and_unknown_are_not_found() {
        let users = InMemoryUsers::default();
        let id = pending(&users, "bob", "tok-b", Duration::seconds(-1)).await;

        for token in ["tok-b", "never-issued"] {
            let err = activate_invitation(&users, token).await.unwrap_err();
            assert_eq!(err, AccountError::Store(StoreError::NotFound));
        }
        assert!(!users.get_by_id(&id).await.unwrap().is_active);
    }

    #[tokio::test]
    async fn test_register_then_activate_through_service() {
        let users = Arc::new(InMemoryUsers::default());
        let mailer = Arc::new(ScriptedMailer::succeeding());
        let accounts = Arc::new(Accounts::new(users.clone(), mailer, &MailConfig::default()));

        let registration = accounts
            .register(RegistrationRequest {
                username: "carol".to_string(),
                email: "carol@example.com".to_string(),
                password: "long enough".to_string(),
            })
            .await
            .unwrap();

        accounts.activate(&registration.token).await.unwrap();
        assert!(users.get_by_id(&registration.user.id).await.unwrap().is_active);
        assert!(accounts.activate(&registration.token).await.is_err());
    }

    #[tokio::test]
    async fn test_activation_commits_after_caller_is_dropped() {
        let users = Arc::new(InMemoryUsers::default());
        let id = pending(&users, "dora", "tok-d", Duration::hours(1)).await;
        let mailer = Arc::new(ScriptedMailer::succeeding());
        let accounts = Arc::new(Accounts::new(users.clone(), mailer, &MailConfig::default()));

        // One poll spawns the workflow; the caller is then dropped
        tokio::select! {
            biased;
            _ = accounts.activate("tok-d") => panic!("activation finished within a single poll"),
            _ = std::future::ready(()) => {}
        }

        for _ in 0..10 {
            if users.invitation_count() == 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(users.get_by_id(&id).await.unwrap().is_active);
        assert_eq!(users.invitation_count(), 0);
    }
}
