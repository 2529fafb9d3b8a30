//! Hand-written test doubles shared by unit tests across modules.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use chrono::{DateTime, Utc};

use crate::cache::{CacheError, UserCache};
use crate::mailer::{MailError, Mailer, Recipient, TemplateData};
use crate::model::{User, UserCredentials, seed_roles};
use crate::store::{BoxFuture, NewInvitation, NewUser, StoreError, UserRepository};
use crate::types::{TokenHash, UserId};

pub fn sample_user(username: &str, is_active: bool) -> User {
    User {
        id: UserId::new(format!("id-{}", username)),
        username: username.to_string(),
        email: format!("{}@example.com", username),
        is_active,
        role: seed_roles().remove(0),
        created_at: "2024-01-01T00:00:00Z".to_string(),
    }
}

#[derive(Default)]
struct UsersState {
    users: HashMap<UserId, (User, String)>,
    invitations: HashMap<TokenHash, (UserId, DateTime<Utc>)>,
}

/// In-memory [`UserRepository`] that counts `get_by_id` calls.
#[derive(Default)]
pub struct InMemoryUsers {
    state: Mutex<UsersState>,
    fetches: AtomicUsize,
    fail_deletes: AtomicBool,
    lose_create_reply: AtomicBool,
}

impl InMemoryUsers {
    pub fn insert(&self, user: User) {
        self.insert_with_password(user, String::new());
    }

    pub fn insert_with_password(&self, user: User, password_hash: String) {
        let mut state = self.state.lock().unwrap();
        state.users.insert(user.id.clone(), (user, password_hash));
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn user_count(&self) -> usize {
        self.state.lock().unwrap().users.len()
    }

    pub fn invitation_count(&self) -> usize {
        self.state.lock().unwrap().invitations.len()
    }

    pub fn find_by_email(&self, email: &str) -> Option<User> {
        let state = self.state.lock().unwrap();
        state
            .users
            .values()
            .find(|(u, _)| u.email == email)
            .map(|(u, _)| u.clone())
    }

    pub fn stored_hash(&self, id: &UserId) -> Option<String> {
        let state = self.state.lock().unwrap();
        state.users.get(id).map(|(_, h)| h.clone())
    }

    /// Make every subsequent `delete` fail.
    pub fn fail_deletes(&self) {
        self.fail_deletes.store(true, Ordering::SeqCst);
    }

    /// Commit the next creations but report them as timed out, as when the
    /// read-back after the transaction misses its deadline.
    pub fn lose_create_reply(&self) {
        self.lose_create_reply.store(true, Ordering::SeqCst);
    }
}

impl UserRepository for InMemoryUsers {
    fn create_with_invitation<'a>(
        &'a self,
        user: &'a NewUser,
        invitation: &'a NewInvitation,
    ) -> BoxFuture<'a, Result<User, StoreError>> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            if state.users.values().any(|(u, _)| u.email == user.email) {
                return Err(StoreError::DuplicateEmail);
            }
            if state.users.values().any(|(u, _)| u.username == user.username) {
                return Err(StoreError::DuplicateUsername);
            }

            let role = seed_roles()
                .into_iter()
                .find(|r| r.name == user.role)
                .ok_or(StoreError::NotFound)?;
            let created = User {
                id: user.id.clone(),
                username: user.username.clone(),
                email: user.email.clone(),
                is_active: false,
                role,
                created_at: Utc::now().to_rfc3339(),
            };
            state
                .users
                .insert(user.id.clone(), (created.clone(), user.password_hash.clone()));
            state.invitations.insert(
                invitation.token_hash.clone(),
                (user.id.clone(), invitation.expires_at),
            );
            if self.lose_create_reply.load(Ordering::SeqCst) {
                return Err(StoreError::Timeout);
            }
            Ok(created)
        })
    }

    fn get_by_id<'a>(&'a self, id: &'a UserId) -> BoxFuture<'a, Result<User, StoreError>> {
        Box::pin(async move {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let state = self.state.lock().unwrap();
            state
                .users
                .get(id)
                .map(|(u, _)| u.clone())
                .ok_or(StoreError::NotFound)
        })
    }

    fn get_credentials_by_email<'a>(
        &'a self,
        email: &'a str,
    ) -> BoxFuture<'a, Result<UserCredentials, StoreError>> {
        Box::pin(async move {
            let state = self.state.lock().unwrap();
            state
                .users
                .values()
                .find(|(u, _)| u.email == email && u.is_active)
                .map(|(u, h)| UserCredentials {
                    user: u.clone(),
                    password_hash: h.clone(),
                })
                .ok_or(StoreError::NotFound)
        })
    }

    fn activate<'a>(&'a self, token_hash: &'a TokenHash) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            let (user_id, expires_at) = state
                .invitations
                .get(token_hash)
                .cloned()
                .ok_or(StoreError::NotFound)?;
            if expires_at <= Utc::now() {
                return Err(StoreError::NotFound);
            }
            if let Some((user, _)) = state.users.get_mut(&user_id) {
                user.is_active = true;
            }
            state.invitations.retain(|_, (owner, _)| *owner != user_id);
            Ok(())
        })
    }

    fn delete<'a>(&'a self, id: &'a UserId) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            if self.fail_deletes.load(Ordering::SeqCst) {
                return Err(StoreError::Database("delete refused".to_string()));
            }
            let mut state = self.state.lock().unwrap();
            state.users.remove(id);
            state.invitations.retain(|_, (owner, _)| owner != id);
            Ok(())
        })
    }
}

/// Cache whose reads and writes always fail.
pub struct FailingCache {
    error: CacheError,
    sets: AtomicUsize,
}

impl FailingCache {
    pub fn new(error: CacheError) -> Self {
        Self {
            error,
            sets: AtomicUsize::new(0),
        }
    }

    pub fn set_attempts(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }
}

impl UserCache for FailingCache {
    fn get<'a>(&'a self, _id: &'a UserId) -> BoxFuture<'a, Result<Option<User>, CacheError>> {
        Box::pin(async move { Err(self.error.clone()) })
    }

    fn set<'a>(&'a self, _user: &'a User) -> BoxFuture<'a, Result<(), CacheError>> {
        Box::pin(async move {
            self.sets.fetch_add(1, Ordering::SeqCst);
            Err(self.error.clone())
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub template: String,
    pub recipient: Recipient,
    pub data: TemplateData,
}

/// Mailer replaying a script of outcomes; the last outcome repeats once the
/// script runs out.
pub struct ScriptedMailer {
    script: Mutex<Vec<Result<(), MailError>>>,
    sent: Mutex<Vec<SentMessage>>,
}

impl ScriptedMailer {
    pub fn new(script: Vec<Result<(), MailError>>) -> Self {
        let mut script = script;
        script.reverse();
        Self {
            script: Mutex::new(script),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn succeeding() -> Self {
        Self::new(vec![Ok(())])
    }

    pub fn attempts(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }
}

impl Mailer for ScriptedMailer {
    fn send<'a>(
        &'a self,
        template: &'a str,
        recipient: &'a Recipient,
        data: &'a TemplateData,
    ) -> BoxFuture<'a, Result<(), MailError>> {
        Box::pin(async move {
            self.sent.lock().unwrap().push(SentMessage {
                template: template.to_string(),
                recipient: recipient.clone(),
                data: data.clone(),
            });

            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.pop().unwrap_or(Ok(()))
            } else {
                script.last().cloned().unwrap_or(Ok(()))
            }
        })
    }
}
