use crate::model::{Post, Role, User};

/// The owner may always mutate their post; anyone else needs a role at
/// least as privileged as `required`.
pub fn authorize_post_mutation(user: &User, post: &Post, required: &Role) -> bool {
    post.user_id == user.id || user.role.satisfies(required)
}
