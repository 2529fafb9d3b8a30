//! SurrealQL table, field and index definitions.
//!
//! Index names double as error discriminators: a unique-index violation
//! reported by the engine names the index, which is how the store tells a
//! duplicate email from a duplicate username.

pub const USER_EMAIL_INDEX: &str = "user_email_unique";
pub const USER_USERNAME_INDEX: &str = "user_username_unique";
pub const INVITATION_PRINCIPAL_INDEX: &str = "invitation_principal_unique";
pub const FOLLOW_PAIR_INDEX: &str = "follower_pair_unique";

pub const SCHEMA: &[&str] = &[
    // Roles (seeded reference data)
    "DEFINE TABLE IF NOT EXISTS role SCHEMAFULL;
     DEFINE FIELD IF NOT EXISTS name ON TABLE role TYPE string;
     DEFINE FIELD IF NOT EXISTS description ON TABLE role TYPE string;
     DEFINE FIELD IF NOT EXISTS level ON TABLE role TYPE int;
     DEFINE INDEX IF NOT EXISTS role_name_unique ON TABLE role COLUMNS name UNIQUE;",

    // Principals
    "DEFINE TABLE IF NOT EXISTS user SCHEMAFULL;
     DEFINE FIELD IF NOT EXISTS username ON TABLE user TYPE string;
     DEFINE FIELD IF NOT EXISTS email ON TABLE user TYPE string;
     DEFINE FIELD IF NOT EXISTS password_hash ON TABLE user TYPE string;
     DEFINE FIELD IF NOT EXISTS is_active ON TABLE user TYPE bool DEFAULT false;
     DEFINE FIELD IF NOT EXISTS role ON TABLE user TYPE record<role>;
     DEFINE FIELD IF NOT EXISTS created_at ON TABLE user TYPE datetime DEFAULT time::now();
     DEFINE INDEX IF NOT EXISTS user_email_unique ON TABLE user COLUMNS email UNIQUE;
     DEFINE INDEX IF NOT EXISTS user_username_unique ON TABLE user COLUMNS username UNIQUE;",

    // One-time activation invitations
    "DEFINE TABLE IF NOT EXISTS invitation SCHEMAFULL;
     DEFINE FIELD IF NOT EXISTS token_hash ON TABLE invitation TYPE string;
     DEFINE FIELD IF NOT EXISTS principal ON TABLE invitation TYPE record<user>;
     DEFINE FIELD IF NOT EXISTS expires_at ON TABLE invitation TYPE datetime;
     DEFINE INDEX IF NOT EXISTS invitation_token_hash ON TABLE invitation COLUMNS token_hash;
     DEFINE INDEX IF NOT EXISTS invitation_principal_unique ON TABLE invitation COLUMNS principal UNIQUE;",

    // Posts
    "DEFINE TABLE IF NOT EXISTS post SCHEMAFULL;
     DEFINE FIELD IF NOT EXISTS title ON TABLE post TYPE string;
     DEFINE FIELD IF NOT EXISTS content ON TABLE post TYPE string;
     DEFINE FIELD IF NOT EXISTS owner ON TABLE post TYPE record<user>;
     DEFINE FIELD IF NOT EXISTS tags ON TABLE post TYPE array<string> DEFAULT [];
     DEFINE FIELD IF NOT EXISTS created_at ON TABLE post TYPE datetime DEFAULT time::now();
     DEFINE FIELD IF NOT EXISTS updated_at ON TABLE post TYPE datetime VALUE time::now();
     DEFINE INDEX IF NOT EXISTS post_owner ON TABLE post COLUMNS owner;",

    // Comments
    "DEFINE TABLE IF NOT EXISTS comment SCHEMAFULL;
     DEFINE FIELD IF NOT EXISTS post ON TABLE comment TYPE record<post>;
     DEFINE FIELD IF NOT EXISTS author ON TABLE comment TYPE record<user>;
     DEFINE FIELD IF NOT EXISTS content ON TABLE comment TYPE string;
     DEFINE FIELD IF NOT EXISTS created_at ON TABLE comment TYPE datetime DEFAULT time::now();
     DEFINE INDEX IF NOT EXISTS comment_post ON TABLE comment COLUMNS post;",

    // Follow edges: `follower` follows `followee`
    "DEFINE TABLE IF NOT EXISTS follower SCHEMAFULL;
     DEFINE FIELD IF NOT EXISTS followee ON TABLE follower TYPE record<user>;
     DEFINE FIELD IF NOT EXISTS follower ON TABLE follower TYPE record<user>;
     DEFINE FIELD IF NOT EXISTS created_at ON TABLE follower TYPE datetime DEFAULT time::now();
     DEFINE INDEX IF NOT EXISTS follower_pair_unique ON TABLE follower COLUMNS followee, follower UNIQUE;",
];
