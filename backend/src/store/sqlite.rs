use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHasher, SaltString};
use argon2::Argon2;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension, Row};
use sha2::{Digest, Sha256};
use usergate_common::{
    AccessToken, Page, PurchaseCode, Relation, RelationSet, Role, SocialProfile, User,
    UserAttributes, UserId, UserWithRelations,
};

use super::{StoreError, UserQuery, UserRepository};

const SCHEMA: &str = "
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        email TEXT NOT NULL UNIQUE COLLATE NOCASE,
        first_name TEXT,
        last_name TEXT,
        password TEXT,
        api_token TEXT,
        is_admin INTEGER NOT NULL DEFAULT 0,
        oidc_subject TEXT UNIQUE,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS roles (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        is_default INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS user_role (
        user_id INTEGER NOT NULL REFERENCES users(id),
        role_id INTEGER NOT NULL REFERENCES roles(id),
        PRIMARY KEY (user_id, role_id)
    );

    CREATE TABLE IF NOT EXISTS social_profiles (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES users(id),
        service_name TEXT NOT NULL,
        user_service_id TEXT NOT NULL,
        username TEXT,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS purchase_codes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES users(id),
        code TEXT NOT NULL,
        item_name TEXT NOT NULL,
        item_id TEXT NOT NULL,
        supported_until TEXT,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS personal_access_tokens (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES users(id),
        name TEXT NOT NULL,
        token TEXT NOT NULL UNIQUE,
        last_used_at TEXT,
        created_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_user_role_role_id ON user_role(role_id);
    CREATE INDEX IF NOT EXISTS idx_social_profiles_user_id ON social_profiles(user_id);
    CREATE INDEX IF NOT EXISTS idx_purchase_codes_user_id ON purchase_codes(user_id);
    CREATE INDEX IF NOT EXISTS idx_access_tokens_user_id ON personal_access_tokens(user_id);

    INSERT OR IGNORE INTO roles (name, is_default) VALUES ('users', 1);
";

const USER_COLUMNS: &str =
    "id, email, first_name, last_name, password, api_token, is_admin, created_at, updated_at";

/// Tables holding rows owned by a user, cleared before the user row itself.
const DEPENDENT_TABLES: [&str; 4] = [
    "user_role",
    "social_profiles",
    "purchase_codes",
    "personal_access_tokens",
];

/// SQLite-backed user repository.
pub struct SqliteUserRepository {
    conn: Mutex<Connection>,
}

impl SqliteUserRepository {
    /// Open (or create) the database at `database_url` and ensure the schema.
    pub fn open(database_url: &str) -> Result<Self, StoreError> {
        let path = database_url.strip_prefix("sqlite:").unwrap_or(database_url);

        let conn = if path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            if let Some(parent) = Path::new(path).parent() {
                std::fs::create_dir_all(parent).map_err(|e| StoreError::Io(e.to_string()))?;
            }
            Connection::open(path)?
        };

        conn.execute_batch(SCHEMA)?;

        tracing::info!("User store initialized with database: {}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    pub fn create_role(&self, name: &str, is_default: bool) -> Result<Role, StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO roles (name, is_default) VALUES (?1, ?2)",
            params![name, is_default],
        )?;

        Ok(Role {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
            is_default,
        })
    }

    pub fn promote_to_admin(&self, user_id: UserId) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE users SET is_admin = 1, updated_at = ?1 WHERE id = ?2",
            params![timestamp_now(), user_id],
        )?;
        Ok(())
    }

    pub fn attach_social_profile(
        &self,
        user_id: UserId,
        service_name: &str,
        user_service_id: &str,
        username: Option<&str>,
    ) -> Result<SocialProfile, StoreError> {
        let conn = self.lock()?;
        let now = Utc::now();
        conn.execute(
            "INSERT INTO social_profiles (user_id, service_name, user_service_id, username, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![user_id, service_name, user_service_id, username, format_timestamp(&now)],
        )?;

        Ok(SocialProfile {
            id: conn.last_insert_rowid(),
            user_id,
            service_name: service_name.to_string(),
            user_service_id: user_service_id.to_string(),
            username: username.map(String::from),
            created_at: now,
        })
    }

    pub fn attach_purchase_code(
        &self,
        user_id: UserId,
        code: &str,
        item_name: &str,
        item_id: &str,
        supported_until: Option<DateTime<Utc>>,
    ) -> Result<PurchaseCode, StoreError> {
        let conn = self.lock()?;
        let now = Utc::now();
        conn.execute(
            "INSERT INTO purchase_codes (user_id, code, item_name, item_id, supported_until, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                user_id,
                code,
                item_name,
                item_id,
                supported_until.as_ref().map(format_timestamp),
                format_timestamp(&now),
            ],
        )?;

        Ok(PurchaseCode {
            id: conn.last_insert_rowid(),
            user_id,
            code: code.to_string(),
            item_name: item_name.to_string(),
            item_id: item_id.to_string(),
            supported_until,
            created_at: now,
        })
    }

    /// Issue a personal access token. The plaintext is returned once; only
    /// its SHA-256 digest is stored.
    pub fn issue_access_token(
        &self,
        user_id: UserId,
        name: &str,
    ) -> Result<(AccessToken, String), StoreError> {
        let plaintext = generate_token();
        let digest = hex::encode(Sha256::digest(plaintext.as_bytes()));

        let conn = self.lock()?;
        let now = Utc::now();
        conn.execute(
            "INSERT INTO personal_access_tokens (user_id, name, token, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![user_id, name, digest, format_timestamp(&now)],
        )?;

        let token = AccessToken {
            id: conn.last_insert_rowid(),
            user_id,
            name: name.to_string(),
            last_used_at: None,
            created_at: now,
        };
        Ok((token, plaintext))
    }
}

#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn find(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let conn = self.lock()?;
        fetch_user(&conn, id)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let conn = self.lock()?;
        let user = conn
            .query_row(
                &format!("SELECT {} FROM users WHERE email = ?1", USER_COLUMNS),
                params![email],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    async fn find_by_subject(&self, subject: &str) -> Result<Option<User>, StoreError> {
        let conn = self.lock()?;
        let user = conn
            .query_row(
                &format!("SELECT {} FROM users WHERE oidc_subject = ?1", USER_COLUMNS),
                params![subject],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    async fn link_subject(&self, id: UserId, subject: &str) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE users SET oidc_subject = ?1 WHERE id = ?2 AND oidc_subject IS NULL",
            params![subject, id],
        )?;
        Ok(updated > 0)
    }

    async fn find_many(&self, ids: &[UserId]) -> Result<Vec<User>, StoreError> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        let conn = self.lock()?;
        let sql = format!(
            "SELECT {} FROM users WHERE id IN ({}) ORDER BY id",
            USER_COLUMNS,
            placeholders(ids.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let users = stmt
            .query_map(params_from_iter(ids.iter()), user_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }

    async fn load_relations(
        &self,
        user: User,
        relations: &RelationSet,
    ) -> Result<UserWithRelations, StoreError> {
        let conn = self.lock()?;
        let mut record = UserWithRelations::bare(user);
        let user_id = record.user.id;

        for relation in relations.iter() {
            match relation {
                Relation::Roles => record.roles = Some(fetch_roles(&conn, user_id)?),
                Relation::SocialProfiles => {
                    record.social_profiles = Some(fetch_social_profiles(&conn, user_id)?)
                }
                Relation::PurchaseCodes => {
                    record.purchase_codes = Some(fetch_purchase_codes(&conn, user_id)?)
                }
                Relation::Tokens => record.tokens = Some(fetch_access_tokens(&conn, user_id)?),
            }
        }

        Ok(record)
    }

    async fn paginate(&self, query: &UserQuery) -> Result<Page<UserWithRelations>, StoreError> {
        let mut clauses: Vec<String> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(search) = query.search.as_deref().filter(|s| !s.is_empty()) {
            values.push(Value::Text(format!("%{}%", search)));
            let n = values.len();
            clauses.push(format!(
                "(email LIKE ?{n} OR first_name LIKE ?{n} OR last_name LIKE ?{n})"
            ));
        }
        if let Some(role_id) = query.role_id {
            values.push(Value::Integer(role_id));
            clauses.push(format!(
                "id IN (SELECT user_id FROM user_role WHERE role_id = ?{})",
                values.len()
            ));
        }
        if let Some(role_name) = &query.role_name {
            values.push(Value::Text(role_name.clone()));
            clauses.push(format!(
                "id IN (SELECT ur.user_id FROM user_role ur JOIN roles r ON r.id = ur.role_id WHERE r.name = ?{})",
                values.len()
            ));
        }

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };

        let conn = self.lock()?;

        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM users {}", where_sql),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )?;

        let per_page = query.per_page.max(1);
        let page = query.page.max(1);
        let offset = (page as i64 - 1) * per_page as i64;

        values.push(Value::Integer(per_page as i64));
        let limit_idx = values.len();
        values.push(Value::Integer(offset));
        let offset_idx = values.len();

        let sql = format!(
            "SELECT {cols} FROM users {where_sql} ORDER BY {col} {dir}, id {dir} LIMIT ?{limit_idx} OFFSET ?{offset_idx}",
            cols = USER_COLUMNS,
            col = query.order_by.column(),
            dir = query.order_dir.keyword(),
        );
        let mut stmt = conn.prepare(&sql)?;
        let users = stmt
            .query_map(params_from_iter(values.iter()), user_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        let mut data = Vec::with_capacity(users.len());
        for user in users {
            let roles = fetch_roles(&conn, user.id)?;
            let mut record = UserWithRelations::bare(user);
            record.roles = Some(roles);
            data.push(record);
        }

        Ok(Page::new(data, total.max(0) as u64, page, per_page))
    }

    async fn create(&self, attributes: &UserAttributes) -> Result<User, StoreError> {
        let email = attributes
            .email
            .as_deref()
            .ok_or_else(|| StoreError::Database("email is required".to_string()))?;
        let password = attributes.password.as_deref().map(hash_password).transpose()?;
        let now = timestamp_now();

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO users (email, first_name, last_name, password, api_token, is_admin, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?6)",
            params![
                email,
                attributes.first_name,
                attributes.last_name,
                password,
                generate_token(),
                now,
            ],
        )
        .map_err(|e| duplicate_email(e, email))?;
        let id = tx.last_insert_rowid();

        match &attributes.roles {
            Some(role_ids) => sync_roles(&tx, id, role_ids)?,
            None => {
                tx.execute(
                    "INSERT INTO user_role (user_id, role_id) SELECT ?1, id FROM roles WHERE is_default = 1",
                    params![id],
                )?;
            }
        }

        let user = fetch_user(&tx, id)?
            .ok_or_else(|| StoreError::Database(format!("user {} missing after insert", id)))?;
        tx.commit()?;

        tracing::info!("Created user {} ({})", user.id, user.email);
        Ok(user)
    }

    async fn update(&self, user: &User, attributes: &UserAttributes) -> Result<User, StoreError> {
        let password = attributes.password.as_deref().map(hash_password).transpose()?;

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute(
            "UPDATE users SET
                email = COALESCE(?1, email),
                first_name = COALESCE(?2, first_name),
                last_name = COALESCE(?3, last_name),
                password = COALESCE(?4, password),
                updated_at = ?5
             WHERE id = ?6",
            params![
                attributes.email,
                attributes.first_name,
                attributes.last_name,
                password,
                timestamp_now(),
                user.id,
            ],
        )
        .map_err(|e| duplicate_email(e, attributes.email.as_deref().unwrap_or(&user.email)))?;

        if let Some(role_ids) = &attributes.roles {
            sync_roles(&tx, user.id, role_ids)?;
        }

        let updated = fetch_user(&tx, user.id)?
            .ok_or_else(|| StoreError::Database(format!("user {} missing after update", user.id)))?;
        tx.commit()?;

        tracing::debug!("Updated user {}", updated.id);
        Ok(updated)
    }

    async fn delete_multiple(&self, ids: &[UserId]) -> Result<usize, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let marks = placeholders(ids.len());

        for table in DEPENDENT_TABLES {
            tx.execute(
                &format!("DELETE FROM {} WHERE user_id IN ({})", table, marks),
                params_from_iter(ids.iter()),
            )?;
        }
        let deleted = tx.execute(
            &format!("DELETE FROM users WHERE id IN ({})", marks),
            params_from_iter(ids.iter()),
        )?;
        tx.commit()?;

        tracing::info!("Deleted {} users", deleted);
        Ok(deleted)
    }
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn timestamp_now() -> String {
    format_timestamp(&Utc::now())
}

fn parse_timestamp(raw: &str, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn timestamp_column(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_timestamp(&raw, idx)
}

fn optional_timestamp_column(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|r| parse_timestamp(&r, idx)).transpose()
}

fn user_from_row(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        password: row.get(4)?,
        api_token: row.get(5)?,
        is_admin: row.get(6)?,
        created_at: timestamp_column(row, 7)?,
        updated_at: timestamp_column(row, 8)?,
    })
}

fn fetch_user(conn: &Connection, id: UserId) -> Result<Option<User>, StoreError> {
    let user = conn
        .query_row(
            &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
            params![id],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

fn fetch_roles(conn: &Connection, user_id: UserId) -> Result<Vec<Role>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT r.id, r.name, r.is_default FROM roles r
         JOIN user_role ur ON ur.role_id = r.id
         WHERE ur.user_id = ?1 ORDER BY r.id",
    )?;
    let roles = stmt
        .query_map(params![user_id], |row| {
            Ok(Role {
                id: row.get(0)?,
                name: row.get(1)?,
                is_default: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(roles)
}

fn fetch_social_profiles(conn: &Connection, user_id: UserId) -> Result<Vec<SocialProfile>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, service_name, user_service_id, username, created_at
         FROM social_profiles WHERE user_id = ?1 ORDER BY id",
    )?;
    let profiles = stmt
        .query_map(params![user_id], |row| {
            Ok(SocialProfile {
                id: row.get(0)?,
                user_id: row.get(1)?,
                service_name: row.get(2)?,
                user_service_id: row.get(3)?,
                username: row.get(4)?,
                created_at: timestamp_column(row, 5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(profiles)
}

fn fetch_purchase_codes(conn: &Connection, user_id: UserId) -> Result<Vec<PurchaseCode>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, code, item_name, item_id, supported_until, created_at
         FROM purchase_codes WHERE user_id = ?1 ORDER BY id",
    )?;
    let codes = stmt
        .query_map(params![user_id], |row| {
            Ok(PurchaseCode {
                id: row.get(0)?,
                user_id: row.get(1)?,
                code: row.get(2)?,
                item_name: row.get(3)?,
                item_id: row.get(4)?,
                supported_until: optional_timestamp_column(row, 5)?,
                created_at: timestamp_column(row, 6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(codes)
}

fn fetch_access_tokens(conn: &Connection, user_id: UserId) -> Result<Vec<AccessToken>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, name, last_used_at, created_at
         FROM personal_access_tokens WHERE user_id = ?1 ORDER BY id",
    )?;
    let tokens = stmt
        .query_map(params![user_id], |row| {
            Ok(AccessToken {
                id: row.get(0)?,
                user_id: row.get(1)?,
                name: row.get(2)?,
                last_used_at: optional_timestamp_column(row, 3)?,
                created_at: timestamp_column(row, 4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(tokens)
}

/// Replace the user's role links with `role_ids`. Unknown role ids are ignored.
fn sync_roles(conn: &Connection, user_id: UserId, role_ids: &[i64]) -> Result<(), StoreError> {
    conn.execute("DELETE FROM user_role WHERE user_id = ?1", params![user_id])?;
    for role_id in role_ids {
        conn.execute(
            "INSERT OR IGNORE INTO user_role (user_id, role_id) SELECT ?1, id FROM roles WHERE id = ?2",
            params![user_id, role_id],
        )?;
    }
    Ok(())
}

fn duplicate_email(e: rusqlite::Error, email: &str) -> StoreError {
    match &e {
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation => {
            StoreError::DuplicateEmail(email.to_string())
        }
        _ => StoreError::from(e),
    }
}

fn hash_password(password: &str) -> Result<String, StoreError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| StoreError::Hashing(e.to_string()))
}

/// 40 hex characters of randomness.
fn generate_token() -> String {
    let bytes: [u8; 20] = rand::random();
    hex::encode(bytes)
}
