//! User Storage
//! Mission: Store accounts, users and roles with SQLite

use crate::auth::{
    error::StoreError,
    models::{Account, Address, NewUser, Role, User},
};
use chrono::Utc;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior};
use tracing::info;

/// Account/user lookups the credential service depends on.
/// Finders never return soft-deleted rows.
pub trait UserStore: Send + Sync {
    fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, StoreError>;

    fn find_user_by_email_with_roles_and_account(
        &self,
        email: &str,
    ) -> Result<Option<User>, StoreError>;

    /// Loads roles too, so refreshed claims pick up role changes
    fn find_user_by_id_with_account(&self, id: i64) -> Result<Option<User>, StoreError>;

    fn find_account_by_id(&self, id: i64) -> Result<Option<Account>, StoreError>;

    /// Fails with `ConstraintViolation` when the email is taken
    fn create_user_with_account(&self, user: NewUser) -> Result<User, StoreError>;

    /// Cheap liveness probe
    fn ping(&self) -> Result<(), StoreError>;
}

/// User storage with SQLite backend
pub struct SqliteUserStore {
    db_path: String,
}

const ACCOUNT_COLUMNS: &str = "a.id, a.user_id, a.email, a.password_hash, a.created_at, a.updated_at";

impl SqliteUserStore {
    /// Create a new user store and initialize database
    pub fn new(db_path: &str) -> Result<Self, StoreError> {
        let store = Self {
            db_path: db_path.to_string(),
        };
        store.init_db()?;
        Ok(store)
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        let conn = Connection::open(&self.db_path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(conn)
    }

    /// Initialize database schema
    fn init_db(&self) -> Result<(), StoreError> {
        let conn = self.connect()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT,
                business_id INTEGER,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                deleted_at TEXT
            );

            CREATE TABLE IF NOT EXISTS accounts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL UNIQUE REFERENCES users(id),
                email TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                deleted_at TEXT
            );

            CREATE TABLE IF NOT EXISTS roles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT UNIQUE NOT NULL
            );

            CREATE TABLE IF NOT EXISTS user_roles (
                user_id INTEGER NOT NULL REFERENCES users(id),
                role_id INTEGER NOT NULL REFERENCES roles(id),
                PRIMARY KEY (user_id, role_id)
            );

            CREATE TABLE IF NOT EXISTS addresses (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL UNIQUE REFERENCES users(id),
                street TEXT,
                postal_code TEXT,
                city TEXT,
                state TEXT,
                country TEXT,
                landline TEXT,
                mobile TEXT
            );",
        )?;

        Ok(())
    }

    /// Grant a role, creating it on first use
    pub fn assign_role(&self, user_id: i64, role_name: &str) -> Result<(), StoreError> {
        let conn = self.connect()?;
        let role_id = ensure_role(&conn, role_name)?;
        conn.execute(
            "INSERT OR IGNORE INTO user_roles (user_id, role_id) VALUES (?1, ?2)",
            params![user_id, role_id],
        )?;
        Ok(())
    }

    /// Replace the user's address
    pub fn set_address(&self, user_id: i64, address: &Address) -> Result<(), StoreError> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO addresses (user_id, street, postal_code, city, state, country, landline, mobile)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(user_id) DO UPDATE SET
                street = excluded.street,
                postal_code = excluded.postal_code,
                city = excluded.city,
                state = excluded.state,
                country = excluded.country,
                landline = excluded.landline,
                mobile = excluded.mobile",
            params![
                user_id,
                address.street,
                address.postal_code,
                address.city,
                address.state,
                address.country,
                address.landline,
                address.mobile,
            ],
        )?;
        Ok(())
    }

    /// Logically delete a user and its account
    pub fn soft_delete_user(&self, user_id: i64) -> Result<bool, StoreError> {
        let mut conn = self.connect()?;
        let now = Utc::now().to_rfc3339();

        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let rows = tx.execute(
            "UPDATE users SET deleted_at = ?1, updated_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
            params![now, user_id],
        )?;
        tx.execute(
            "UPDATE accounts SET deleted_at = ?1, updated_at = ?1 WHERE user_id = ?2 AND deleted_at IS NULL",
            params![now, user_id],
        )?;
        tx.commit()?;

        if rows > 0 {
            info!("🗑️  Soft-deleted user: {}", user_id);
        }
        Ok(rows > 0)
    }

    fn load_user(&self, conn: &Connection, filter: UserFilter<'_>) -> Result<Option<User>, StoreError> {
        let (clause, value): (&str, &dyn rusqlite::ToSql) = match &filter {
            UserFilter::Email(email) => ("a.email = ?1", email as &dyn rusqlite::ToSql),
            UserFilter::Id(id) => ("u.id = ?1", id as &dyn rusqlite::ToSql),
        };

        let sql = format!(
            "SELECT u.id, u.username, u.business_id, u.created_at, {}
             FROM users u
             JOIN accounts a ON a.user_id = u.id
             WHERE {} AND u.deleted_at IS NULL AND a.deleted_at IS NULL",
            ACCOUNT_COLUMNS, clause
        );

        let row = conn
            .query_row(&sql, [value], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<i64>>(2)?,
                    row.get::<_, String>(3)?,
                    account_from_row(row, 4)?,
                ))
            })
            .optional()?;

        let Some((id, username, business_id, created_at, account)) = row else {
            return Ok(None);
        };

        Ok(Some(User {
            id,
            username,
            business_id,
            roles: load_roles(conn, id)?,
            address: load_address(conn, id)?,
            account,
            created_at,
        }))
    }

    fn load_account(&self, clause: &str, value: &dyn rusqlite::ToSql) -> Result<Option<Account>, StoreError> {
        let conn = self.connect()?;
        let sql = format!(
            "SELECT {} FROM accounts a
             JOIN users u ON u.id = a.user_id
             WHERE {} AND a.deleted_at IS NULL AND u.deleted_at IS NULL",
            ACCOUNT_COLUMNS, clause
        );

        Ok(conn
            .query_row(&sql, [value], |row| account_from_row(row, 0))
            .optional()?)
    }
}

enum UserFilter<'a> {
    Email(&'a str),
    Id(i64),
}

impl UserStore for SqliteUserStore {
    fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        self.load_account("a.email = ?1", &email)
    }

    fn find_user_by_email_with_roles_and_account(
        &self,
        email: &str,
    ) -> Result<Option<User>, StoreError> {
        let conn = self.connect()?;
        self.load_user(&conn, UserFilter::Email(email))
    }

    fn find_user_by_id_with_account(&self, id: i64) -> Result<Option<User>, StoreError> {
        let conn = self.connect()?;
        self.load_user(&conn, UserFilter::Id(id))
    }

    fn find_account_by_id(&self, id: i64) -> Result<Option<Account>, StoreError> {
        self.load_account("a.id = ?1", &id)
    }

    fn create_user_with_account(&self, new_user: NewUser) -> Result<User, StoreError> {
        let mut conn = self.connect()?;
        let now = Utc::now().to_rfc3339();

        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute(
            "INSERT INTO users (username, business_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)",
            params![new_user.username, new_user.business_id, now],
        )?;
        let user_id = tx.last_insert_rowid();

        tx.execute(
            "INSERT INTO accounts (user_id, email, password_hash, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![user_id, new_user.email, new_user.password_hash, now],
        )
        .map_err(map_constraint)?;
        let account_id = tx.last_insert_rowid();

        let mut roles = Vec::with_capacity(new_user.roles.len());
        for name in &new_user.roles {
            let role_id = ensure_role(&tx, name)?;
            tx.execute(
                "INSERT OR IGNORE INTO user_roles (user_id, role_id) VALUES (?1, ?2)",
                params![user_id, role_id],
            )?;
            roles.push(Role {
                id: role_id,
                name: name.clone(),
            });
        }

        tx.commit()?;

        info!("✅ Created user {} with account {}", user_id, account_id);

        Ok(User {
            id: user_id,
            username: new_user.username,
            business_id: new_user.business_id,
            account: Account {
                id: account_id,
                user_id,
                email: new_user.email,
                password_hash: new_user.password_hash,
                created_at: now.clone(),
                updated_at: now.clone(),
            },
            roles,
            address: None,
            created_at: now,
        })
    }

    fn ping(&self) -> Result<(), StoreError> {
        let conn = self.connect()?;
        conn.query_row("SELECT COUNT(*) FROM accounts", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }
}

fn map_constraint(err: rusqlite::Error) -> StoreError {
    match err.sqlite_error_code() {
        Some(ErrorCode::ConstraintViolation) => StoreError::ConstraintViolation,
        _ => StoreError::Database(err),
    }
}

fn account_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Account> {
    Ok(Account {
        id: row.get(offset)?,
        user_id: row.get(offset + 1)?,
        email: row.get(offset + 2)?,
        password_hash: row.get(offset + 3)?,
        created_at: row.get(offset + 4)?,
        updated_at: row.get(offset + 5)?,
    })
}

fn ensure_role(conn: &Connection, name: &str) -> Result<i64, StoreError> {
    conn.execute("INSERT OR IGNORE INTO roles (name) VALUES (?1)", params![name])?;
    Ok(conn.query_row(
        "SELECT id FROM roles WHERE name = ?1",
        params![name],
        |row| row.get(0),
    )?)
}

fn load_roles(conn: &Connection, user_id: i64) -> Result<Vec<Role>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT r.id, r.name FROM roles r
         JOIN user_roles ur ON ur.role_id = r.id
         WHERE ur.user_id = ?1
         ORDER BY r.id",
    )?;

    let roles = stmt
        .query_map(params![user_id], |row| {
            Ok(Role {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(roles)
}

fn load_address(conn: &Connection, user_id: i64) -> Result<Option<Address>, StoreError> {
    Ok(conn
        .query_row(
            "SELECT street, postal_code, city, state, country, landline, mobile
             FROM addresses WHERE user_id = ?1",
            params![user_id],
            |row| {
                Ok(Address {
                    street: row.get(0)?,
                    postal_code: row.get(1)?,
                    city: row.get(2)?,
                    state: row.get(3)?,
                    country: row.get(4)?,
                    landline: row.get(5)?,
                    mobile: row.get(6)?,
                })
            },
        )
        .optional()?)
}
