use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Result as SqlResult, Row};
use std::path::Path;

use crate::models::{Bill, BillItem, BillQuery, BillSummary, Customer, PaymentMode, Profile, User};

pub struct Database {
    conn: Connection,
}

impl ToSql for PaymentMode {
    fn to_sql(&self) -> SqlResult<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for PaymentMode {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

impl Database {
    pub fn new(db_path: &Path) -> SqlResult<Self> {
        let conn = Connection::open(db_path)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> SqlResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> SqlResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let mut db = Database { conn };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&mut self) -> SqlResult<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                name TEXT PRIMARY KEY,
                applied_at TEXT NOT NULL
            );",
        )?;

        let migrations = [
            (
                "001_create_profiles_and_customers.sql",
                include_str!(concat!(
                    env!("CARGO_MANIFEST_DIR"),
                    "/migrations/001_create_profiles_and_customers.sql"
                )),
            ),
            (
                "002_create_bills_and_items.sql",
                include_str!(concat!(
                    env!("CARGO_MANIFEST_DIR"),
                    "/migrations/002_create_bills_and_items.sql"
                )),
            ),
            (
                "003_create_auth_and_settings.sql",
                include_str!(concat!(
                    env!("CARGO_MANIFEST_DIR"),
                    "/migrations/003_create_auth_and_settings.sql"
                )),
            ),
        ];

        for (name, sql) in migrations {
            let applied: Option<String> = self
                .conn
                .query_row(
                    "SELECT name FROM schema_migrations WHERE name = ?1",
                    params![name],
                    |row| row.get(0),
                )
                .optional()?;

            if applied.is_none() {
                let tx = self.conn.transaction()?;
                tx.execute_batch(sql)?;
                tx.execute(
                    "INSERT INTO schema_migrations (name, applied_at) VALUES (?1, datetime('now'))",
                    params![name],
                )?;
                tx.commit()?;
            }
        }

        Ok(())
    }

    pub fn set_setting(&self, key: &str, value: &str) -> SqlResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO settings (key, value, updated_at) VALUES (?1, ?2, datetime('now'))",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn get_setting(&self, key: &str) -> SqlResult<Option<String>> {
        let mut stmt = self.conn.prepare("SELECT value FROM settings WHERE key = ?1")?;
        stmt.query_row(params![key], |row| row.get(0)).optional()
    }

    pub fn delete_setting(&self, key: &str) -> SqlResult<()> {
        self.conn
            .execute("DELETE FROM settings WHERE key = ?1", params![key])?;
        Ok(())
    }

    pub fn insert_user(&self, user: &User, password_hash: &str, created_at: DateTime<Utc>) -> SqlResult<()> {
        self.conn.execute(
            "INSERT INTO users (id, email, password_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![user.id, user.email, password_hash, created_at],
        )?;
        Ok(())
    }

    /// Returns the user and their stored password hash.
    pub fn find_user_by_email(&self, email: &str) -> SqlResult<Option<(User, String)>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, email, password_hash FROM users WHERE email = ?1 COLLATE NOCASE",
        )?;
        stmt.query_row(params![email], |row| {
            Ok((
                User {
                    id: row.get(0)?,
                    email: row.get(1)?,
                },
                row.get(2)?,
            ))
        })
        .optional()
    }

    pub fn insert_session(&self, token_digest: &str, user_id: &str, created_at: DateTime<Utc>) -> SqlResult<()> {
        self.conn.execute(
            "INSERT INTO sessions (token_digest, user_id, created_at) VALUES (?1, ?2, ?3)",
            params![token_digest, user_id, created_at],
        )?;
        Ok(())
    }

    pub fn find_session_user(&self, token_digest: &str) -> SqlResult<Option<User>> {
        let mut stmt = self.conn.prepare(
            "SELECT u.id, u.email
             FROM sessions s JOIN users u ON u.id = s.user_id
             WHERE s.token_digest = ?1",
        )?;
        stmt.query_row(params![token_digest], |row| {
            Ok(User {
                id: row.get(0)?,
                email: row.get(1)?,
            })
        })
        .optional()
    }

    pub fn delete_session(&self, token_digest: &str) -> SqlResult<usize> {
        self.conn.execute(
            "DELETE FROM sessions WHERE token_digest = ?1",
            params![token_digest],
        )
    }

    pub fn upsert_profile(&self, profile: &Profile) -> SqlResult<()> {
        self.conn.execute(
            "INSERT INTO profiles (
                id, full_name, company_name, company_address, gstin, signature_url, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(id) DO UPDATE SET
                full_name = excluded.full_name,
                company_name = excluded.company_name,
                company_address = excluded.company_address,
                gstin = excluded.gstin,
                signature_url = excluded.signature_url,
                updated_at = excluded.updated_at",
            params![
                profile.id,
                profile.full_name,
                profile.company_name,
                profile.company_address,
                profile.gstin,
                profile.signature_url,
                profile.created_at,
                profile.updated_at
            ],
        )?;
        Ok(())
    }

    pub fn get_profile(&self, id: &str) -> SqlResult<Option<Profile>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, full_name, company_name, company_address, gstin, signature_url, created_at, updated_at
             FROM profiles WHERE id = ?1",
        )?;

        stmt.query_row(params![id], |row| {
            Ok(Profile {
                id: row.get(0)?,
                full_name: row.get(1)?,
                company_name: row.get(2)?,
                company_address: row.get(3)?,
                gstin: row.get(4)?,
                signature_url: row.get(5)?,
                created_at: row.get(6)?,
                updated_at: row.get(7)?,
            })
        })
        .optional()
    }

    pub fn insert_customer(&self, customer: &Customer) -> SqlResult<()> {
        self.conn.execute(
            "INSERT INTO customers (id, name, mobile_number, email, address, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                customer.id,
                customer.name,
                customer.mobile_number,
                customer.email,
                customer.address,
                customer.created_at,
                customer.updated_at
            ],
        )?;
        Ok(())
    }

    pub fn get_customer(&self, id: &str) -> SqlResult<Option<Customer>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, mobile_number, email, address, created_at, updated_at
             FROM customers WHERE id = ?1",
        )?;
        stmt.query_row(params![id], customer_from_row).optional()
    }

    pub fn list_customers(&self) -> SqlResult<Vec<Customer>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, mobile_number, email, address, created_at, updated_at
             FROM customers
             ORDER BY name COLLATE NOCASE ASC",
        )?;
        let rows = stmt.query_map([], customer_from_row)?;
        rows.collect()
    }

    pub fn insert_bill(&self, bill: &Bill) -> SqlResult<()> {
        self.conn.execute(
            "INSERT INTO bills (
                id, invoice_number, customer_id, sub_total, discount, total, payment_mode,
                amount_received, balance, created_by, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                bill.id,
                bill.invoice_number,
                bill.customer_id,
                bill.sub_total,
                bill.discount,
                bill.total,
                bill.payment_mode,
                bill.amount_received,
                bill.balance,
                bill.created_by,
                bill.created_at,
                bill.updated_at
            ],
        )?;
        Ok(())
    }

    pub fn get_bill(&self, id: &str) -> SqlResult<Option<Bill>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, invoice_number, customer_id, sub_total, discount, total, payment_mode,
                    amount_received, balance, created_by, created_at, updated_at
             FROM bills WHERE id = ?1",
        )?;

        stmt.query_row(params![id], |row| {
            Ok(Bill {
                id: row.get(0)?,
                invoice_number: row.get(1)?,
                customer_id: row.get(2)?,
                sub_total: row.get(3)?,
                discount: row.get(4)?,
                total: row.get(5)?,
                payment_mode: row.get(6)?,
                amount_received: row.get(7)?,
                balance: row.get(8)?,
                created_by: row.get(9)?,
                created_at: row.get(10)?,
                updated_at: row.get(11)?,
            })
        })
        .optional()
    }

    pub fn list_bill_summaries(&self, query: &BillQuery) -> SqlResult<Vec<BillSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT b.id, b.invoice_number, b.total, b.created_at, c.name, c.mobile_number
             FROM bills b
             JOIN customers c ON c.id = b.customer_id
             WHERE ?1 IS NULL OR b.created_at >= ?1
             ORDER BY b.created_at DESC, b.rowid DESC
             LIMIT ?2",
        )?;

        let limit = query.limit.map(|l| l as i64).unwrap_or(-1);
        let rows = stmt.query_map(params![query.created_since, limit], |row| {
            Ok(BillSummary {
                id: row.get(0)?,
                invoice_number: row.get(1)?,
                total: row.get(2)?,
                created_at: row.get(3)?,
                customer_name: row.get(4)?,
                customer_mobile: row.get(5)?,
            })
        })?;

        rows.collect()
    }

    pub fn count_bills(&self) -> SqlResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM bills", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    /// `(total, created_at)` of every bill created strictly after `since`.
    pub fn bill_totals_since(&self, since: DateTime<Utc>) -> SqlResult<Vec<(f64, DateTime<Utc>)>> {
        let mut stmt = self.conn.prepare(
            "SELECT total, created_at FROM bills WHERE created_at > ?1",
        )?;
        let rows = stmt.query_map(params![since], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect()
    }

    pub fn insert_bill_items(&self, items: &[BillItem]) -> SqlResult<()> {
        let mut stmt = self.conn.prepare(
            "INSERT INTO bill_items (id, bill_id, position, item_name, quantity, price, amount, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?;
        for (position, item) in items.iter().enumerate() {
            stmt.execute(params![
                item.id,
                item.bill_id,
                position as i64,
                item.item_name,
                item.quantity,
                item.price,
                item.amount,
                item.created_at
            ])?;
        }
        Ok(())
    }

    pub fn get_bill_items(&self, bill_id: &str) -> SqlResult<Vec<BillItem>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, bill_id, item_name, quantity, price, amount, created_at
             FROM bill_items
             WHERE bill_id = ?1
             ORDER BY position ASC",
        )?;

        let rows = stmt.query_map(params![bill_id], |row| {
            Ok(BillItem {
                id: row.get(0)?,
                bill_id: row.get(1)?,
                item_name: row.get(2)?,
                quantity: row.get(3)?,
                price: row.get(4)?,
                amount: row.get(5)?,
                created_at: row.get(6)?,
            })
        })?;

        rows.collect()
    }

    /// Bumps and returns the invoice counter for `year`, starting at 1.
    pub fn next_invoice_sequence(&self, year: i32) -> SqlResult<i64> {
        self.conn.query_row(
            "INSERT INTO invoice_counters (year, last_value) VALUES (?1, 1)
             ON CONFLICT(year) DO UPDATE SET last_value = last_value + 1
             RETURNING last_value",
            params![year],
            |row| row.get(0),
        )
    }
}

fn customer_from_row(row: &Row<'_>) -> SqlResult<Customer> {
    Ok(Customer {
        id: row.get(0)?,
        name: row.get(1)?,
        mobile_number: row.get(2)?,
        email: row.get(3)?,
        address: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}
