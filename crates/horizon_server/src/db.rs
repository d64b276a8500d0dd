//! SQLite persistence for accounts, snapshots, templates and auxiliary
//! inputs. The query layer returns the row structs the core assembler
//! consumes; no engine vocabulary leaks in here.

use rusqlite::Connection;

use horizon_core::assemble::{
    AccountRow, AccountTypeRow, GrowthModelRow, SnapshotRow, SpecialDateRow, TransferTemplateRow,
};

pub fn init_db(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS account_types (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            color TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS accounts (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            type_id TEXT REFERENCES account_types(id),
            balance_upper_limit REAL,
            cash_flow_frequency TEXT,
            cash_flow_destination_id TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS account_snapshots (
            account_id TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
            date TEXT NOT NULL,
            balance TEXT NOT NULL,
            PRIMARY KEY (account_id, date)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS growth_models (
            id INTEGER PRIMARY KEY,
            account_id TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
            kind TEXT NOT NULL,
            start_date TEXT,
            end_date TEXT,
            annual_rate TEXT NOT NULL,
            annual_volatility TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS transfer_templates (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            from_account_id TEXT NOT NULL DEFAULT '',
            to_account_id TEXT NOT NULL DEFAULT '',
            amount_kind TEXT NOT NULL,
            amount_fixed TEXT,
            amount_percent REAL,
            priority INTEGER NOT NULL DEFAULT 0,
            recurrence TEXT NOT NULL,
            start_date TEXT,
            end_date TEXT,
            enabled INTEGER NOT NULL DEFAULT 1
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS special_dates (
            id INTEGER PRIMARY KEY,
            date TEXT NOT NULL,
            name TEXT NOT NULL
        )",
        [],
    )?;

    Ok(())
}

/// Everything the assembler needs, loaded in one pass.
#[derive(Debug, Default)]
pub struct InputRows {
    pub accounts: Vec<AccountRow>,
    pub snapshots: Vec<SnapshotRow>,
    pub growth_models: Vec<GrowthModelRow>,
    pub templates: Vec<TransferTemplateRow>,
    pub account_types: Vec<AccountTypeRow>,
    pub special_dates: Vec<SpecialDateRow>,
}

pub fn load_input_rows(conn: &Connection) -> Result<InputRows, rusqlite::Error> {
    let accounts = conn
        .prepare(
            "SELECT id, name, type_id, balance_upper_limit,
                    cash_flow_frequency, cash_flow_destination_id
             FROM accounts ORDER BY id",
        )?
        .query_map([], |row| {
            Ok(AccountRow {
                id: row.get(0)?,
                name: row.get(1)?,
                type_id: row.get(2)?,
                balance_upper_limit: row.get(3)?,
                cash_flow_frequency: row.get(4)?,
                cash_flow_destination_id: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let snapshots = conn
        .prepare(
            "SELECT account_id, date, balance
             FROM account_snapshots ORDER BY account_id, date",
        )?
        .query_map([], |row| {
            Ok(SnapshotRow {
                account_id: row.get(0)?,
                date: row.get(1)?,
                balance: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let growth_models = conn
        .prepare(
            "SELECT account_id, kind, start_date, end_date, annual_rate, annual_volatility
             FROM growth_models ORDER BY account_id, id",
        )?
        .query_map([], |row| {
            Ok(GrowthModelRow {
                account_id: row.get(0)?,
                kind: row.get(1)?,
                start_date: row.get(2)?,
                end_date: row.get(3)?,
                annual_rate: row.get(4)?,
                annual_volatility: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let templates = conn
        .prepare(
            "SELECT id, name, from_account_id, to_account_id, amount_kind, amount_fixed,
                    amount_percent, priority, recurrence, start_date, end_date, enabled
             FROM transfer_templates ORDER BY priority, rowid",
        )?
        .query_map([], |row| {
            Ok(TransferTemplateRow {
                id: row.get(0)?,
                name: row.get(1)?,
                from_account_id: row.get(2)?,
                to_account_id: row.get(3)?,
                amount_kind: row.get(4)?,
                amount_fixed: row.get(5)?,
                amount_percent: row.get(6)?,
                priority: row.get(7)?,
                recurrence: row.get(8)?,
                start_date: row.get(9)?,
                end_date: row.get(10)?,
                enabled: row.get(11)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let account_types = conn
        .prepare("SELECT id, name, color FROM account_types ORDER BY id")?
        .query_map([], |row| {
            Ok(AccountTypeRow {
                id: row.get(0)?,
                name: row.get(1)?,
                color: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let special_dates = conn
        .prepare("SELECT date, name FROM special_dates ORDER BY date, id")?
        .query_map([], |row| {
            Ok(SpecialDateRow {
                date: row.get(0)?,
                name: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(InputRows {
        accounts,
        snapshots,
        growth_models,
        templates,
        account_types,
        special_dates,
    })
}
