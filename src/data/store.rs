//! Relational surface store
//!
//! SQLite-backed storage for the published surface of each mandate:
//! - `tblSecurity`: mandate → broker contract id of the underlying
//! - `tblStrikes`, `tblExpirations`, `tblImpliedVols`: the current matrix
//!
//! A sync replaces a mandate's rows in one transaction, so readers see
//! either the previous matrix or the new one, never a mix.

use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use ndarray::Array2;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::core::{SurfaceError, SurfaceResult, VolMatrix};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS tblSecurity (
        MandateID TEXT PRIMARY KEY,
        IBContractID INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS tblStrikes (
        MandateID TEXT NOT NULL,
        Strike REAL NOT NULL,
        UpdateTime TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS tblExpirations (
        MandateID TEXT NOT NULL,
        SecurityID TEXT NOT NULL,
        Expiration TEXT NOT NULL,
        UpdateTime TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS tblImpliedVols (
        MandateID TEXT NOT NULL,
        SecurityID TEXT NOT NULL,
        Strike REAL NOT NULL,
        Expiration TEXT NOT NULL,
        ImpliedVol REAL NOT NULL,
        UpdateTime TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_strikes_mandate ON tblStrikes(MandateID)",
    "CREATE INDEX IF NOT EXISTS idx_expirations_mandate ON tblExpirations(MandateID)",
    "CREATE INDEX IF NOT EXISTS idx_vols_mandate ON tblImpliedVols(MandateID)",
];

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Security ids written next to each expiration
///
/// Expirations up to the front contract's last trade date belong to the
/// front contract; later ones belong to the roll contract, which must be
/// supplied explicitly.
#[derive(Debug, Clone, PartialEq)]
pub struct SecurityIds {
    pub front: String,
    pub front_last_trade: NaiveDate,
    pub roll: Option<String>,
}

impl SecurityIds {
    pub fn for_expiry(&self, expiry: NaiveDate) -> Option<&str> {
        if expiry <= self.front_last_trade {
            Some(&self.front)
        } else {
            self.roll.as_deref()
        }
    }
}

/// Rows written by one sync
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteSummary {
    pub strikes: usize,
    pub expirations: usize,
    pub implied_vols: usize,
}

/// A mandate's surface as read back from the store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSurface {
    pub mandate_id: String,
    pub updated_at: String,
    /// Security id per matrix column
    pub security_ids: Vec<String>,
    pub matrix: VolMatrix,
}

/// Surface store handle; the connection closes when it is dropped
pub struct SurfaceStore {
    conn: Connection,
}

impl SurfaceStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> SurfaceResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        let store = Self::with_connection(conn)?;

        tracing::info!("Opened surface store at {}", path.display());
        Ok(store)
    }

    pub fn open_in_memory() -> SurfaceResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> SurfaceResult<Self> {
        for sql in SCHEMA {
            conn.execute(sql, [])?;
        }
        Ok(Self { conn })
    }

    /// Broker contract id stored for a mandate
    pub fn contract_id_for(&self, mandate_id: &str) -> SurfaceResult<Option<i64>> {
        let id = self
            .conn
            .query_row(
                "SELECT IBContractID FROM tblSecurity WHERE MandateID = ?1",
                params![mandate_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Insert or replace the mandate → contract id mapping
    pub fn register_security(&self, mandate_id: &str, con_id: i64) -> SurfaceResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO tblSecurity (MandateID, IBContractID) VALUES (?1, ?2)",
            params![mandate_id, con_id],
        )?;
        tracing::debug!("Registered {} -> {}", mandate_id, con_id);
        Ok(())
    }

    /// Replace everything stored for a mandate with the given matrix
    ///
    /// Deletes and inserts run in a single transaction committed once. If
    /// any statement fails the transaction rolls back and the previous
    /// surface stays in place. Security ids are resolved before anything is
    /// touched.
    pub fn replace_surface(
        &mut self,
        mandate_id: &str,
        matrix: &VolMatrix,
        ids: &SecurityIds,
        updated_at: DateTime<Utc>,
    ) -> SurfaceResult<WriteSummary> {
        let columns: Vec<(NaiveDate, &str)> = matrix
            .expiries
            .iter()
            .map(|&e| {
                ids.for_expiry(e).map(|id| (e, id)).ok_or_else(|| {
                    SurfaceError::config(format!(
                        "Expiration {} is past {}'s last trade date {} and no roll contract is configured",
                        e, ids.front, ids.front_last_trade
                    ))
                })
            })
            .collect::<SurfaceResult<_>>()?;

        let stamp = updated_at.to_rfc3339();
        let mut summary = WriteSummary::default();

        let tx = self.conn.transaction()?;

        tx.execute("DELETE FROM tblStrikes WHERE MandateID = ?1", params![mandate_id])?;
        tx.execute("DELETE FROM tblExpirations WHERE MandateID = ?1", params![mandate_id])?;
        tx.execute("DELETE FROM tblImpliedVols WHERE MandateID = ?1", params![mandate_id])?;

        {
            let mut insert_strike = tx.prepare(
                "INSERT INTO tblStrikes (MandateID, Strike, UpdateTime) VALUES (?1, ?2, ?3)",
            )?;
            for &strike in &matrix.strikes {
                insert_strike.execute(params![mandate_id, strike, stamp])?;
                summary.strikes += 1;
            }

            let mut insert_expiration = tx.prepare(
                "INSERT INTO tblExpirations (MandateID, SecurityID, Expiration, UpdateTime)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            let mut insert_vol = tx.prepare(
                "INSERT INTO tblImpliedVols (MandateID, SecurityID, Strike, Expiration, ImpliedVol, UpdateTime)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;

            for (ei, &(expiry, security_id)) in columns.iter().enumerate() {
                let expiry_str = expiry.format(DATE_FORMAT).to_string();
                insert_expiration.execute(params![mandate_id, security_id, expiry_str, stamp])?;
                summary.expirations += 1;

                for (si, &strike) in matrix.strikes.iter().enumerate() {
                    insert_vol.execute(params![
                        mandate_id,
                        security_id,
                        strike,
                        expiry_str,
                        matrix.vols[[si, ei]],
                        stamp,
                    ])?;
                    summary.implied_vols += 1;
                }
            }
        }

        tx.commit()?;

        tracing::info!(
            "Replaced surface for {}: {} strikes, {} expirations, {} vols",
            mandate_id,
            summary.strikes,
            summary.expirations,
            summary.implied_vols
        );
        Ok(summary)
    }

    /// Read a mandate's stored surface back as a matrix
    pub fn load_surface(&self, mandate_id: &str) -> SurfaceResult<Option<StoredSurface>> {
        let mut stmt = self
            .conn
            .prepare("SELECT Strike FROM tblStrikes WHERE MandateID = ?1 ORDER BY Strike")?;
        let strikes: Vec<f64> = stmt
            .query_map(params![mandate_id], |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?;

        let mut stmt = self.conn.prepare(
            "SELECT Expiration, SecurityID, UpdateTime FROM tblExpirations
             WHERE MandateID = ?1 ORDER BY Expiration",
        )?;
        let columns: Vec<(String, String, String)> = stmt
            .query_map(params![mandate_id], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<rusqlite::Result<_>>()?;

        if strikes.is_empty() || columns.is_empty() {
            return Ok(None);
        }

        let expiries: Vec<NaiveDate> = columns
            .iter()
            .map(|(e, _, _)| {
                NaiveDate::parse_from_str(e, DATE_FORMAT)
                    .map_err(|err| SurfaceError::invalid_input(format!("Stored expiration '{}': {}", e, err)))
            })
            .collect::<SurfaceResult<_>>()?;

        let mut grid: Array2<Option<f64>> = Array2::from_elem((strikes.len(), expiries.len()), None);
        let mut stmt = self.conn.prepare(
            "SELECT Strike, Expiration, ImpliedVol FROM tblImpliedVols WHERE MandateID = ?1",
        )?;
        let cells = stmt.query_map(params![mandate_id], |row| {
            Ok((row.get::<_, f64>(0)?, row.get::<_, String>(1)?, row.get::<_, f64>(2)?))
        })?;

        for cell in cells {
            let (strike, expiry, vol) = cell?;
            let si = strikes.iter().position(|s| (s - strike).abs() < 1e-9);
            let ei = NaiveDate::parse_from_str(&expiry, DATE_FORMAT)
                .ok()
                .and_then(|e| expiries.binary_search(&e).ok());
            if let (Some(si), Some(ei)) = (si, ei) {
                grid[[si, ei]] = Some(vol);
            }
        }

        Ok(Some(StoredSurface {
            mandate_id: mandate_id.to_string(),
            updated_at: columns[0].2.clone(),
            security_ids: columns.into_iter().map(|(_, id, _)| id).collect(),
            matrix: VolMatrix::from_sparse(strikes, expiries, grid),
        }))
    }

    /// Row counts per table for a mandate: (strikes, expirations, vols)
    pub fn row_counts(&self, mandate_id: &str) -> SurfaceResult<(usize, usize, usize)> {
        let count = |table: &str| -> SurfaceResult<usize> {
            let sql = format!("SELECT COUNT(*) FROM {} WHERE MandateID = ?1", table);
            let n: i64 = self.conn.query_row(&sql, params![mandate_id], |row| row.get(0))?;
            Ok(n as usize)
        };

        Ok((
            count("tblStrikes")?,
            count("tblExpirations")?,
            count("tblImpliedVols")?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn matrix(level: f64) -> VolMatrix {
        VolMatrix {
            strikes: vec![95.0, 100.0, 105.0],
            expiries: vec![d(2024, 1, 19), d(2024, 2, 16)],
            vols: ndarray::array![
                [level + 0.02, level + 0.03],
                [level, level + 0.01],
                [level + 0.01, level + 0.02],
            ],
        }
    }

    fn ids() -> SecurityIds {
        SecurityIds {
            front: "ESH4".into(),
            front_last_trade: d(2024, 3, 15),
            roll: None,
        }
    }

    #[test]
    fn test_security_lookup() {
        let store = SurfaceStore::open_in_memory().unwrap();
        assert_eq!(store.contract_id_for("DUMMY").unwrap(), None);

        store.register_security("DUMMY", 495512563).unwrap();
        assert_eq!(store.contract_id_for("DUMMY").unwrap(), Some(495512563));

        store.register_security("DUMMY", 42).unwrap();
        assert_eq!(store.contract_id_for("DUMMY").unwrap(), Some(42));
    }

    #[test]
    fn test_replace_and_load() {
        let mut store = SurfaceStore::open_in_memory().unwrap();

        let summary = store.replace_surface("DUMMY", &matrix(0.20), &ids(), Utc::now()).unwrap();
        assert_eq!(summary, WriteSummary { strikes: 3, expirations: 2, implied_vols: 6 });

        let stored = store.load_surface("DUMMY").unwrap().unwrap();
        assert_eq!(stored.matrix, matrix(0.20));
        assert_eq!(stored.security_ids, vec!["ESH4", "ESH4"]);
        assert!(store.load_surface("OTHER").unwrap().is_none());
    }

    #[test]
    fn test_second_sync_leaves_no_residue() {
        let mut store = SurfaceStore::open_in_memory().unwrap();
        store.replace_surface("DUMMY", &matrix(0.20), &ids(), Utc::now()).unwrap();

        let smaller = VolMatrix {
            strikes: vec![100.0],
            expiries: vec![d(2024, 2, 16)],
            vols: ndarray::array![[0.33]],
        };
        store.replace_surface("DUMMY", &smaller, &ids(), Utc::now()).unwrap();

        assert_eq!(store.row_counts("DUMMY").unwrap(), (1, 1, 1));
        let stored = store.load_surface("DUMMY").unwrap().unwrap();
        assert_eq!(stored.matrix, smaller);
    }

    #[test]
    fn test_mandates_are_isolated() {
        let mut store = SurfaceStore::open_in_memory().unwrap();
        store.replace_surface("ES", &matrix(0.20), &ids(), Utc::now()).unwrap();
        store.replace_surface("NQ", &matrix(0.25), &ids(), Utc::now()).unwrap();
        store.replace_surface("ES", &matrix(0.30), &ids(), Utc::now()).unwrap();

        assert_eq!(store.load_surface("NQ").unwrap().unwrap().matrix, matrix(0.25));
        assert_eq!(store.load_surface("ES").unwrap().unwrap().matrix, matrix(0.30));
    }

    #[test]
    fn test_missing_roll_contract_aborts_before_delete() {
        let mut store = SurfaceStore::open_in_memory().unwrap();
        store.replace_surface("DUMMY", &matrix(0.20), &ids(), Utc::now()).unwrap();

        let mut late = matrix(0.40);
        late.expiries[1] = d(2024, 4, 19);

        let err = store.replace_surface("DUMMY", &late, &ids(), Utc::now()).unwrap_err();
        assert!(matches!(err, SurfaceError::Config(_)));
        assert_eq!(store.load_surface("DUMMY").unwrap().unwrap().matrix, matrix(0.20));

        let with_roll = SecurityIds { roll: Some("ESM4".into()), ..ids() };
        store.replace_surface("DUMMY", &late, &with_roll, Utc::now()).unwrap();
        let stored = store.load_surface("DUMMY").unwrap().unwrap();
        assert_eq!(stored.security_ids, vec!["ESH4", "ESM4"]);
    }

    #[test]
    fn test_failed_insert_rolls_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("surface.db");

        let mut store = SurfaceStore::open(&path).unwrap();
        store.replace_surface("DUMMY", &matrix(0.20), &ids(), Utc::now()).unwrap();

        // Make the vol insert fail halfway through the next sync
        let other = Connection::open(&path).unwrap();
        other
            .execute(
                "CREATE TRIGGER fail_on_105 BEFORE INSERT ON tblImpliedVols
                 WHEN NEW.Strike = 105.0
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END",
                [],
            )
            .unwrap();
        drop(other);

        let err = store.replace_surface("DUMMY", &matrix(0.35), &ids(), Utc::now()).unwrap_err();
        assert!(matches!(err, SurfaceError::Persistence(_)));

        assert_eq!(store.row_counts("DUMMY").unwrap(), (3, 2, 6));
        assert_eq!(store.load_surface("DUMMY").unwrap().unwrap().matrix, matrix(0.20));
    }
}
