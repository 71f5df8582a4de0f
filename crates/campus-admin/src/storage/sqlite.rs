use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{Datelike, NaiveDate};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, TransactionBehavior};
use tracing::debug;

use crate::billing::domain::{EntityId, PaymentConcept};
use crate::billing::lifecycle::{EntityKind, Transition, WindowedEntity, WindowedStatus};
use crate::billing::receipts::{PaymentReceipt, ReceiptIncludes};
use crate::billing::registry::TypeEntry;
use crate::billing::repository::{
    ConceptRepository, ReceiptRepository, RegistryStore, RepositoryError, TransitionOutcome,
    WindowedRepository,
};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed store.
///
/// Each record is kept as a JSON payload next to the columns the batch
/// transition filters on (`status`, `fecha_inicio`, `fecha_fin`); those
/// columns are authoritative. Window dates are stored as day numbers so the
/// SQL comparison orders them the same way `NaiveDate` does. Writes that must be atomic run inside an
/// immediate transaction, which also serializes concurrent runs across
/// processes sharing the database file.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RepositoryError> {
        let conn = Connection::open(path.as_ref())?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, RepositoryError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> Result<Self, RepositoryError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        setup_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn connection(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("sqlite mutex poisoned")
    }
}

fn setup_schema(conn: &Connection) -> Result<(), RepositoryError> {
    for kind in EntityKind::ordered() {
        let table = table_for(kind);
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                fecha_inicio INTEGER NOT NULL,
                fecha_fin INTEGER,
                payload TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_{table}_window
                ON {table} (status, fecha_inicio, fecha_fin);"
        ))?;
    }

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS concept_types (
            idx INTEGER PRIMARY KEY,
            label TEXT NOT NULL UNIQUE,
            active INTEGER NOT NULL DEFAULT 1
        );
        CREATE TABLE IF NOT EXISTS payment_concepts (
            id TEXT PRIMARY KEY,
            tipo INTEGER NOT NULL REFERENCES concept_types (idx),
            payload TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );
        CREATE TABLE IF NOT EXISTS receipts (
            id TEXT PRIMARY KEY,
            numero TEXT NOT NULL UNIQUE,
            payload TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );",
    )?;

    Ok(())
}

fn day_number(date: NaiveDate) -> i32 {
    date.num_days_from_ce()
}

const fn table_for(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Discount => "discounts",
        EntityKind::PriceList => "price_lists",
    }
}

fn decode<E: WindowedEntity>(status: String, payload: String) -> Result<E, RepositoryError> {
    let mut entity: E = serde_json::from_str(&payload)?;
    let status = E::Status::from_code(&status).ok_or_else(|| {
        RepositoryError::Unavailable(format!("unknown {} status '{status}'", E::KIND))
    })?;
    entity.set_status(status);
    Ok(entity)
}

impl<E: WindowedEntity> WindowedRepository<E> for SqliteStore {
    fn insert(&self, entity: E) -> Result<E, RepositoryError> {
        let payload = serde_json::to_string(&entity)?;
        let window = entity.window();
        self.connection().execute(
            &format!(
                "INSERT INTO {} (id, status, fecha_inicio, fecha_fin, payload)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                table_for(E::KIND)
            ),
            params![
                entity.id().as_str(),
                entity.status().code(),
                day_number(window.fecha_inicio),
                window.fecha_fin.map(day_number),
                payload,
            ],
        )?;
        Ok(entity)
    }

    fn update(&self, entity: E) -> Result<(), RepositoryError> {
        let payload = serde_json::to_string(&entity)?;
        let window = entity.window();
        let changed = self.connection().execute(
            &format!(
                "UPDATE {} SET status = ?2, fecha_inicio = ?3, fecha_fin = ?4, payload = ?5,
                     updated_at = CURRENT_TIMESTAMP
                 WHERE id = ?1",
                table_for(E::KIND)
            ),
            params![
                entity.id().as_str(),
                entity.status().code(),
                day_number(window.fecha_inicio),
                window.fecha_fin.map(day_number),
                payload,
            ],
        )?;

        if changed == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    fn fetch(&self, id: &EntityId) -> Result<Option<E>, RepositoryError> {
        let row = self
            .connection()
            .query_row(
                &format!(
                    "SELECT status, payload FROM {} WHERE id = ?1",
                    table_for(E::KIND)
                ),
                params![id.as_str()],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;

        row.map(|(status, payload)| decode(status, payload))
            .transpose()
    }

    fn list(&self) -> Result<Vec<E>, RepositoryError> {
        let conn = self.connection();
        let mut stmt = conn.prepare(&format!(
            "SELECT status, payload FROM {} ORDER BY fecha_inicio, id",
            table_for(E::KIND)
        ))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(status, payload)| decode(status, payload))
            .collect()
    }

    fn apply_transitions(
        &self,
        transitions: &[Transition],
        now: NaiveDate,
    ) -> Result<Vec<TransitionOutcome>, RepositoryError> {
        let table = table_for(E::KIND);
        let today = day_number(now);
        let mut conn = self.connection();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut outcomes = Vec::with_capacity(transitions.len());

        for &transition in transitions {
            let predicate = match transition {
                Transition::Activate => {
                    "fecha_inicio <= ?2 AND (fecha_fin IS NULL OR fecha_fin >= ?2)"
                }
                Transition::Expire => "fecha_fin IS NOT NULL AND fecha_fin < ?2",
            };
            let source = transition.source::<E::Status>().code();
            let target = transition.target::<E::Status>().code();

            let updated = {
                let mut stmt = tx.prepare(&format!(
                    "UPDATE {table} SET status = ?3, updated_at = CURRENT_TIMESTAMP
                     WHERE status = ?1 AND {predicate}
                     RETURNING id"
                ))?;
                let ids = stmt
                    .query_map(params![source, today, target], |row| row.get::<_, String>(0))?
                    .map(|id| id.map(EntityId))
                    .collect::<Result<Vec<_>, _>>()?;
                ids
            };

            debug!(kind = %E::KIND, transition = transition.name(), rows = updated.len(), "transition applied");
            outcomes.push(TransitionOutcome {
                transition,
                updated,
            });
        }

        tx.commit()?;
        Ok(outcomes)
    }
}

impl ConceptRepository for SqliteStore {
    fn insert_concept(&self, concept: PaymentConcept) -> Result<PaymentConcept, RepositoryError> {
        let payload = serde_json::to_string(&concept)?;
        self.connection().execute(
            "INSERT INTO payment_concepts (id, tipo, payload) VALUES (?1, ?2, ?3)",
            params![concept.id.as_str(), concept.tipo, payload],
        )?;
        Ok(concept)
    }

    fn fetch_concept(&self, id: &EntityId) -> Result<Option<PaymentConcept>, RepositoryError> {
        let payload = self
            .connection()
            .query_row(
                "SELECT payload FROM payment_concepts WHERE id = ?1",
                params![id.as_str()],
                |row| row.get::<_, String>(0),
            )
            .optional()?;

        Ok(payload
            .map(|payload| serde_json::from_str(&payload))
            .transpose()?)
    }

    fn list_concepts(&self) -> Result<Vec<PaymentConcept>, RepositoryError> {
        let conn = self.connection();
        let mut stmt = conn.prepare("SELECT payload FROM payment_concepts ORDER BY created_at, id")?;
        let payloads = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        payloads
            .iter()
            .map(|payload| serde_json::from_str(payload).map_err(RepositoryError::from))
            .collect()
    }
}

impl ReceiptRepository for SqliteStore {
    fn insert_receipt(&self, receipt: PaymentReceipt) -> Result<PaymentReceipt, RepositoryError> {
        let payload = serde_json::to_string(&receipt)?;
        self.connection().execute(
            "INSERT INTO receipts (id, numero, payload) VALUES (?1, ?2, ?3)",
            params![receipt.id.as_str(), receipt.numero, payload],
        )?;
        Ok(receipt)
    }

    fn fetch_receipt(
        &self,
        id: &EntityId,
        includes: &ReceiptIncludes,
    ) -> Result<Option<PaymentReceipt>, RepositoryError> {
        let payload = self
            .connection()
            .query_row(
                "SELECT payload FROM receipts WHERE id = ?1",
                params![id.as_str()],
                |row| row.get::<_, String>(0),
            )
            .optional()?;

        let Some(payload) = payload else {
            return Ok(None);
        };
        let mut receipt: PaymentReceipt = serde_json::from_str(&payload)?;
        receipt.retain_relations(includes);
        Ok(Some(receipt))
    }
}

impl RegistryStore for SqliteStore {
    fn load_types(&self) -> Result<Vec<TypeEntry>, RepositoryError> {
        let conn = self.connection();
        let mut stmt = conn.prepare("SELECT idx, label, active FROM concept_types ORDER BY idx")?;
        let entries = stmt
            .query_map([], |row| {
                Ok(TypeEntry {
                    index: row.get(0)?,
                    label: row.get(1)?,
                    active: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    fn append_type(&self, label: &str) -> Result<Option<TypeEntry>, RepositoryError> {
        let mut conn = self.connection();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let exists = tx
            .query_row(
                "SELECT 1 FROM concept_types WHERE label = ?1",
                params![label],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if exists {
            return Ok(None);
        }

        let index: u32 = tx.query_row(
            "SELECT COALESCE(MAX(idx) + 1, 0) FROM concept_types",
            [],
            |row| row.get(0),
        )?;
        tx.execute(
            "INSERT INTO concept_types (idx, label, active) VALUES (?1, ?2, 1)",
            params![index, label],
        )?;
        tx.commit()?;

        Ok(Some(TypeEntry {
            index,
            label: label.to_string(),
            active: true,
        }))
    }

    fn set_type_active(&self, index: u32, active: bool) -> Result<(), RepositoryError> {
        let changed = self.connection().execute(
            "UPDATE concept_types SET active = ?2 WHERE idx = ?1",
            params![index, active],
        )?;
        if changed == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

impl From<rusqlite::Error> for RepositoryError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(failure, _)
                if failure.code == ErrorCode::ConstraintViolation =>
            {
                RepositoryError::Conflict
            }
            _ => RepositoryError::Unavailable(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Unavailable(format!("corrupt payload: {err}"))
    }
}
