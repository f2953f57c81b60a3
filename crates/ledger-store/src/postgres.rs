use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{ActorId, MovementId, ProductId};
use sqlx::postgres::{PgListener, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::{
    ChangeNotice, CommitReceipt, LedgerStoreError, Movement, MovementKind, MovementQuery,
    Product, ProductDetails, Result, Revision, Sequence,
    store::{ChangeStream, LedgerStore, LedgerTransaction, LedgerWrite, validate_transaction},
};

/// NOTIFY channel carrying [`ChangeNotice`] payloads.
pub const CHANGE_CHANNEL: &str = "ledger_changes";

const PRODUCT_COLUMNS: &str =
    "id, name, quantity, price, supplier, category, min_stock, created_at, revision";

const MOVEMENT_COLUMNS: &str =
    "id, product_id, kind, quantity, timestamp, actor_id, note, sequence";

/// PostgreSQL-backed ledger store implementation.
///
/// Revisions are checked under a row lock inside the commit transaction,
/// and change notices are sent with `pg_notify` so they are delivered
/// only when the transaction commits.
#[derive(Clone)]
pub struct PostgresLedgerStore {
    pool: PgPool,
}

impl PostgresLedgerStore {
    /// Creates a new PostgreSQL ledger store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects a pool to the given database URL.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_product(row: PgRow) -> Result<Product> {
        Ok(Product {
            id: ProductId::from_uuid(row.try_get::<Uuid, _>("id")?),
            details: ProductDetails {
                name: row.try_get("name")?,
                price: row.try_get("price")?,
                supplier: row.try_get("supplier")?,
                category: row.try_get("category")?,
                min_stock: row.try_get("min_stock")?,
            },
            quantity: row.try_get("quantity")?,
            created_at: row.try_get("created_at")?,
            revision: Revision::new(row.try_get("revision")?),
        })
    }

    fn row_to_movement(row: PgRow) -> Result<Movement> {
        let kind: String = row.try_get("kind")?;
        let kind = kind
            .parse::<MovementKind>()
            .map_err(|e| LedgerStoreError::Database(sqlx::Error::Decode(e.into())))?;

        Ok(Movement {
            id: MovementId::from_uuid(row.try_get::<Uuid, _>("id")?),
            product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
            kind,
            quantity: row.try_get("quantity")?,
            timestamp: row.try_get("timestamp")?,
            actor_id: ActorId::new(row.try_get::<String, _>("actor_id")?),
            note: row.try_get("note")?,
            sequence: Sequence::new(row.try_get("sequence")?),
        })
    }

    async fn notify(tx: &mut Transaction<'_, Postgres>, notice: ChangeNotice) -> Result<()> {
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(CHANGE_CHANNEL)
            .bind(notice.to_payload())
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    #[tracing::instrument(skip(self, details))]
    async fn insert_product(
        &self,
        id: ProductId,
        details: ProductDetails,
        quantity: i64,
    ) -> Result<Product> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO products (id, name, quantity, price, supplier, category, min_stock, created_at, revision)
            VALUES ($1, $2, $3, $4, $5, $6, $7, clock_timestamp(), $8)
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(&details.name)
        .bind(quantity)
        .bind(details.price)
        .bind(&details.supplier)
        .bind(&details.category)
        .bind(details.min_stock)
        .bind(Revision::first().as_i64())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return LedgerStoreError::DuplicateProduct(id);
            }
            LedgerStoreError::Database(e)
        })?;

        Self::notify(&mut tx, ChangeNotice::products()).await?;
        tx.commit().await?;

        Self::row_to_product(row)
    }

    #[tracing::instrument(skip(self, details))]
    async fn update_details(&self, id: ProductId, details: ProductDetails) -> Result<Product> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            r#"
            UPDATE products
            SET name = $2, price = $3, supplier = $4, category = $5, min_stock = $6,
                revision = revision + 1
            WHERE id = $1
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(&details.name)
        .bind(details.price)
        .bind(&details.supplier)
        .bind(&details.category)
        .bind(details.min_stock)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(LedgerStoreError::ProductNotFound(id))?;

        Self::notify(&mut tx, ChangeNotice::products()).await?;
        tx.commit().await?;

        Self::row_to_product(row)
    }

    #[tracing::instrument(skip(self))]
    async fn delete_product(&self, id: ProductId) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await?
            .rows_affected()
            > 0;

        if deleted {
            Self::notify(&mut tx, ChangeNotice::products()).await?;
        }
        tx.commit().await?;

        Ok(deleted)
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_product).transpose()
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        let rows = sqlx::query(&format!(
            r#"SELECT {PRODUCT_COLUMNS} FROM products ORDER BY name COLLATE "C" ASC, id ASC"#
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_product).collect()
    }

    async fn list_movements(&self, query: MovementQuery) -> Result<Vec<Movement>> {
        let mut sql = format!("SELECT {MOVEMENT_COLUMNS} FROM movements WHERE 1=1");
        let mut param_count = 0;

        // Build dynamic query
        if query.product_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND product_id = ${param_count}"));
        }
        if query.kind.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND kind = ${param_count}"));
        }
        if query.from_timestamp.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND timestamp >= ${param_count}"));
        }
        if query.to_timestamp.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND timestamp <= ${param_count}"));
        }

        sql.push_str(" ORDER BY timestamp DESC, sequence DESC");

        if query.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }
        if query.offset.is_some() {
            param_count += 1;
            sql.push_str(&format!(" OFFSET ${param_count}"));
        }

        let mut sqlx_query = sqlx::query(&sql);

        if let Some(id) = query.product_id {
            sqlx_query = sqlx_query.bind(id.as_uuid());
        }
        if let Some(kind) = query.kind {
            sqlx_query = sqlx_query.bind(kind.as_str());
        }
        if let Some(from_ts) = query.from_timestamp {
            sqlx_query = sqlx_query.bind(from_ts);
        }
        if let Some(to_ts) = query.to_timestamp {
            sqlx_query = sqlx_query.bind(to_ts);
        }
        if let Some(limit) = query.limit {
            sqlx_query = sqlx_query.bind(limit as i64);
        }
        if let Some(offset) = query.offset {
            sqlx_query = sqlx_query.bind(offset as i64);
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_movement).collect()
    }

    #[tracing::instrument(skip(self, transaction), fields(writes = transaction.writes().len()))]
    async fn commit(&self, transaction: LedgerTransaction) -> Result<CommitReceipt> {
        validate_transaction(&transaction)?;

        let notice = transaction.notice();
        let (mut preconditions, writes) = transaction.into_parts();

        // Lock rows in a stable order so concurrent commits cannot deadlock.
        preconditions.sort_by_key(|(id, _)| *id);

        let mut tx = self.pool.begin().await?;

        for (product_id, expected) in &preconditions {
            let actual: Option<i64> =
                sqlx::query_scalar("SELECT revision FROM products WHERE id = $1 FOR UPDATE")
                    .bind(product_id.as_uuid())
                    .fetch_optional(&mut *tx)
                    .await?;

            let actual = actual.map(Revision::new);
            if actual != Some(*expected) {
                return Err(LedgerStoreError::ConcurrencyConflict {
                    product_id: *product_id,
                    expected: *expected,
                    actual,
                });
            }
        }

        for write in &writes {
            if let LedgerWrite::AppendMovement(movement) = write
                && !preconditions.iter().any(|(id, _)| *id == movement.product_id)
            {
                let exists: Option<i32> =
                    sqlx::query_scalar("SELECT 1 FROM products WHERE id = $1 FOR SHARE")
                        .bind(movement.product_id.as_uuid())
                        .fetch_optional(&mut *tx)
                        .await?;
                if exists.is_none() {
                    return Err(LedgerStoreError::ProductNotFound(movement.product_id));
                }
            }
        }

        let (sequence, timestamp): (i64, DateTime<Utc>) =
            sqlx::query_as("SELECT nextval('ledger_commit_seq'), clock_timestamp()")
                .fetch_one(&mut *tx)
                .await?;
        let sequence = Sequence::new(sequence);

        let mut products: Vec<Product> = Vec::new();
        let mut movements = Vec::new();

        for write in writes {
            match write {
                LedgerWrite::SetQuantity {
                    product_id,
                    quantity,
                } => {
                    let row = sqlx::query(&format!(
                        r#"
                        UPDATE products SET quantity = $2, revision = revision + 1
                        WHERE id = $1
                        RETURNING {PRODUCT_COLUMNS}
                        "#
                    ))
                    .bind(product_id.as_uuid())
                    .bind(quantity)
                    .fetch_one(&mut *tx)
                    .await?;

                    let product = Self::row_to_product(row)?;
                    products.retain(|p| p.id != product.id);
                    products.push(product);
                }
                LedgerWrite::AppendMovement(movement) => {
                    let movement = movement.into_movement(timestamp, sequence);
                    sqlx::query(
                        r#"
                        INSERT INTO movements (id, product_id, kind, quantity, timestamp, actor_id, note, sequence)
                        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                        "#,
                    )
                    .bind(movement.id.as_uuid())
                    .bind(movement.product_id.as_uuid())
                    .bind(movement.kind.as_str())
                    .bind(movement.quantity)
                    .bind(movement.timestamp)
                    .bind(movement.actor_id.as_str())
                    .bind(&movement.note)
                    .bind(movement.sequence.as_i64())
                    .execute(&mut *tx)
                    .await?;
                    movements.push(movement);
                }
            }
        }

        Self::notify(&mut tx, notice).await?;
        tx.commit().await?;
        metrics::counter!("ledger_store_commits_total", "store" => "postgres").increment(1);

        Ok(CommitReceipt {
            sequence,
            timestamp,
            products,
            movements,
        })
    }

    async fn watch(&self) -> Result<ChangeStream> {
        use futures_util::stream;

        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(CHANGE_CHANNEL).await?;

        let stream = stream::unfold(listener, |mut listener| async move {
            let item = match listener.try_recv().await {
                Ok(Some(notification)) => Ok(ChangeNotice::from_payload(notification.payload())),
                // Connection dropped; the next call reconnects. Anything sent
                // in between is lost, so ask for a full resync.
                Ok(None) => {
                    tracing::warn!("change listener lost its connection, requesting resync");
                    Ok(ChangeNotice::resync())
                }
                Err(e) => Err(LedgerStoreError::Database(e)),
            };
            Some((item, listener))
        });

        Ok(Box::pin(stream))
    }
}
