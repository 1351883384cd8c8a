use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::{debug, info, instrument};

use crate::domain::{
    format_address, EventPosition, GlobalStats, Market, MarketId, Outcome, OutcomeKey, Position,
    PositionKey, Trade, TradeId, TradeKind, User, GLOBAL_STATS_ID,
};
use crate::error::{IndexerError, Result};
use crate::persistence::{ChangeSet, EntityStore, MarketQuery, TradeQuery, UserRanking};

const MARKET_COLUMNS: &str = "id, question, description, creator, collateral_token, created_at, \
     closing_time, resolution_time, condition_id, outcome_count, winning_outcome, resolved, \
     paused, total_volume, total_liquidity, participant_count, trade_count";

const TRADE_COLUMNS: &str = "transaction_hash, log_index, user_address, market_id, \
     outcome_index, token_id, amount, payout, kind, timestamp, block_number";

/// PostgreSQL entity store
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations completed");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl EntityStore for PostgresStore {
    async fn watermark(&self) -> Result<Option<EventPosition>> {
        let row = sqlx::query("SELECT block_number, log_index FROM indexer_watermark")
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| {
            Ok(EventPosition::new(
                to_u64(r.try_get("block_number")?)?,
                to_u64(r.try_get("log_index")?)?,
            ))
        })
        .transpose()
    }

    async fn market(&self, id: MarketId) -> Result<Option<Market>> {
        let row = sqlx::query(&format!("SELECT {MARKET_COLUMNS} FROM markets WHERE id = $1"))
            .bind(id as i64)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(market_from_row).transpose()
    }

    async fn markets(&self, query: &MarketQuery) -> Result<Vec<Market>> {
        let sql = format!(
            "SELECT {MARKET_COLUMNS} FROM markets ORDER BY {} {}, id {} LIMIT $1 OFFSET $2",
            query.order_by.column(),
            query.direction.as_sql(),
            query.direction.as_sql(),
        );
        let rows = sqlx::query(&sql)
            .bind(query.page.limit as i64)
            .bind(query.page.skip as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(market_from_row).collect()
    }

    async fn outcome(&self, key: OutcomeKey) -> Result<Option<Outcome>> {
        let row = sqlx::query(
            r#"
            SELECT market_id, outcome_index, token_id, total_supply, holders
            FROM outcomes WHERE market_id = $1 AND outcome_index = $2
            "#,
        )
        .bind(key.market_id as i64)
        .bind(key.index as i32)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(outcome_from_row).transpose()
    }

    async fn outcomes(&self, market_id: MarketId) -> Result<Vec<Outcome>> {
        let rows = sqlx::query(
            r#"
            SELECT market_id, outcome_index, token_id, total_supply, holders
            FROM outcomes WHERE market_id = $1
            ORDER BY outcome_index
            "#,
        )
        .bind(market_id as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(outcome_from_row).collect()
    }

    async fn all_outcomes(&self) -> Result<Vec<Outcome>> {
        let rows = sqlx::query(
            r#"
            SELECT market_id, outcome_index, token_id, total_supply, holders
            FROM outcomes ORDER BY market_id, outcome_index
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(outcome_from_row).collect()
    }

    async fn user(&self, address: Address) -> Result<Option<User>> {
        let row = sqlx::query(
            r#"
            SELECT address, total_volume, total_pnl, markets_traded, position_count
            FROM users WHERE address = $1
            "#,
        )
        .bind(format_address(&address))
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn top_users(&self, ranking: UserRanking, limit: usize) -> Result<Vec<User>> {
        let order = match ranking {
            UserRanking::Volume => "total_volume",
            UserRanking::Pnl => "total_pnl",
        };
        let sql = format!(
            "SELECT address, total_volume, total_pnl, markets_traded, position_count \
             FROM users ORDER BY {order} DESC, address ASC LIMIT $1"
        );
        let rows = sqlx::query(&sql)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(user_from_row).collect()
    }

    async fn position(&self, key: PositionKey) -> Result<Option<Position>> {
        let row = sqlx::query(
            r#"
            SELECT market_id, user_address, outcome_index, balance, average_cost, realized_pnl
            FROM positions
            WHERE market_id = $1 AND user_address = $2 AND outcome_index = $3
            "#,
        )
        .bind(key.market_id as i64)
        .bind(format_address(&key.user))
        .bind(key.outcome_index as i32)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(position_from_row).transpose()
    }

    async fn user_positions(&self, user: Address) -> Result<Vec<Position>> {
        let rows = sqlx::query(
            r#"
            SELECT market_id, user_address, outcome_index, balance, average_cost, realized_pnl
            FROM positions WHERE user_address = $1
            ORDER BY market_id, outcome_index
            "#,
        )
        .bind(format_address(&user))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(position_from_row).collect()
    }

    async fn trade_exists(&self, id: TradeId) -> Result<bool> {
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM trades WHERE transaction_hash = $1 AND log_index = $2) AS found",
        )
        .bind(id.transaction_hash.to_string())
        .bind(id.log_index as i64)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.try_get("found")?)
    }

    async fn trades(&self, query: &TradeQuery) -> Result<Vec<Trade>> {
        let sql = format!(
            "SELECT {TRADE_COLUMNS} FROM trades \
             WHERE ($1::BIGINT IS NULL OR market_id = $1) \
               AND ($2::TEXT IS NULL OR user_address = $2) \
             ORDER BY block_number DESC, log_index DESC \
             LIMIT $3 OFFSET $4"
        );
        let rows = sqlx::query(&sql)
            .bind(query.market_id.map(|id| id as i64))
            .bind(query.user.as_ref().map(format_address))
            .bind(query.page.limit as i64)
            .bind(query.page.skip as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(trade_from_row).collect()
    }

    async fn stats(&self) -> Result<GlobalStats> {
        let row = sqlx::query(
            r#"
            SELECT total_volume, total_markets, total_users, total_trades
            FROM global_stats WHERE id = $1
            "#,
        )
        .bind(GLOBAL_STATS_ID)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(GlobalStats {
                total_volume: r.try_get("total_volume")?,
                total_markets: to_u64(r.try_get("total_markets")?)?,
                total_users: to_u64(r.try_get("total_users")?)?,
                total_trades: to_u64(r.try_get("total_trades")?)?,
            }),
            None => Ok(GlobalStats::default()),
        }
    }

    #[instrument(skip(self, changes), fields(watermark = %changes.watermark))]
    async fn commit(&self, changes: ChangeSet) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for market in &changes.markets {
            upsert_market(&mut tx, market).await?;
        }
        for outcome in &changes.outcomes {
            upsert_outcome(&mut tx, outcome).await?;
        }
        for user in &changes.users {
            upsert_user(&mut tx, user).await?;
        }
        for position in &changes.positions {
            upsert_position(&mut tx, position).await?;
        }
        for trade in &changes.trades {
            insert_trade(&mut tx, trade).await?;
        }
        if let Some(stats) = &changes.stats {
            upsert_stats(&mut tx, stats).await?;
        }
        set_watermark(&mut tx, changes.watermark).await?;

        tx.commit().await?;
        debug!(
            markets = changes.markets.len(),
            positions = changes.positions.len(),
            trades = changes.trades.len(),
            "change set committed"
        );
        Ok(())
    }
}

async fn upsert_market(conn: &mut PgConnection, m: &Market) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO markets (id, question, description, creator, collateral_token, created_at,
                             closing_time, resolution_time, condition_id, outcome_count,
                             winning_outcome, resolved, paused, total_volume, total_liquidity,
                             participant_count, trade_count)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
        ON CONFLICT (id) DO UPDATE SET
            resolution_time = EXCLUDED.resolution_time,
            winning_outcome = EXCLUDED.winning_outcome,
            resolved = EXCLUDED.resolved,
            paused = EXCLUDED.paused,
            total_volume = EXCLUDED.total_volume,
            total_liquidity = EXCLUDED.total_liquidity,
            participant_count = EXCLUDED.participant_count,
            trade_count = EXCLUDED.trade_count
        "#,
    )
    .bind(m.id as i64)
    .bind(&m.question)
    .bind(&m.description)
    .bind(m.creator.as_ref().map(format_address))
    .bind(format_address(&m.collateral_token))
    .bind(m.created_at)
    .bind(m.closing_time)
    .bind(m.resolution_time)
    .bind(m.condition_id.to_string())
    .bind(m.outcome_count as i32)
    .bind(m.winning_outcome.map(|w| w as i32))
    .bind(m.resolved)
    .bind(m.paused)
    .bind(m.total_volume)
    .bind(m.total_liquidity)
    .bind(m.participant_count as i64)
    .bind(m.trade_count as i64)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn upsert_outcome(conn: &mut PgConnection, o: &Outcome) -> Result<()> {
    // a stored token id is never replaced
    sqlx::query(
        r#"
        INSERT INTO outcomes (market_id, outcome_index, token_id, total_supply, holders)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (market_id, outcome_index) DO UPDATE SET
            token_id = COALESCE(outcomes.token_id, EXCLUDED.token_id),
            total_supply = EXCLUDED.total_supply,
            holders = EXCLUDED.holders
        "#,
    )
    .bind(o.market_id as i64)
    .bind(o.index as i32)
    .bind(o.token_id.map(|t| t.to_string()))
    .bind(o.total_supply)
    .bind(o.holders as i64)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn upsert_user(conn: &mut PgConnection, u: &User) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO users (address, total_volume, total_pnl, markets_traded, position_count)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (address) DO UPDATE SET
            total_volume = EXCLUDED.total_volume,
            total_pnl = EXCLUDED.total_pnl,
            markets_traded = EXCLUDED.markets_traded,
            position_count = EXCLUDED.position_count
        "#,
    )
    .bind(format_address(&u.address))
    .bind(u.total_volume)
    .bind(u.total_pnl)
    .bind(u.markets_traded as i64)
    .bind(u.position_count as i64)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn upsert_position(conn: &mut PgConnection, p: &Position) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO positions (market_id, user_address, outcome_index, balance, average_cost, realized_pnl)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (market_id, user_address, outcome_index) DO UPDATE SET
            balance = EXCLUDED.balance,
            average_cost = EXCLUDED.average_cost,
            realized_pnl = EXCLUDED.realized_pnl
        "#,
    )
    .bind(p.market_id as i64)
    .bind(format_address(&p.user))
    .bind(p.outcome_index as i32)
    .bind(p.balance)
    .bind(p.average_cost)
    .bind(p.realized_pnl)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn insert_trade(conn: &mut PgConnection, t: &Trade) -> Result<()> {
    let result = sqlx::query(
        r#"
        INSERT INTO trades (transaction_hash, log_index, user_address, market_id, outcome_index,
                            token_id, amount, payout, kind, timestamp, block_number)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ON CONFLICT (transaction_hash, log_index) DO NOTHING
        "#,
    )
    .bind(t.id.transaction_hash.to_string())
    .bind(t.id.log_index as i64)
    .bind(format_address(&t.user))
    .bind(t.market_id.map(|id| id as i64))
    .bind(t.outcome_index as i32)
    .bind(t.token_id.map(|id| id.to_string()))
    .bind(t.amount)
    .bind(t.payout)
    .bind(t.kind.as_str())
    .bind(t.timestamp)
    .bind(t.block_number as i64)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        debug!(trade = %t.id, "trade already stored");
    }
    Ok(())
}

async fn upsert_stats(conn: &mut PgConnection, s: &GlobalStats) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO global_stats (id, total_volume, total_markets, total_users, total_trades)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (id) DO UPDATE SET
            total_volume = EXCLUDED.total_volume,
            total_markets = EXCLUDED.total_markets,
            total_users = EXCLUDED.total_users,
            total_trades = EXCLUDED.total_trades
        "#,
    )
    .bind(GLOBAL_STATS_ID)
    .bind(s.total_volume)
    .bind(s.total_markets as i64)
    .bind(s.total_users as i64)
    .bind(s.total_trades as i64)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn set_watermark(conn: &mut PgConnection, position: EventPosition) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO indexer_watermark (id, block_number, log_index, updated_at)
        VALUES (TRUE, $1, $2, NOW())
        ON CONFLICT (id) DO UPDATE SET
            block_number = EXCLUDED.block_number,
            log_index = EXCLUDED.log_index,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(position.block_number as i64)
    .bind(position.log_index as i64)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

// ==================== Row mapping ====================

fn market_from_row(r: &PgRow) -> Result<Market> {
    Ok(Market {
        id: to_u64(r.try_get("id")?)?,
        question: r.try_get("question")?,
        description: r.try_get("description")?,
        creator: r
            .try_get::<Option<String>, _>("creator")?
            .map(|s| parse_address(&s))
            .transpose()?,
        collateral_token: parse_address(&r.try_get::<String, _>("collateral_token")?)?,
        created_at: r.try_get("created_at")?,
        closing_time: r.try_get("closing_time")?,
        resolution_time: r.try_get("resolution_time")?,
        condition_id: parse_b256(&r.try_get::<String, _>("condition_id")?)?,
        outcome_count: to_u32(r.try_get("outcome_count")?)?,
        winning_outcome: r
            .try_get::<Option<i32>, _>("winning_outcome")?
            .map(to_u32)
            .transpose()?,
        resolved: r.try_get("resolved")?,
        paused: r.try_get("paused")?,
        total_volume: r.try_get("total_volume")?,
        total_liquidity: r.try_get("total_liquidity")?,
        participant_count: to_u64(r.try_get("participant_count")?)?,
        trade_count: to_u64(r.try_get("trade_count")?)?,
    })
}

fn outcome_from_row(r: &PgRow) -> Result<Outcome> {
    Ok(Outcome {
        market_id: to_u64(r.try_get("market_id")?)?,
        index: to_u32(r.try_get("outcome_index")?)?,
        token_id: r
            .try_get::<Option<String>, _>("token_id")?
            .map(|s| parse_u256(&s))
            .transpose()?,
        total_supply: r.try_get("total_supply")?,
        holders: to_u64(r.try_get("holders")?)?,
    })
}

fn user_from_row(r: &PgRow) -> Result<User> {
    Ok(User {
        address: parse_address(&r.try_get::<String, _>("address")?)?,
        total_volume: r.try_get("total_volume")?,
        total_pnl: r.try_get("total_pnl")?,
        markets_traded: to_u64(r.try_get("markets_traded")?)?,
        position_count: to_u64(r.try_get("position_count")?)?,
    })
}

fn position_from_row(r: &PgRow) -> Result<Position> {
    Ok(Position {
        market_id: to_u64(r.try_get("market_id")?)?,
        user: parse_address(&r.try_get::<String, _>("user_address")?)?,
        outcome_index: to_u32(r.try_get("outcome_index")?)?,
        balance: r.try_get("balance")?,
        average_cost: r.try_get("average_cost")?,
        realized_pnl: r.try_get("realized_pnl")?,
    })
}

fn trade_from_row(r: &PgRow) -> Result<Trade> {
    let kind: String = r.try_get("kind")?;
    Ok(Trade {
        id: TradeId::new(
            parse_b256(&r.try_get::<String, _>("transaction_hash")?)?,
            to_u64(r.try_get("log_index")?)?,
        ),
        user: parse_address(&r.try_get::<String, _>("user_address")?)?,
        market_id: r
            .try_get::<Option<i64>, _>("market_id")?
            .map(to_u64)
            .transpose()?,
        outcome_index: to_u32(r.try_get("outcome_index")?)?,
        token_id: r
            .try_get::<Option<String>, _>("token_id")?
            .map(|s| parse_u256(&s))
            .transpose()?,
        amount: r.try_get("amount")?,
        payout: r.try_get("payout")?,
        kind: TradeKind::try_from(kind.as_str()).map_err(IndexerError::InvalidState)?,
        timestamp: r.try_get("timestamp")?,
        block_number: to_u64(r.try_get("block_number")?)?,
    })
}

fn to_u64(value: i64) -> Result<u64> {
    u64::try_from(value).map_err(|_| IndexerError::InvalidState(format!("negative value {value}")))
}

fn to_u32(value: i32) -> Result<u32> {
    u32::try_from(value).map_err(|_| IndexerError::InvalidState(format!("negative value {value}")))
}

fn parse_address(s: &str) -> Result<Address> {
    Address::from_str(s).map_err(|e| IndexerError::InvalidState(format!("bad address {s}: {e}")))
}

fn parse_b256(s: &str) -> Result<B256> {
    B256::from_str(s).map_err(|e| IndexerError::InvalidState(format!("bad hash {s}: {e}")))
}

fn parse_u256(s: &str) -> Result<U256> {
    U256::from_str(s).map_err(|e| IndexerError::InvalidState(format!("bad token id {s}: {e}")))
}
