//! Idempotent schema migrations for the eleven logical tables plus the
//! secondary indexes named in the external-interfaces section. Applied at
//! startup; safe to re-run against an already-migrated database.

use anyhow::{Context, Result};
use deadpool_postgres::{GenericClient, Object};

struct Migration {
    version: i32,
    name: &'static str,
    up: &'static str,
}

pub async fn run_migrations(conn: &mut Object) -> Result<()> {
    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name VARCHAR(255) NOT NULL,
            applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
        &[],
    )
    .await
    .context("failed to create schema_migrations table")?;

    let applied: Vec<i32> = conn
        .query("SELECT version FROM schema_migrations", &[])
        .await
        .context("failed to read schema_migrations")?
        .iter()
        .map(|row| row.get(0))
        .collect();

    for migration in migrations() {
        if applied.contains(&migration.version) {
            continue;
        }
        conn.batch_execute(migration.up).await.with_context(|| format!("migration {} failed", migration.name))?;
        conn.execute(
            "INSERT INTO schema_migrations (version, name) VALUES ($1, $2)",
            &[&migration.version, &migration.name],
        )
        .await?;
    }

    Ok(())
}

fn migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            name: "create_extensions",
            up: r#"CREATE EXTENSION IF NOT EXISTS "uuid-ossp";"#,
        },
        Migration {
            version: 2,
            name: "create_contests",
            up: r#"
                CREATE TABLE IF NOT EXISTS contests (
                    id UUID PRIMARY KEY,
                    slug VARCHAR(128) NOT NULL UNIQUE,
                    name VARCHAR(255) NOT NULL,
                    kind VARCHAR(32) NOT NULL,
                    start_time TIMESTAMPTZ NOT NULL,
                    end_time TIMESTAMPTZ NOT NULL,
                    accept_deadline TIMESTAMPTZ,
                    status VARCHAR(32) NOT NULL,
                    entry_fee NUMERIC(20, 6) NOT NULL,
                    starting_capital NUMERIC(20, 6) NOT NULL,
                    prize_pool NUMERIC(20, 6) NOT NULL DEFAULT 0,
                    platform_fee_percentage NUMERIC(6, 3) NOT NULL,
                    platform_fee_amount NUMERIC(20, 6) NOT NULL DEFAULT 0,
                    winner_prize NUMERIC(20, 6) NOT NULL DEFAULT 0,
                    prize_distribution JSONB NOT NULL DEFAULT '[]',
                    min_participants INTEGER NOT NULL,
                    max_participants INTEGER NOT NULL,
                    current_participants INTEGER NOT NULL DEFAULT 0,
                    allowed_asset_classes JSONB NOT NULL DEFAULT '[]',
                    allowed_symbols JSONB NOT NULL DEFAULT '[]',
                    blocked_symbols JSONB NOT NULL DEFAULT '[]',
                    leverage JSONB NOT NULL,
                    max_open_positions INTEGER NOT NULL,
                    max_position_size NUMERIC(20, 6) NOT NULL,
                    margin_call_threshold NUMERIC(10, 4),
                    ranking_method VARCHAR(32) NOT NULL,
                    tie_breaker1 VARCHAR(32),
                    tie_breaker2 VARCHAR(32),
                    minimum_trades INTEGER NOT NULL DEFAULT 0,
                    tie_prize_distribution VARCHAR(32) NOT NULL,
                    disqualify_on_liquidation BOOLEAN NOT NULL DEFAULT TRUE,
                    risk_limits JSONB NOT NULL,
                    cancellation_reason TEXT
                );
            "#,
        },
        Migration {
            version: 3,
            name: "create_participants",
            up: r#"
                CREATE TABLE IF NOT EXISTS participants (
                    id UUID PRIMARY KEY,
                    contest_id UUID NOT NULL REFERENCES contests(id),
                    user_id UUID NOT NULL,
                    starting_capital NUMERIC(20, 6) NOT NULL,
                    current_capital NUMERIC(20, 6) NOT NULL,
                    available_capital NUMERIC(20, 6) NOT NULL,
                    used_margin NUMERIC(20, 6) NOT NULL DEFAULT 0,
                    realized_pnl NUMERIC(20, 6) NOT NULL DEFAULT 0,
                    unrealized_pnl NUMERIC(20, 6) NOT NULL DEFAULT 0,
                    pnl NUMERIC(20, 6) NOT NULL DEFAULT 0,
                    pnl_percentage NUMERIC(10, 4) NOT NULL DEFAULT 0,
                    total_trades INTEGER NOT NULL DEFAULT 0,
                    winning_trades INTEGER NOT NULL DEFAULT 0,
                    losing_trades INTEGER NOT NULL DEFAULT 0,
                    win_rate NUMERIC(10, 4) NOT NULL DEFAULT 0,
                    average_win NUMERIC(20, 6) NOT NULL DEFAULT 0,
                    average_loss NUMERIC(20, 6) NOT NULL DEFAULT 0,
                    largest_win NUMERIC(20, 6) NOT NULL DEFAULT 0,
                    largest_loss NUMERIC(20, 6) NOT NULL DEFAULT 0,
                    current_open_positions INTEGER NOT NULL DEFAULT 0,
                    status VARCHAR(32) NOT NULL,
                    entered_at TIMESTAMPTZ NOT NULL,
                    disqualification_reason TEXT,
                    liquidation_reason TEXT,
                    prize_received NUMERIC(20, 6),
                    is_winner BOOLEAN NOT NULL DEFAULT FALSE,
                    UNIQUE (contest_id, user_id)
                );
                CREATE INDEX IF NOT EXISTS idx_participants_contest_status ON participants(contest_id, status);
            "#,
        },
        Migration {
            version: 4,
            name: "create_orders",
            up: r#"
                CREATE TABLE IF NOT EXISTS orders (
                    id UUID PRIMARY KEY,
                    contest_id UUID NOT NULL REFERENCES contests(id),
                    participant_id UUID NOT NULL REFERENCES participants(id),
                    status VARCHAR(32) NOT NULL,
                    side VARCHAR(8) NOT NULL,
                    order_type VARCHAR(16) NOT NULL,
                    symbol VARCHAR(32) NOT NULL,
                    quantity NUMERIC(20, 6) NOT NULL,
                    requested_price NUMERIC(20, 6),
                    executed_price NUMERIC(20, 6),
                    stop_loss NUMERIC(20, 6),
                    take_profit NUMERIC(20, 6),
                    leverage NUMERIC(10, 4) NOT NULL,
                    margin_required NUMERIC(20, 6) NOT NULL,
                    placed_at TIMESTAMPTZ NOT NULL,
                    executed_at TIMESTAMPTZ,
                    cancelled_at TIMESTAMPTZ,
                    order_source VARCHAR(16) NOT NULL,
                    position_id UUID,
                    cancel_reason TEXT
                );
                CREATE INDEX IF NOT EXISTS idx_orders_status_type_contest ON orders(status, order_type, contest_id);
            "#,
        },
        Migration {
            version: 5,
            name: "create_positions",
            up: r#"
                CREATE TABLE IF NOT EXISTS positions (
                    id UUID PRIMARY KEY,
                    contest_id UUID NOT NULL REFERENCES contests(id),
                    participant_id UUID NOT NULL REFERENCES participants(id),
                    status VARCHAR(32) NOT NULL,
                    side VARCHAR(8) NOT NULL,
                    symbol VARCHAR(32) NOT NULL,
                    quantity NUMERIC(20, 6) NOT NULL,
                    entry_price NUMERIC(20, 6) NOT NULL,
                    current_price NUMERIC(20, 6) NOT NULL,
                    unrealized_pnl NUMERIC(20, 6) NOT NULL DEFAULT 0,
                    unrealized_pnl_percentage NUMERIC(10, 4) NOT NULL DEFAULT 0,
                    leverage NUMERIC(10, 4) NOT NULL,
                    margin_used NUMERIC(20, 6) NOT NULL,
                    stop_loss NUMERIC(20, 6),
                    take_profit NUMERIC(20, 6),
                    open_order_id UUID NOT NULL REFERENCES orders(id),
                    close_order_id UUID,
                    opened_at TIMESTAMPTZ NOT NULL,
                    closed_at TIMESTAMPTZ,
                    last_price_update TIMESTAMPTZ NOT NULL,
                    price_update_count BIGINT NOT NULL DEFAULT 0,
                    holding_time_seconds BIGINT,
                    close_reason VARCHAR(32)
                );
                CREATE INDEX IF NOT EXISTS idx_positions_status_contest ON positions(status, contest_id);
                CREATE INDEX IF NOT EXISTS idx_positions_participant_status ON positions(participant_id, status);
            "#,
        },
        Migration {
            version: 6,
            name: "create_trade_history",
            up: r#"
                CREATE TABLE IF NOT EXISTS trade_history (
                    id UUID PRIMARY KEY,
                    contest_id UUID NOT NULL REFERENCES contests(id),
                    participant_id UUID NOT NULL REFERENCES participants(id),
                    position_id UUID NOT NULL REFERENCES positions(id),
                    symbol VARCHAR(32) NOT NULL,
                    side VARCHAR(8) NOT NULL,
                    quantity NUMERIC(20, 6) NOT NULL,
                    entry_price NUMERIC(20, 6) NOT NULL,
                    exit_price NUMERIC(20, 6) NOT NULL,
                    price_change NUMERIC(20, 6) NOT NULL,
                    price_change_percentage NUMERIC(10, 4) NOT NULL,
                    realized_pnl NUMERIC(20, 6) NOT NULL,
                    realized_pnl_percentage NUMERIC(10, 4) NOT NULL,
                    holding_time_seconds BIGINT NOT NULL,
                    close_reason VARCHAR(32) NOT NULL,
                    is_winner BOOLEAN NOT NULL,
                    closed_at TIMESTAMPTZ NOT NULL
                );
            "#,
        },
        Migration {
            version: 7,
            name: "create_price_logs",
            up: r#"
                CREATE TABLE IF NOT EXISTS price_logs (
                    id UUID PRIMARY KEY,
                    symbol VARCHAR(32) NOT NULL,
                    bid NUMERIC(20, 6) NOT NULL,
                    ask NUMERIC(20, 6) NOT NULL,
                    mid NUMERIC(20, 6) NOT NULL,
                    spread NUMERIC(20, 6) NOT NULL,
                    quote_timestamp TIMESTAMPTZ NOT NULL,
                    logged_at TIMESTAMPTZ NOT NULL,
                    expected_price NUMERIC(20, 6),
                    execution_price NUMERIC(20, 6) NOT NULL,
                    slippage_pips NUMERIC(10, 4) NOT NULL,
                    price_source VARCHAR(16) NOT NULL,
                    order_id UUID,
                    position_id UUID
                );
            "#,
        },
        Migration {
            version: 8,
            name: "create_wallets",
            up: r#"
                CREATE TABLE IF NOT EXISTS wallets (
                    user_id UUID PRIMARY KEY,
                    credit_balance NUMERIC(20, 6) NOT NULL DEFAULT 0,
                    total_spent_on_competitions NUMERIC(20, 6) NOT NULL DEFAULT 0,
                    total_won_from_challenges NUMERIC(20, 6) NOT NULL DEFAULT 0
                );
                CREATE TABLE IF NOT EXISTS wallet_transactions (
                    id UUID PRIMARY KEY,
                    user_id UUID NOT NULL REFERENCES wallets(user_id),
                    transaction_type VARCHAR(32) NOT NULL,
                    amount NUMERIC(20, 6) NOT NULL,
                    balance_before NUMERIC(20, 6) NOT NULL,
                    balance_after NUMERIC(20, 6) NOT NULL,
                    contest_id UUID,
                    description TEXT NOT NULL,
                    processed_at TIMESTAMPTZ NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_wallet_tx_user_time ON wallet_transactions(user_id, processed_at);
            "#,
        },
        Migration {
            version: 9,
            name: "create_platform_transactions",
            up: r#"
                CREATE TABLE IF NOT EXISTS platform_transactions (
                    id UUID PRIMARY KEY,
                    contest_id UUID NOT NULL REFERENCES contests(id),
                    reason VARCHAR(32) NOT NULL,
                    amount NUMERIC(20, 6) NOT NULL,
                    recorded_at TIMESTAMPTZ NOT NULL
                );
            "#,
        },
        Migration {
            version: 10,
            name: "create_events",
            up: r#"
                CREATE TABLE IF NOT EXISTS position_events (
                    id UUID PRIMARY KEY,
                    event_type VARCHAR(32) NOT NULL,
                    user_id UUID NOT NULL,
                    contest_id UUID NOT NULL,
                    position_id UUID,
                    payload JSONB NOT NULL,
                    created_at TIMESTAMPTZ NOT NULL
                );
                CREATE TABLE IF NOT EXISTS notification_intents (
                    id UUID PRIMARY KEY,
                    user_id UUID NOT NULL,
                    contest_id UUID,
                    kind VARCHAR(32) NOT NULL,
                    payload JSONB NOT NULL,
                    created_at TIMESTAMPTZ NOT NULL,
                    acked_at TIMESTAMPTZ
                );
            "#,
        },
    ]
}
