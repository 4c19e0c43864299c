//! SQL statements used by the [`SqliteStore`](crate::SqliteStore).

pub(crate) const PRAGMAS: &str = r#"
    PRAGMA journal_mode=WAL;
    PRAGMA synchronous=NORMAL;
"#;

pub(crate) const CREATE_TABLES: &str = r#"
    CREATE TABLE IF NOT EXISTS validators (
        validator_addr  TEXT PRIMARY KEY,
        validator_name  TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS blocks (
        height                INTEGER PRIMARY KEY,
        time                  TEXT NOT NULL,
        hash                  TEXT NOT NULL,
        num_txs               INTEGER NOT NULL,
        total_txs             INTEGER NOT NULL,
        app_version           TEXT NOT NULL,
        data_hash             TEXT NOT NULL,
        last_commit_hash      TEXT NOT NULL,
        validators_hash       TEXT NOT NULL,
        next_validators_hash  TEXT NOT NULL,
        consensus_hash        TEXT NOT NULL,
        app_hash              TEXT NOT NULL,
        last_results_hash     TEXT NOT NULL,
        proposer_address      TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_blocks_proposer ON blocks(proposer_address);

    CREATE TABLE IF NOT EXISTS block_signatures (
        block_height    INTEGER NOT NULL,
        validator_addr  TEXT NOT NULL,
        signed          INTEGER NOT NULL,
        PRIMARY KEY (block_height, validator_addr)
    ) WITHOUT ROWID;

    CREATE INDEX IF NOT EXISTS idx_block_signatures_validator
    ON block_signatures(validator_addr, signed);

    CREATE TABLE IF NOT EXISTS transactions (
        height      INTEGER NOT NULL,
        tx_index    INTEGER NOT NULL,
        hash        TEXT NOT NULL,
        gas_fee     INTEGER NOT NULL,
        gas_denom   TEXT NOT NULL,
        gas_wanted  INTEGER NOT NULL,
        memo        TEXT NOT NULL,
        PRIMARY KEY (height, tx_index)
    ) WITHOUT ROWID;

    CREATE INDEX IF NOT EXISTS idx_transactions_hash ON transactions(hash);

    CREATE TABLE IF NOT EXISTS messages (
        height   INTEGER NOT NULL,
        tx_hash  TEXT NOT NULL,
        "index"  INTEGER NOT NULL,
        route    TEXT NOT NULL,
        type     TEXT NOT NULL,
        msg_raw  TEXT NOT NULL,
        PRIMARY KEY (height, tx_hash, "index")
    ) WITHOUT ROWID;

    CREATE INDEX IF NOT EXISTS idx_messages_route ON messages(route, type);
"#;

pub(crate) const INSERT_VALIDATOR: &str =
    "INSERT OR IGNORE INTO validators (validator_addr, validator_name) VALUES (?1, ?2)";

pub(crate) const INSERT_BLOCK: &str = r#"
    INSERT OR IGNORE INTO blocks (
        height, time, hash, num_txs, total_txs, app_version,
        data_hash, last_commit_hash, validators_hash, next_validators_hash,
        consensus_hash, app_hash, last_results_hash, proposer_address
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
"#;

pub(crate) const INSERT_SIGNATURE: &str =
    "INSERT OR IGNORE INTO block_signatures (block_height, validator_addr, signed) VALUES (?1, ?2, ?3)";

pub(crate) const INSERT_TRANSACTION: &str = r#"
    INSERT OR IGNORE INTO transactions (
        height, tx_index, hash, gas_fee, gas_denom, gas_wanted, memo
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
"#;

pub(crate) const INSERT_MESSAGE: &str = r#"
    INSERT OR IGNORE INTO messages (height, tx_hash, "index", route, type, msg_raw)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
"#;

pub(crate) const LATEST_HEIGHT: &str = "SELECT COALESCE(MAX(height), 1) FROM blocks";

pub(crate) const MAX_HEIGHT: &str = "SELECT MAX(height) FROM blocks";

/// Left anti-join of `1..=?1` against the stored heights.
pub(crate) const MISSING_HEIGHTS: &str = r#"
    WITH RECURSIVE series(height) AS (
        SELECT 1
        UNION ALL
        SELECT height + 1 FROM series WHERE height < ?1
    )
    SELECT s.height
    FROM series s
    LEFT JOIN blocks b ON b.height = s.height
    WHERE b.height IS NULL
    ORDER BY s.height
"#;
