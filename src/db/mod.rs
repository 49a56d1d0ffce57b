use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{postgres::PgPoolOptions, types::Json, PgPool, Postgres, Transaction};

use crate::{
    config::Config,
    error::{AppError, Result},
    models::*,
    store::{order_by_selection, BattleRepository, BattleStore, BattleTx, CardStore, StakeLedger},
};

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn new(config: &Config) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .connect(&config.database_url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> anyhow::Result<()> {
        // migrations live at the crate root: ./migrations
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn into_battles(rows: Vec<BattleRow>) -> Result<Vec<Battle>> {
    rows.into_iter().map(Battle::try_from).collect()
}

fn into_battle_cards(rows: Vec<BattleCardRow>) -> Result<Vec<BattleCard>> {
    rows.into_iter().map(BattleCard::try_from).collect()
}

// ==================== READ QUERIES ====================
#[async_trait]
impl BattleRepository for Database {
    type Tx = PgBattleTx;

    async fn begin(&self) -> Result<PgBattleTx> {
        Ok(PgBattleTx {
            tx: self.pool.begin().await?,
        })
    }

    async fn get_battle(&self, battle_id: i64) -> Result<Option<Battle>> {
        let row = sqlx::query_as::<_, BattleRow>("SELECT * FROM battles WHERE id = $1")
            .bind(battle_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Battle::try_from).transpose()
    }

    async fn get_battle_cards(&self, battle_id: i64) -> Result<Vec<BattleCard>> {
        let rows = sqlx::query_as::<_, BattleCardRow>(
            "SELECT * FROM battle_cards WHERE battle_id = $1 ORDER BY round_number ASC, player_id ASC",
        )
        .bind(battle_id)
        .fetch_all(&self.pool)
        .await?;
        into_battle_cards(rows)
    }

    async fn list_player_battles(
        &self,
        player_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Battle>, i64)> {
        let rows = sqlx::query_as::<_, BattleRow>(
            "SELECT * FROM battles
             WHERE player1_id = $1 OR player2_id = $1
             ORDER BY created_at DESC, id DESC
             LIMIT $2 OFFSET $3",
        )
        .bind(player_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM battles WHERE player1_id = $1 OR player2_id = $1",
        )
        .bind(player_id)
        .fetch_one(&self.pool)
        .await?;

        Ok((into_battles(rows)?, total))
    }

    async fn open_battles(&self, query: &OpenBattleQuery, limit: i64) -> Result<Vec<Battle>> {
        let rows = sqlx::query_as::<_, BattleRow>(
            r#"
            SELECT b.* FROM battles b
            JOIN players p ON p.id = b.player1_id
            WHERE b.status = 'pending'
              AND b.player2_id IS NULL
              AND b.battle_style = $1
              AND b.card_count = $2
              AND ($3::TEXT IS NULL OR p.skill_level = $3)
            ORDER BY b.created_at ASC
            LIMIT $4
            "#,
        )
        .bind(query.battle_style.as_str())
        .bind(query.card_count)
        .bind(query.skill_level.map(|level| level.as_str()))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        into_battles(rows)
    }
}

// ==================== TRANSACTION ====================
pub struct PgBattleTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl BattleStore for PgBattleTx {
    async fn lock_battle(&mut self, battle_id: i64) -> Result<Option<Battle>> {
        let row = sqlx::query_as::<_, BattleRow>("SELECT * FROM battles WHERE id = $1 FOR UPDATE")
            .bind(battle_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(Battle::try_from).transpose()
    }

    async fn insert_battle(&mut self, battle: NewBattle) -> Result<Battle> {
        let row = sqlx::query_as::<_, BattleRow>(
            r#"
            INSERT INTO battles
                (player1_id, battle_type, battle_style, card_count, total_pot,
                 status, is_risk_mode, tournament_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(battle.player1_id)
        .bind(battle.battle_type.as_str())
        .bind(battle.battle_style.as_str())
        .bind(battle.card_count)
        .bind(battle.total_pot)
        .bind(BattleStatus::Pending.as_str())
        .bind(battle.is_risk_mode)
        .bind(battle.tournament_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Battle::try_from(row)
    }

    async fn update_battle(&mut self, battle: &Battle) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE battles
            SET player2_id = $1,
                winner_id  = $2,
                total_pot  = $3,
                status     = $4,
                updated_at = NOW()
            WHERE id = $5
            "#,
        )
        .bind(battle.player2_id)
        .bind(battle.winner_id)
        .bind(battle.total_pot)
        .bind(battle.status.as_str())
        .bind(battle.id)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn insert_battle_cards(&mut self, cards: Vec<NewBattleCard>) -> Result<Vec<BattleCard>> {
        let mut inserted = Vec::with_capacity(cards.len());
        for card in cards {
            let row = sqlx::query_as::<_, BattleCardRow>(
                r#"
                INSERT INTO battle_cards
                    (battle_id, card_id, player_id, round_number, power_level, stake_value, result)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING *
                "#,
            )
            .bind(card.battle_id)
            .bind(card.card_id)
            .bind(card.player_id)
            .bind(card.round_number)
            .bind(card.power_level)
            .bind(card.stake_value)
            .bind(RoundResult::Pending.as_str())
            .fetch_one(&mut *self.tx)
            .await?;
            inserted.push(BattleCard::try_from(row)?);
        }
        Ok(inserted)
    }

    async fn battle_cards(&mut self, battle_id: i64) -> Result<Vec<BattleCard>> {
        let rows = sqlx::query_as::<_, BattleCardRow>(
            "SELECT * FROM battle_cards WHERE battle_id = $1 ORDER BY round_number ASC, player_id ASC",
        )
        .bind(battle_id)
        .fetch_all(&mut *self.tx)
        .await?;
        into_battle_cards(rows)
    }

    async fn update_battle_card(&mut self, card: &BattleCard) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE battle_cards
            SET boosters        = $1,
                result          = $2,
                damage_dealt    = $3,
                damage_received = $4
            WHERE id = $5
            "#,
        )
        .bind(card.boosters.as_ref().map(Json))
        .bind(card.result.as_str())
        .bind(card.damage_dealt)
        .bind(card.damage_received)
        .bind(card.id)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl CardStore for PgBattleTx {
    async fn lock_cards(&mut self, card_ids: &[i64], owner_id: i64) -> Result<Vec<Card>> {
        // Row locks taken in id order so two battles never wait on each other in a cycle.
        let cards = sqlx::query_as::<_, Card>(
            r#"
            SELECT id, owner_id, name, rarity, power_level, stake_value, locked
            FROM cards
            WHERE id = ANY($1) AND owner_id = $2 AND locked = FALSE
            ORDER BY id
            FOR UPDATE
            "#,
        )
        .bind(card_ids.to_vec())
        .bind(owner_id)
        .fetch_all(&mut *self.tx)
        .await?;

        let mut cards = order_by_selection(card_ids, cards).ok_or_else(|| {
            AppError::InvalidCardSelection(
                "cards must exist, belong to you and not be locked".to_string(),
            )
        })?;

        sqlx::query("UPDATE cards SET locked = TRUE WHERE id = ANY($1)")
            .bind(card_ids.to_vec())
            .execute(&mut *self.tx)
            .await?;

        for card in cards.iter_mut() {
            card.locked = true;
        }
        Ok(cards)
    }

    async fn unlock_cards(&mut self, card_ids: &[i64]) -> Result<()> {
        sqlx::query("UPDATE cards SET locked = FALSE WHERE id = ANY($1)")
            .bind(card_ids.to_vec())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn delete_cards(&mut self, card_ids: &[i64]) -> Result<()> {
        sqlx::query("DELETE FROM cards WHERE id = ANY($1)")
            .bind(card_ids.to_vec())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }
}

impl PgBattleTx {
    async fn credit(
        &mut self,
        account: &str,
        player_id: i64,
        amount: Decimal,
        reason: &str,
        battle_id: i64,
    ) -> Result<()> {
        let column = match account {
            "balance" => "charlie_points",
            "moon_pot" => "moon_pot_points",
            other => return Err(AppError::Internal(format!("unknown ledger account {}", other))),
        };

        let updated = sqlx::query(&format!(
            "UPDATE players SET {column} = {column} + $1, updated_at = NOW() WHERE id = $2"
        ))
        .bind(amount)
        .bind(player_id)
        .execute(&mut *self.tx)
        .await?;
        if updated.rows_affected() != 1 {
            return Err(AppError::NotFound(format!("Player {} not found", player_id)));
        }

        // UNIQUE (battle_id, player_id, account) rejects a second payout for the same battle.
        sqlx::query(
            "INSERT INTO ledger_entries (player_id, battle_id, account, amount, reason)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(player_id)
        .bind(battle_id)
        .bind(account)
        .bind(amount)
        .bind(reason)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl StakeLedger for PgBattleTx {
    async fn credit_balance(
        &mut self,
        player_id: i64,
        amount: Decimal,
        reason: &str,
        battle_id: i64,
    ) -> Result<()> {
        self.credit("balance", player_id, amount, reason, battle_id).await
    }

    async fn credit_moon_pot(
        &mut self,
        player_id: i64,
        amount: Decimal,
        reason: &str,
        battle_id: i64,
    ) -> Result<()> {
        self.credit("moon_pot", player_id, amount, reason, battle_id).await
    }

    async fn record_outcome(&mut self, winner_id: i64, loser_id: i64) -> Result<()> {
        sqlx::query("UPDATE players SET total_wins = total_wins + 1, updated_at = NOW() WHERE id = $1")
            .bind(winner_id)
            .execute(&mut *self.tx)
            .await?;
        sqlx::query(
            "UPDATE players SET total_losses = total_losses + 1, updated_at = NOW() WHERE id = $1",
        )
        .bind(loser_id)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl BattleTx for PgBattleTx {
    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn database_new_returns_error_on_invalid_url() {
        let mut config = crate::config::test_config();
        config.database_url = "not-a-url".to_string();
        let result = Database::new(&config).await;
        assert!(result.is_err());
    }
}
