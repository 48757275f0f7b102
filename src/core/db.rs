use std::path::Path;

use sqlx::{migrate::MigrateDatabase, sqlite::SqlitePoolOptions, Sqlite, SqlitePool};

use crate::core::answers::Answers;
use crate::core::artwork::Artwork;
use crate::core::ban::BanEntry;
use crate::core::user::Participant;

pub struct EventDb {
    db: SqlitePool,
}

impl EventDb {
    /// Opens the event database, creating the file and tables on first run.
    pub async fn open(file: &Path) -> anyhow::Result<Self> {
        let url = format!("sqlite://{}", file.display());
        if !Sqlite::database_exists(&url).await? {
            Sqlite::create_database(&url).await?;
        }

        let db = SqlitePool::connect(&url).await?;
        Self::create_tables(&db).await?;
        Ok(EventDb { db })
    }

    /// An isolated in-memory database for tests. Restricted to a single
    /// connection so every query sees the same memory store.
    pub async fn open_in_memory() -> anyhow::Result<Self> {
        let db = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::create_tables(&db).await?;
        Ok(EventDb { db })
    }

    async fn create_tables(db: &SqlitePool) -> anyhow::Result<()> {
        sqlx::query(
            "create table if not exists users(
                        snowflake text primary key not null,
                        username text not null,
                        avatar_url text not null,
                        partner text default null,
                        in_server boolean not null,
                        is_admin boolean not null,
                        is_banned boolean not null default false,
                        foreign key(partner) references users(snowflake)
                    );",
        )
        .execute(db)
        .await?;

        // Answers are submitted before joining, so no foreign key to users.
        sqlx::query(
            "create table if not exists answers(
                        user_snowflake text primary key not null,
                        fav_game text not null,
                        fav_colour text not null,
                        fav_song text not null,
                        fav_film text not null,
                        fav_food text not null,
                        hobby_interest text not null
                    );",
        )
        .execute(db)
        .await?;

        sqlx::query(
            "create table if not exists artwork(
                        created_by text primary key not null,
                        image_path text not null,
                        created_at integer not null,
                        foreign key(created_by) references users(snowflake)
                    );",
        )
        .execute(db)
        .await?;

        sqlx::query(
            "create table if not exists ban_list(
                        user_snowflake text primary key not null,
                        reason text not null,
                        foreign key(user_snowflake) references users(snowflake)
                    );",
        )
        .execute(db)
        .await?;

        Ok(())
    }

    pub async fn add_participant(&self, participant: &Participant) -> anyhow::Result<()> {
        log::debug!("Creating participant {}", participant.snowflake);
        sqlx::query(
            "insert into users(snowflake, username, avatar_url, partner, in_server, is_admin, is_banned)
                    values(?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&participant.snowflake)
        .bind(&participant.username)
        .bind(&participant.avatar_url)
        .bind(&participant.partner)
        .bind(participant.in_server)
        .bind(participant.is_admin)
        .bind(participant.is_banned)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    pub async fn find_participant(&self, snowflake: &str) -> anyhow::Result<Option<Participant>> {
        Ok(
            sqlx::query_as("select * from users where snowflake = ? limit 1")
                .bind(snowflake)
                .fetch_optional(&self.db)
                .await?,
        )
    }

    pub async fn get_all_participants(&self) -> anyhow::Result<Vec<Participant>> {
        Ok(sqlx::query_as("select * from users order by snowflake")
            .fetch_all(&self.db)
            .await?)
    }

    /// Snowflakes of every participant subject to pairing.
    pub async fn eligible_snowflakes(&self) -> anyhow::Result<Vec<String>> {
        Ok(
            sqlx::query_scalar("select snowflake from users where is_banned = false")
                .fetch_all(&self.db)
                .await?,
        )
    }

    pub async fn set_partner(&self, snowflake: &str, partner: &str) -> anyhow::Result<()> {
        sqlx::query("update users set partner = ? where snowflake = ?")
            .bind(partner)
            .bind(snowflake)
            .execute(&self.db)
            .await
            .map(|_| ())?;
        Ok(())
    }

    pub async fn upsert_answers(&self, snowflake: &str, answers: &Answers) -> anyhow::Result<()> {
        sqlx::query(
            "insert or replace into answers(
                        user_snowflake, fav_game, fav_colour,
                        fav_song, fav_film, fav_food, hobby_interest
                    ) values(?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(snowflake)
        .bind(&answers.game)
        .bind(&answers.colour)
        .bind(&answers.song)
        .bind(&answers.film)
        .bind(&answers.food)
        .bind(&answers.hobby)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    pub async fn get_answers(&self, snowflake: &str) -> anyhow::Result<Option<Answers>> {
        Ok(
            sqlx::query_as("select * from answers where user_snowflake = ? limit 1")
                .bind(snowflake)
                .fetch_optional(&self.db)
                .await?,
        )
    }

    pub async fn count_answers(&self) -> anyhow::Result<i64> {
        Ok(sqlx::query_scalar("select count(*) from answers")
            .fetch_one(&self.db)
            .await?)
    }

    pub async fn get_ban(&self, snowflake: &str) -> anyhow::Result<Option<BanEntry>> {
        Ok(
            sqlx::query_as("select * from ban_list where user_snowflake = ? limit 1")
                .bind(snowflake)
                .fetch_optional(&self.db)
                .await?,
        )
    }

    /// Creates the ban entry and flips the participant's mirror flag in the
    /// same transaction.
    pub async fn ban_participant(&self, snowflake: &str, reason: &str) -> anyhow::Result<()> {
        let mut tx = self.db.begin().await?;
        sqlx::query("insert into ban_list(user_snowflake, reason) values(?, ?)")
            .bind(snowflake)
            .bind(reason)
            .execute(&mut *tx)
            .await?;
        sqlx::query("update users set is_banned = true where snowflake = ?")
            .bind(snowflake)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn unban_participant(&self, snowflake: &str) -> anyhow::Result<()> {
        let mut tx = self.db.begin().await?;
        sqlx::query("delete from ban_list where user_snowflake = ?")
            .bind(snowflake)
            .execute(&mut *tx)
            .await?;
        sqlx::query("update users set is_banned = false where snowflake = ?")
            .bind(snowflake)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn get_artwork(&self, snowflake: &str) -> anyhow::Result<Option<Artwork>> {
        Ok(
            sqlx::query_as("select * from artwork where created_by = ? limit 1")
                .bind(snowflake)
                .fetch_optional(&self.db)
                .await?,
        )
    }

    pub async fn upsert_artwork(&self, artwork: &Artwork) -> anyhow::Result<()> {
        sqlx::query(
            "insert or replace into artwork(created_by, image_path, created_at)
                    values(?, ?, ?)",
        )
        .bind(&artwork.created_by)
        .bind(&artwork.image_path)
        .bind(artwork.created_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    pub async fn count_artwork(&self) -> anyhow::Result<i64> {
        Ok(sqlx::query_scalar("select count(*) from artwork")
            .fetch_one(&self.db)
            .await?)
    }
}
